// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeMap;

use common::network::MacAddr;
use common::ports::PortMask;

/// Multicast forwarding masks, as the stub switch would have programmed them.
/// A MAC with no entry (or an empty mask) is not forwarded anywhere.
pub struct McGroupData {
    groups: BTreeMap<u64, PortMask>,
}

impl McGroupData {
    /// Get the list of multicast MACs with a non-empty mask.
    pub fn groups(&self) -> Vec<MacAddr> {
        self.groups
            .iter()
            .filter(|(_, mask)| **mask != 0)
            .map(|(mac, _)| MacAddr::from(*mac))
            .collect()
    }

    /// Get the forwarding mask for a multicast MAC.
    pub fn portmask(&self, group: MacAddr) -> PortMask {
        self.groups.get(&u64::from(group)).copied().unwrap_or(0)
    }

    pub fn set(&mut self, group: MacAddr, mask: PortMask) {
        self.groups.insert(u64::from(group), mask);
    }

    pub fn clear(&mut self, group: MacAddr) {
        self.groups.remove(&u64::from(group));
    }

    pub fn add(&mut self, group: MacAddr, mask: PortMask) {
        *self.groups.entry(u64::from(group)).or_default() |= mask;
    }

    pub fn remove(&mut self, group: MacAddr, mask: PortMask) {
        let key = u64::from(group);
        if let Some(current) = self.groups.get_mut(&key) {
            *current &= !mask;
            if *current == 0 {
                self.groups.remove(&key);
            }
        }
    }
}

pub fn init() -> McGroupData {
    McGroupData {
        groups: BTreeMap::new(),
    }
}
