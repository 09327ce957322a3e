// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use crate::config::Config;
use crate::members::MemberPool;
use crate::membership::Membership;
use crate::table::{Slot, SlotId, SlotTable};
use common::network::MacAddr;
use common::ports::PortNo;

/// The membership state of a single multicast group.
pub(crate) struct GroupEntry {
    pub mac: MacAddr,
    pub members: Membership,
}

impl Slot for GroupEntry {
    fn mac(&self) -> MacAddr {
        self.mac
    }
}

/// How `GroupTable::claim()` found a slot for a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Claim {
    /// The group already had a slot
    Existing(SlotId),
    /// A never-used slot was handed out
    Created(SlotId),
    /// An idle slot was taken over from another group, whose forwarding
    /// state the caller must clear
    Recycled { id: SlotId, previous: MacAddr },
}

impl Claim {
    pub fn id(&self) -> SlotId {
        match self {
            Claim::Existing(id) | Claim::Created(id) => *id,
            Claim::Recycled { id, .. } => *id,
        }
    }
}

pub(crate) struct GroupTable {
    port_max: PortNo,
    slots: SlotTable<GroupEntry>,
}

impl GroupTable {
    pub fn new(config: &Config) -> Self {
        GroupTable {
            port_max: config.port_max,
            slots: SlotTable::new(config.group_pool_size, config.hash_size),
        }
    }

    pub fn lookup(&self, mac: MacAddr) -> Option<SlotId> {
        self.slots.lookup(mac)
    }

    fn entry(&self, mac: MacAddr) -> GroupEntry {
        GroupEntry {
            mac,
            members: Membership::new(self.port_max),
        }
    }

    /// Find or create the slot for `mac`.  When the table is full, the oldest
    /// group with no active ports gives up its slot.  Returns `None` if every
    /// group is active.
    pub fn claim(
        &mut self,
        mac: MacAddr,
        pool: &mut MemberPool,
    ) -> Option<Claim> {
        if let Some(id) = self.slots.lookup(mac) {
            return Some(Claim::Existing(id));
        }
        let entry = self.entry(mac);
        if let Some(id) = self.slots.insert(entry) {
            return Some(Claim::Created(id));
        }

        let id = self
            .slots
            .unlink_oldest(|group| group.members.bitmask() == 0)?;
        let fresh = self.entry(mac);
        let old = std::mem::replace(self.slots.get_mut(id), fresh);
        let mut members = old.members;
        members.reset(pool);
        self.slots.link(id);
        Some(Claim::Recycled {
            id,
            previous: old.mac,
        })
    }

    pub fn get(&self, id: SlotId) -> &GroupEntry {
        self.slots.get(id)
    }

    pub fn get_mut(&mut self, id: SlotId) -> &mut GroupEntry {
        self.slots.get_mut(id)
    }

    /// Every occupied slot, oldest first.
    pub fn ids(&self) -> Vec<SlotId> {
        self.slots.ids()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupEntry> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn drain(&mut self) -> Vec<GroupEntry> {
        self.slots.drain()
    }
}
