// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Read-only snapshots of the cache, suitable for logging or for returning
//! from a management interface.

use std::net::Ipv4Addr;

use serde::Serialize;

use aal::Tick;
use common::network::MacAddr;
use common::ports::PortMask;
use common::ports::PortNo;

/// Occupancy of the cache's tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Host slots holding a MAC
    pub hosts: usize,
    /// Group slots holding a MAC, active or not
    pub groups: usize,
    /// Groups with at least one port
    pub active_groups: usize,
    /// Member records in use, including routers
    pub members_in_use: usize,
    /// Member records released and awaiting reuse
    pub members_free: usize,
    /// Routers currently tracked
    pub routers: usize,
    pub router_ports: PortMask,
    pub group_sweep_armed: bool,
    pub router_expiry_armed: bool,
}

/// A single listener on one port of a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub port: PortNo,
    pub addr: Ipv4Addr,
    pub expires: Tick,
}

/// The state of one active multicast group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupView {
    pub mac: MacAddr,
    /// Ports with listeners, not counting router ports
    pub ports: PortMask,
    pub expires: Tick,
    pub members: Vec<MemberView>,
}
