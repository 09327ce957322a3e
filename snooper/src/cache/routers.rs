// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Tracking of the ports with a multicast router attached.
//!
//! A router must see all multicast traffic, so a router port is added to the
//! forwarding mask of every group in the table when the router is first heard,
//! and removed again from each group that doesn't otherwise need it when the
//! router expires.

use std::net::Ipv4Addr;

use slog::debug;

use super::SnoopCache;
use crate::types::SnoopResult;
use aal::time;
use aal::{AsicOps, Clock, Tick, TimerId, TimerOps};
use common::ports::{PortMask, PortNo, Ports};

impl<D: AsicOps, T: TimerOps, C: Clock> SnoopCache<D, T, C> {
    /// Record that a multicast router `addr` was heard on `port`, and will be
    /// for the next `timeout` ticks.  Returns the ports that newly became
    /// router ports.
    pub fn note_router(
        &mut self,
        addr: Ipv4Addr,
        port: PortNo,
        timeout: Tick,
    ) -> SnoopResult<PortMask> {
        self.validate_port(port)?;

        let expires = time::deadline(self.clock.now(), timeout);
        let before = self.routers.bitmask();
        self.routers.set_expires(expires);
        if let Err(e) =
            self.routers.join(&mut self.members, port, addr, expires)
        {
            debug!(self.log, "router not added";
                "addr" => %addr, "error" => %e);
        }
        let added = self.routers.recompute() & !before;

        self.timers.timer_schedule_earlier(TimerId::RouterExpiry, expires);
        debug!(self.log, "router";
            "added" => %Ports(added),
            "addr" => %addr,
            "port" => port,
            "expires_in" => timeout,
        );

        if added != 0 {
            for group in self.groups.iter() {
                let ports = added & !group.members.bitmask();
                if ports != 0 {
                    self.ports_add(group.mac, ports);
                }
            }
        }
        Ok(added)
    }

    // Drop the routers whose time is up.  The timer is re-armed for the
    // earliest remaining router, if there is one.
    pub(super) fn router_sweep(&mut self) {
        let now = self.clock.now();
        let before = self.routers.bitmask();

        match self.routers.expire_members(&mut self.members, now) {
            Some(next) => {
                self.routers.set_expires(next);
                self.timers.timer_schedule(TimerId::RouterExpiry, next);
            }
            None => {
                self.routers.reset(&mut self.members);
                self.timers.timer_cancel(TimerId::RouterExpiry);
            }
        }

        let removed = before & !self.routers.bitmask();
        if removed == 0 {
            return;
        }
        debug!(self.log, "expire"; "routers" => %Ports(removed));
        for group in self.groups.iter() {
            let ports = removed & !group.members.bitmask();
            if ports != 0 {
                self.ports_remove(group.mac, ports);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::cache::SnoopCache;
    use crate::Config;
    use aal::{TimerId, TimerOps};
    use asic::stub::{DriverCall, ManualClock, StubHandle, StubTimers};
    use common::network::MacAddr;

    fn group(n: u8) -> MacAddr {
        MacAddr::new(0x01, 0x00, 0x5e, 0x00, 0x00, n)
    }

    fn addr(n: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, n)
    }

    #[test]
    fn test_router_lifecycle() -> anyhow::Result<()> {
        let log = crate::test_logger();
        let asic = Arc::new(StubHandle::new(&log));
        let timers = Arc::new(StubTimers::default());
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = SnoopCache::initialize(
            &log,
            &Config::default(),
            asic.clone(),
            timers.clone(),
            clock.clone(),
        )?;

        cache.add_member(group(1), addr(10), 2, 100)?;
        cache.add_member(group(2), addr(10), 0, 100)?;
        asic.take_calls();

        // Two routers on port 0, one on port 4
        assert_eq!(cache.note_router(addr(1), 0, 10)?, 0b1);
        assert_eq!(cache.note_router(addr(2), 0, 20)?, 0);
        assert_eq!(cache.note_router(addr(3), 4, 15)?, 0b1_0000);
        assert_eq!(cache.router_ports(), 0b1_0001);
        assert_eq!(timers.timer_deadline(TimerId::RouterExpiry), Some(10));

        // Group 2 already forwards to port 0 on its own account
        assert_eq!(
            asic.take_calls(),
            vec![
                DriverCall::PortsAdd(group(1), 0b1),
                DriverCall::PortsAdd(group(1), 0b1_0000),
                DriverCall::PortsAdd(group(2), 0b1_0000),
            ]
        );
        assert_eq!(asic.portmask(group(1)), 0b1_0101);
        assert_eq!(asic.portmask(group(2)), 0b1_0001);

        // The first router leaving doesn't take port 0 away
        clock.set(10);
        cache.timer_fired(TimerId::RouterExpiry);
        assert_eq!(cache.router_ports(), 0b1_0001);
        assert_eq!(timers.timer_deadline(TimerId::RouterExpiry), Some(15));
        assert!(asic.calls().is_empty());

        clock.set(15);
        cache.timer_fired(TimerId::RouterExpiry);
        assert_eq!(cache.router_ports(), 0b1);
        assert_eq!(
            asic.take_calls(),
            vec![
                DriverCall::PortsRemove(group(1), 0b1_0000),
                DriverCall::PortsRemove(group(2), 0b1_0000),
            ]
        );

        // Port 0 stays on group 2, which has a listener there
        clock.set(20);
        cache.timer_fired(TimerId::RouterExpiry);
        assert_eq!(cache.router_ports(), 0);
        assert!(!timers.timer_armed(TimerId::RouterExpiry));
        assert_eq!(
            asic.take_calls(),
            vec![DriverCall::PortsRemove(group(1), 0b1)]
        );
        assert_eq!(asic.portmask(group(1)), 0b100);
        assert_eq!(asic.portmask(group(2)), 0b1);
        assert_eq!(cache.stats().routers, 0);
        Ok(())
    }

    #[test]
    fn test_router_refresh() -> anyhow::Result<()> {
        let log = crate::test_logger();
        let timers = Arc::new(StubTimers::default());
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = SnoopCache::initialize(
            &log,
            &Config::default(),
            StubHandle::new(&log),
            timers.clone(),
            clock.clone(),
        )?;

        cache.note_router(addr(1), 3, 10)?;
        clock.set(8);
        assert_eq!(cache.note_router(addr(1), 3, 10)?, 0);
        assert_eq!(cache.stats().routers, 1);

        // The timer still holds the original deadline, so the first firing
        // finds nothing due and moves it out
        assert_eq!(timers.timer_deadline(TimerId::RouterExpiry), Some(10));
        clock.set(10);
        cache.timer_fired(TimerId::RouterExpiry);
        assert_eq!(cache.router_ports(), 0b1000);
        assert_eq!(timers.timer_deadline(TimerId::RouterExpiry), Some(18));
        Ok(())
    }
}
