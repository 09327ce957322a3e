// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! A small cache of which switch port each host MAC was last seen on, so that
//! every report from a chatty host doesn't cost a trip to the switch driver.

use slog::{debug, error, o};

use crate::config::Config;
use crate::table::{Slot, SlotId, SlotTable};
use aal::time;
use aal::{AsicOps, Tick};
use common::network::MacAddr;
use common::ports::PortNo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Learned {
    pub port: PortNo,
    pub expires: Tick,
}

pub(crate) struct HostEntry {
    pub mac: MacAddr,
    // Unset until the driver has given us a usable port for this MAC
    pub learned: Option<Learned>,
}

impl HostEntry {
    fn new(mac: MacAddr) -> Self {
        HostEntry { mac, learned: None }
    }

    fn fresh_port(&self, now: Tick) -> Option<PortNo> {
        self.learned
            .filter(|l| time::is_after_eq(l.expires, now))
            .map(|l| l.port)
    }

    fn is_stale(&self, now: Tick) -> bool {
        match self.learned {
            Some(l) => time::is_before(l.expires, now),
            None => true,
        }
    }
}

impl Slot for HostEntry {
    fn mac(&self) -> MacAddr {
        self.mac
    }
}

pub(crate) struct HostTable {
    log: slog::Logger,
    ttl: Tick,
    port_max: PortNo,
    slots: SlotTable<HostEntry>,
}

impl HostTable {
    pub fn new(log: &slog::Logger, config: &Config) -> Self {
        HostTable {
            log: log.new(o!("unit" => "hosts")),
            ttl: config.host_ttl,
            port_max: config.port_max,
            slots: SlotTable::new(config.host_pool_size, config.hash_size),
        }
    }

    // Find the slot for this MAC, claiming one if it has none.  A new MAC takes
    // a never-used slot if there is one, and otherwise the oldest slot whose
    // mapping has gone stale.  If every mapping is still fresh, the MAC goes
    // uncached.
    fn slot(&mut self, mac: MacAddr, now: Tick) -> Option<SlotId> {
        if let Some(id) = self.slots.lookup(mac) {
            return Some(id);
        }
        if let Some(id) = self.slots.insert(HostEntry::new(mac)) {
            return Some(id);
        }

        let id = self.slots.unlink_oldest(|host| host.is_stale(now))?;
        let old = self.slots.get(id).mac;
        debug!(self.log, "recycling host slot"; "old" => %old, "new" => %mac);
        *self.slots.get_mut(id) = HostEntry::new(mac);
        self.slots.link(id);
        Some(id)
    }

    /// Return the port `mac` is reachable through.  A fresh cached answer is
    /// returned without consulting the driver; otherwise the driver is asked,
    /// and a usable answer is cached for the next `host_ttl` ticks.
    pub fn resolve<D: AsicOps>(
        &mut self,
        asic: &D,
        mac: MacAddr,
        now: Tick,
    ) -> Option<PortNo> {
        let slot = self.slot(mac, now);
        if let Some(id) = slot {
            if let Some(port) = self.slots.get(id).fresh_port(now) {
                debug!(self.log, "port"; "host" => %mac, "port" => port);
                return Some(port);
            }
        }

        let port = match asic.mac_port_lookup(mac) {
            Ok(port) => port,
            Err(e) => {
                error!(self.log, "port lookup failed";
                    "host" => %mac, "error" => %e);
                None
            }
        };
        debug!(self.log, "read"; "host" => %mac, "port" => ?port);

        match (slot, port) {
            (Some(id), Some(port)) if port <= self.port_max => {
                self.slots.get_mut(id).learned = Some(Learned {
                    port,
                    expires: time::deadline(now, self.ttl),
                });
            }
            (None, _) => {
                debug!(self.log, "host table full, not caching";
                    "host" => %mac);
            }
            _ => {}
        }
        port
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Forget every host.
    pub fn clear(&mut self) {
        let dropped = self.slots.drain().len();
        debug!(self.log, "released host entries"; "count" => dropped);
    }

    #[cfg(test)]
    pub fn learned(&self, mac: MacAddr) -> Option<Learned> {
        self.slots.lookup(mac).and_then(|id| self.slots.get(id).learned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockAsic;
    use aal::AsicError;

    fn host(n: u8) -> MacAddr {
        MacAddr::new(0x02, 0x00, 0x00, 0x00, 0x00, n)
    }

    fn table(host_pool_size: usize) -> HostTable {
        let config = Config {
            host_pool_size,
            ..Config::default()
        };
        HostTable::new(&crate::test_logger(), &config)
    }

    #[test]
    fn test_cached_within_ttl() {
        let mut asic = MockAsic::new();
        asic.expect_mac_port_lookup()
            .with(mockall::predicate::eq(host(1)))
            .times(2)
            .returning(|_| Ok(Some(4)));
        let mut hosts = table(4);

        // First lookup goes to the driver, the next ones within the TTL don't
        assert_eq!(hosts.resolve(&asic, host(1), 100), Some(4));
        assert_eq!(hosts.resolve(&asic, host(1), 101), Some(4));
        assert_eq!(hosts.resolve(&asic, host(1), 103), Some(4));

        // Once the TTL has passed, the driver is asked again
        assert_eq!(hosts.resolve(&asic, host(1), 104), Some(4));
        assert_eq!(
            hosts.learned(host(1)),
            Some(Learned { port: 4, expires: 107 })
        );
    }

    #[test]
    fn test_unknown_not_cached() {
        let mut asic = MockAsic::new();
        asic.expect_mac_port_lookup().times(2).returning(|_| Ok(None));
        let mut hosts = table(4);

        assert_eq!(hosts.resolve(&asic, host(1), 0), None);
        assert_eq!(hosts.resolve(&asic, host(1), 0), None);
        assert_eq!(hosts.learned(host(1)), None);
        assert_eq!(hosts.len(), 1);
    }

    #[test]
    fn test_out_of_range_port_not_cached() {
        let mut asic = MockAsic::new();
        asic.expect_mac_port_lookup().times(2).returning(|_| Ok(Some(30)));
        let mut hosts = table(4);

        // The driver's answer is passed through, but never remembered
        assert_eq!(hosts.resolve(&asic, host(1), 0), Some(30));
        assert_eq!(hosts.resolve(&asic, host(1), 0), Some(30));
        assert_eq!(hosts.learned(host(1)), None);
    }

    #[test]
    fn test_lookup_error() {
        let mut asic = MockAsic::new();
        asic.expect_mac_port_lookup()
            .times(1)
            .returning(|_| Err(AsicError::Synthetic("no fdb".into())));
        let mut hosts = table(4);
        assert_eq!(hosts.resolve(&asic, host(1), 0), None);
    }

    #[test]
    fn test_full_table_fresh_entries() {
        let mut asic = MockAsic::new();
        asic.expect_mac_port_lookup()
            .returning(|mac| Ok(Some(<[u8; 6]>::from(mac)[5] % 8)));
        let mut hosts = table(2);

        assert_eq!(hosts.resolve(&asic, host(1), 10), Some(1));
        assert_eq!(hosts.resolve(&asic, host(2), 10), Some(2));

        // Both entries are fresh, so the third host is resolved but dropped
        assert_eq!(hosts.resolve(&asic, host(3), 10), Some(3));
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts.learned(host(3)), None);
        assert_eq!(
            hosts.learned(host(1)),
            Some(Learned { port: 1, expires: 13 })
        );
        assert_eq!(
            hosts.learned(host(2)),
            Some(Learned { port: 2, expires: 13 })
        );
    }

    #[test]
    fn test_full_table_recycles_stale() {
        let mut asic = MockAsic::new();
        asic.expect_mac_port_lookup()
            .returning(|mac| Ok(Some(<[u8; 6]>::from(mac)[5] % 8)));
        let mut hosts = table(2);

        hosts.resolve(&asic, host(1), 10);
        hosts.resolve(&asic, host(2), 12);

        // host(1) expired at 13, host(2) is good through 15
        assert_eq!(hosts.resolve(&asic, host(3), 14), Some(3));
        assert_eq!(hosts.learned(host(1)), None);
        assert_eq!(
            hosts.learned(host(3)),
            Some(Learned { port: 3, expires: 17 })
        );
        assert_eq!(
            hosts.learned(host(2)),
            Some(Learned { port: 2, expires: 15 })
        );
        assert_eq!(hosts.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut asic = MockAsic::new();
        asic.expect_mac_port_lookup().returning(|_| Ok(Some(1)));
        let mut hosts = table(2);
        hosts.resolve(&asic, host(1), 0);
        hosts.clear();
        assert_eq!(hosts.len(), 0);
        assert_eq!(hosts.learned(host(1)), None);
    }
}
