// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeMap;
use std::sync::Mutex;

use slog::{debug, o};

use aal::{AsicError, AsicOps, AsicResult};
use common::network::MacAddr;
use common::ports::{PortMask, PortNo, Ports};

pub mod clock;
pub mod multicast;
pub mod timer;

pub use clock::ManualClock;
pub use timer::StubTimers;

/// One call made into the stub driver, in the order it was made.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverCall {
    Lookup(MacAddr),
    PortmaskSet(MacAddr, PortMask),
    PortmaskClear(MacAddr),
    PortsAdd(MacAddr, PortMask),
    PortsRemove(MacAddr, PortMask),
}

pub struct StubHandle {
    log: slog::Logger,
    fdb: Mutex<BTreeMap<u64, PortNo>>,
    mc_data: Mutex<multicast::McGroupData>,
    journal: Mutex<Vec<DriverCall>>,
    // When set, every forwarding mask update fails with a synthetic error
    fail_updates: Mutex<bool>,
}

impl StubHandle {
    pub fn new(log: &slog::Logger) -> Self {
        let log = log.new(o!("unit" => "asic_stub"));
        StubHandle {
            log,
            fdb: Mutex::new(BTreeMap::new()),
            mc_data: Mutex::new(multicast::init()),
            journal: Mutex::new(Vec::new()),
            fail_updates: Mutex::new(false),
        }
    }

    /// Record that the switch has learned `mac` on `port`.
    pub fn learn(&self, mac: MacAddr, port: PortNo) {
        self.fdb.lock().unwrap().insert(u64::from(mac), port);
    }

    /// Age `mac` out of the switch's forwarding database.
    pub fn forget(&self, mac: MacAddr) {
        self.fdb.lock().unwrap().remove(&u64::from(mac));
    }

    /// The forwarding mask currently programmed for a multicast MAC.
    pub fn portmask(&self, group: MacAddr) -> PortMask {
        self.mc_data.lock().unwrap().portmask(group)
    }

    /// All multicast MACs with a non-empty forwarding mask.
    pub fn groups(&self) -> Vec<MacAddr> {
        self.mc_data.lock().unwrap().groups()
    }

    /// A copy of every call made so far.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.journal.lock().unwrap().clone()
    }

    /// Return the calls made so far, and start a fresh journal.
    pub fn take_calls(&self) -> Vec<DriverCall> {
        std::mem::take(&mut *self.journal.lock().unwrap())
    }

    /// The number of MAC lookups made for `mac`.
    pub fn lookup_count(&self, mac: MacAddr) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == DriverCall::Lookup(mac))
            .count()
    }

    pub fn set_fail_updates(&self, fail: bool) {
        *self.fail_updates.lock().unwrap() = fail;
    }

    fn record(&self, call: DriverCall) {
        self.journal.lock().unwrap().push(call);
    }

    fn update(
        &self,
        call: DriverCall,
        f: impl FnOnce(&mut multicast::McGroupData),
    ) -> AsicResult<()> {
        self.record(call);
        let group = match call {
            DriverCall::PortmaskSet(g, _)
            | DriverCall::PortmaskClear(g)
            | DriverCall::PortsAdd(g, _)
            | DriverCall::PortsRemove(g, _) => g,
            DriverCall::Lookup(mac) => mac,
        };
        if !group.is_multicast() {
            return Err(AsicError::InvalidArg(format!(
                "{group} is not a multicast address"
            )));
        }
        if *self.fail_updates.lock().unwrap() {
            return Err(AsicError::Synthetic(format!("{call:?}")));
        }
        f(&mut self.mc_data.lock().unwrap());
        Ok(())
    }
}

impl AsicOps for StubHandle {
    fn mac_port_lookup(&self, mac: MacAddr) -> AsicResult<Option<PortNo>> {
        self.record(DriverCall::Lookup(mac));
        let port = self.fdb.lock().unwrap().get(&u64::from(mac)).copied();
        debug!(self.log, "lookup {mac} -> {port:?}");
        Ok(port)
    }

    fn mc_portmask_set(
        &self,
        group: MacAddr,
        mask: PortMask,
    ) -> AsicResult<()> {
        debug!(self.log, "setting {group} to {}", Ports(mask));
        self.update(DriverCall::PortmaskSet(group, mask), |mc| {
            mc.set(group, mask)
        })
    }

    fn mc_portmask_clear(&self, group: MacAddr) -> AsicResult<()> {
        debug!(self.log, "clearing {group}");
        self.update(DriverCall::PortmaskClear(group), |mc| mc.clear(group))
    }

    fn mc_ports_add(&self, group: MacAddr, mask: PortMask) -> AsicResult<()> {
        debug!(self.log, "adding {} to {group}", Ports(mask));
        self.update(DriverCall::PortsAdd(group, mask), |mc| {
            mc.add(group, mask)
        })
    }

    fn mc_ports_remove(
        &self,
        group: MacAddr,
        mask: PortMask,
    ) -> AsicResult<()> {
        debug!(self.log, "removing {} from {group}", Ports(mask));
        self.update(DriverCall::PortsRemove(group, mask), |mc| {
            mc.remove(group, mask)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::Drain;

    fn logger() -> slog::Logger {
        let decorator =
            slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        slog::Logger::root(drain, o!())
    }

    #[test]
    fn test_lookup() -> anyhow::Result<()> {
        let hdl = StubHandle::new(&logger());
        let host = MacAddr::new(0x02, 0, 0, 0, 0, 1);

        assert_eq!(hdl.mac_port_lookup(host)?, None);
        hdl.learn(host, 3);
        assert_eq!(hdl.mac_port_lookup(host)?, Some(3));
        hdl.forget(host);
        assert_eq!(hdl.mac_port_lookup(host)?, None);
        assert_eq!(hdl.lookup_count(host), 3);
        Ok(())
    }

    #[test]
    fn test_journal() -> anyhow::Result<()> {
        let hdl = StubHandle::new(&logger());
        let group = MacAddr::new(0x01, 0x00, 0x5e, 0, 0, 1);

        hdl.mc_ports_add(group, 0b101)?;
        hdl.mc_ports_remove(group, 0b1)?;
        assert_eq!(hdl.portmask(group), 0b100);
        assert_eq!(
            hdl.take_calls(),
            vec![
                DriverCall::PortsAdd(group, 0b101),
                DriverCall::PortsRemove(group, 0b1),
            ]
        );
        assert!(hdl.calls().is_empty());
        Ok(())
    }

    #[test]
    fn test_fail_updates() {
        let hdl = StubHandle::new(&logger());
        let group = MacAddr::new(0x01, 0x00, 0x5e, 0, 0, 2);

        hdl.set_fail_updates(true);
        assert!(hdl.mc_ports_add(group, 0b1).is_err());
        assert_eq!(hdl.portmask(group), 0);

        // The failed call is still journaled
        assert_eq!(hdl.calls(), vec![DriverCall::PortsAdd(group, 0b1)]);
    }

    #[test]
    fn test_unicast_group() {
        let hdl = StubHandle::new(&logger());
        let host = MacAddr::new(0x02, 0, 0, 0, 0, 1);
        let err = hdl.mc_portmask_set(host, 0b1).unwrap_err();
        assert!(matches!(err, AsicError::InvalidArg(_)));
        assert!(hdl.groups().is_empty());
    }
}
