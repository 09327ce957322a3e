// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::net::Ipv4Addr;

use slog::{debug, error, info, o};

use crate::config::Config;
use crate::groups::{Claim, GroupTable};
use crate::hosts::HostTable;
use crate::members::MemberPool;
use crate::membership::Membership;
use crate::types::{SnoopError, SnoopResult};
use crate::views::{CacheStats, GroupView, MemberView};
use aal::time;
use aal::{AsicOps, Clock, Tick, TimerId, TimerOps};
use common::network::MacAddr;
use common::ports::{PortMask, PortNo, Ports};

mod routers;

/// The snooping cache.  All of the cache's state lives here, along with the
/// collaborators it drives: the switch driver `D`, the timer service `T` and
/// the tick source `C`.
///
/// The cache is not internally synchronized.  Every operation, including
/// `timer_fired()`, must be delivered from a single execution context.
pub struct SnoopCache<D: AsicOps, T: TimerOps, C: Clock> {
    log: slog::Logger,
    port_max: PortNo,
    asic: D,
    timers: T,
    clock: C,
    hosts: HostTable,
    groups: GroupTable,
    members: MemberPool,
    // Ports with a multicast router attached, tracked like a group that
    // isn't in the group table
    routers: Membership,
}

impl<D: AsicOps, T: TimerOps, C: Clock> SnoopCache<D, T, C> {
    /// Build an empty cache sized according to `config`.  Neither timer is
    /// armed until there is something to expire.
    pub fn initialize(
        log: &slog::Logger,
        config: &Config,
        asic: D,
        timers: T,
        clock: C,
    ) -> SnoopResult<Self> {
        config.validate()?;
        let log = log.new(o!("unit" => "snooper"));

        timers.timer_cancel(TimerId::GroupSweep);
        timers.timer_cancel(TimerId::RouterExpiry);

        info!(log, "initialized cache";
            "groups" => config.group_pool_size,
            "members" => config.member_pool_size,
            "hosts" => config.host_pool_size,
            "hash_size" => config.hash_size,
            "host_ttl" => config.host_ttl,
            "port_max" => config.port_max,
        );

        Ok(SnoopCache {
            hosts: HostTable::new(&log, config),
            groups: GroupTable::new(config),
            members: MemberPool::new(&log, config.member_pool_size),
            routers: Membership::new(config.port_max),
            port_max: config.port_max,
            asic,
            timers,
            clock,
            log,
        })
    }

    /// Tear the cache down.  Both timers are cancelled, every group's
    /// forwarding state is cleared in the switch, and all records are
    /// released.  The collaborators are handed back to the caller.
    pub fn shutdown(mut self) -> (D, T, C) {
        self.timers.timer_cancel(TimerId::GroupSweep);
        self.timers.timer_cancel(TimerId::RouterExpiry);

        let groups = self.groups.drain();
        let count = groups.len();
        for group in groups {
            let mut members = group.members;
            members.reset(&mut self.members);
            self.portmask_clear(group.mac);
        }
        self.routers.reset(&mut self.members);
        self.members.reset();
        self.hosts.clear();
        info!(self.log, "shut down cache"; "groups" => count);

        (self.asic, self.timers, self.clock)
    }

    fn validate_port(&self, port: PortNo) -> SnoopResult<()> {
        if port > self.port_max {
            Err(SnoopError::InvalidPort {
                port,
                port_max: self.port_max,
            })
        } else {
            Ok(())
        }
    }

    /// Return the switch port on which `mac` was last seen, or `None` if the
    /// switch doesn't know.
    pub fn resolve_port(&mut self, mac: MacAddr) -> Option<PortNo> {
        let now = self.clock.now();
        self.hosts.resolve(&self.asic, mac, now)
    }

    /// Record that `addr`, heard on `port`, is listening to `group` for the
    /// next `timeout` ticks.  Returns the ports that became active for the
    /// group as a result.  If there is no room to record the member, nothing
    /// changes and the returned mask is empty.
    pub fn add_member(
        &mut self,
        group: MacAddr,
        addr: Ipv4Addr,
        port: PortNo,
        timeout: Tick,
    ) -> SnoopResult<PortMask> {
        self.validate_port(port)?;

        let claim = match self.groups.claim(group, &mut self.members) {
            Some(claim) => claim,
            None => {
                debug!(self.log, "group table full"; "group" => %group);
                return Ok(0);
            }
        };
        if let Claim::Recycled { previous, .. } = claim {
            debug!(self.log, "recycled group slot";
                "old" => %previous, "new" => %group);
            self.portmask_clear(previous);
        }

        let expires = time::deadline(self.clock.now(), timeout);
        let entry = self.groups.get_mut(claim.id());
        let before = entry.members.bitmask();
        entry.members.set_expires(expires);
        if let Err(e) =
            entry.members.join(&mut self.members, port, addr, expires)
        {
            debug!(self.log, "member not added";
                "group" => %group, "addr" => %addr, "error" => %e);
        }
        let added = entry.members.recompute() & !before;

        self.timers.timer_schedule_earlier(TimerId::GroupSweep, expires);
        debug!(self.log, "member";
            "group" => %group,
            "added" => %Ports(added),
            "addr" => %addr,
            "port" => port,
            "expires_in" => timeout,
        );

        if added != 0 {
            self.ports_add(group, added | self.routers.bitmask());
        }
        Ok(added)
    }

    /// Record that `addr` on `port` has left `group`.  Returns the ports that
    /// the group no longer has listeners on.  Router ports are left in the
    /// switch's forwarding mask, even when they are reported here.
    pub fn remove_member(
        &mut self,
        group: MacAddr,
        addr: Ipv4Addr,
        port: PortNo,
    ) -> SnoopResult<PortMask> {
        self.validate_port(port)?;

        let Some(id) = self.groups.lookup(group) else {
            return Ok(0);
        };
        let entry = self.groups.get_mut(id);
        let before = entry.members.bitmask();
        entry.members.leave(&mut self.members, port, addr);
        let after = entry.members.recompute();
        let removed = before & !after;
        if after == 0 {
            entry.members.reset(&mut self.members);
        }
        debug!(self.log, "member";
            "group" => %group,
            "removed" => %Ports(removed),
            "addr" => %addr,
            "port" => port,
        );

        let clear = removed & !self.routers.bitmask();
        if clear != 0 {
            self.ports_remove(group, clear);
        }
        Ok(removed)
    }

    /// Bring forward (or push back) the expiry of one group, or of every group
    /// if `group` is `None`, to `timeout` ticks from now.  Returns the number
    /// of groups affected.
    pub fn force_expire(
        &mut self,
        group: Option<MacAddr>,
        timeout: Tick,
    ) -> usize {
        let ids = match group {
            None => self.groups.ids(),
            Some(mac) => match self.groups.lookup(mac) {
                Some(id) => vec![id],
                None => {
                    debug!(self.log, "no group to expire"; "group" => %mac);
                    return 0;
                }
            },
        };

        let expires = time::deadline(self.clock.now(), timeout);
        for id in &ids {
            self.groups.get_mut(*id).members.set_expires(expires);
        }
        match group {
            Some(mac) => debug!(self.log, "fast expire";
                "group" => %mac, "expires_in" => timeout),
            None => debug!(self.log, "fast expire";
                "groups" => ids.len(), "expires_in" => timeout),
        }

        if !ids.is_empty() {
            self.timers
                .timer_schedule_earlier(TimerId::GroupSweep, expires);
        }
        ids.len()
    }

    /// Handle the expiry of one of the cache's timers.  The timer service is
    /// expected to have disarmed the timer before calling this.
    pub fn timer_fired(&mut self, id: TimerId) {
        match id {
            TimerId::GroupSweep => self.group_sweep(),
            TimerId::RouterExpiry => self.router_sweep(),
        }
    }

    // Drop every active group whose expiry has arrived, and arm the timer for
    // the earliest expiry among those that remain.
    fn group_sweep(&mut self) {
        let now = self.clock.now();
        let mut next: Option<Tick> = None;

        for id in self.groups.ids() {
            let entry = self.groups.get_mut(id);
            let ports = entry.members.bitmask();
            if ports == 0 {
                continue;
            }
            let expires = entry.members.expires();
            if time::is_after(expires, now) {
                next = Some(match next {
                    Some(t) => time::earliest(t, expires),
                    None => expires,
                });
                continue;
            }

            entry.members.reset(&mut self.members);
            let mac = entry.mac;
            debug!(self.log, "expire";
                "group" => %mac, "ports" => %Ports(ports));

            let clear = ports & !self.routers.bitmask();
            if clear != 0 {
                self.ports_remove(mac, clear);
            }
        }

        match next {
            Some(deadline) => {
                self.timers.timer_schedule(TimerId::GroupSweep, deadline)
            }
            None => self.timers.timer_cancel(TimerId::GroupSweep),
        }
    }

    /// Push the forwarding mask of every group back into the switch, for use
    /// after the driver has lost its state.  Groups with neither listeners nor
    /// routers are cleared.
    pub fn resync(&self) {
        let routers = self.routers.bitmask();
        let mut count = 0;
        for entry in self.groups.iter() {
            let ports = entry.members.bitmask() | routers;
            if ports == 0 {
                self.portmask_clear(entry.mac);
            } else {
                self.portmask_set(entry.mac, ports);
                count += 1;
            }
        }
        info!(self.log, "resynced forwarding masks";
            "groups" => self.groups.len(), "forwarding" => count);
    }

    /// The ports on which `group` has listeners, not counting router ports.
    /// Returns `None` if the group isn't in the table.
    pub fn group_ports(&self, group: MacAddr) -> Option<PortMask> {
        self.groups
            .lookup(group)
            .map(|id| self.groups.get(id).members.bitmask())
    }

    /// The ports the switch should forward `group`'s traffic to: its
    /// listeners' ports plus every router port.
    pub fn forwarding_ports(&self, group: MacAddr) -> Option<PortMask> {
        self.group_ports(group)
            .map(|ports| ports | self.routers.bitmask())
    }

    pub fn router_ports(&self) -> PortMask {
        self.routers.bitmask()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hosts: self.hosts.len(),
            groups: self.groups.len(),
            active_groups: self
                .groups
                .iter()
                .filter(|g| g.members.bitmask() != 0)
                .count(),
            members_in_use: self.members.in_use(),
            members_free: self.members.free_count(),
            routers: self.routers.member_count(),
            router_ports: self.routers.bitmask(),
            group_sweep_armed: self.timers.timer_armed(TimerId::GroupSweep),
            router_expiry_armed: self
                .timers
                .timer_armed(TimerId::RouterExpiry),
        }
    }

    /// A snapshot of every group with at least one listener, oldest first.
    pub fn groups(&self) -> Vec<GroupView> {
        self.groups
            .iter()
            .filter(|g| g.members.bitmask() != 0)
            .map(|g| GroupView {
                mac: g.mac,
                ports: g.members.bitmask(),
                expires: g.members.expires(),
                members: g
                    .members
                    .members()
                    .map(|(port, id)| {
                        let member = self.members.get(id);
                        MemberView {
                            port,
                            addr: member.addr,
                            expires: member.expires,
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    // The forwarding mask updates are notifications.  If the driver rejects
    // one, the cache carries on with its own view of the world.

    fn ports_add(&self, group: MacAddr, mask: PortMask) {
        if let Err(e) = self.asic.mc_ports_add(group, mask) {
            error!(self.log, "failed to add ports";
                "group" => %group, "ports" => %Ports(mask), "error" => %e);
        }
    }

    fn ports_remove(&self, group: MacAddr, mask: PortMask) {
        if let Err(e) = self.asic.mc_ports_remove(group, mask) {
            error!(self.log, "failed to remove ports";
                "group" => %group, "ports" => %Ports(mask), "error" => %e);
        }
    }

    fn portmask_set(&self, group: MacAddr, mask: PortMask) {
        if let Err(e) = self.asic.mc_portmask_set(group, mask) {
            error!(self.log, "failed to set portmask";
                "group" => %group, "ports" => %Ports(mask), "error" => %e);
        }
    }

    fn portmask_clear(&self, group: MacAddr) {
        if let Err(e) = self.asic.mc_portmask_clear(group) {
            error!(self.log, "failed to clear portmask";
                "group" => %group, "error" => %e);
        }
    }
}
