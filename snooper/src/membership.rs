// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Per-port member lists, and the port mask derived from them.
//!
//! The same structure records the listeners of a multicast group and the
//! multicast routers attached to the switch.

use std::net::Ipv4Addr;

use crate::members::MemberId;
use crate::members::MemberPool;
use crate::types::SnoopResult;
use aal::time;
use aal::Tick;
use common::ports::port_bit;
use common::ports::PortMask;
use common::ports::PortNo;

pub(crate) struct Membership {
    // One list of pooled member records per physical port
    lists: Vec<Vec<MemberId>>,
    // Ports whose list is non-empty.  Only ever assigned by recompute().
    bitmask: PortMask,
    expires: Tick,
}

impl Membership {
    pub fn new(port_max: PortNo) -> Self {
        Membership {
            lists: vec![Vec::new(); usize::from(port_max) + 1],
            bitmask: 0,
            expires: 0,
        }
    }

    pub fn bitmask(&self) -> PortMask {
        self.bitmask
    }

    pub fn expires(&self) -> Tick {
        self.expires
    }

    pub fn set_expires(&mut self, expires: Tick) {
        self.expires = expires;
    }

    pub fn find(
        &self,
        pool: &MemberPool,
        port: PortNo,
        addr: Ipv4Addr,
    ) -> Option<MemberId> {
        self.lists[usize::from(port)]
            .iter()
            .copied()
            .find(|id| pool.get(*id).addr == addr)
    }

    /// Record `addr` as a member on `port` until `expires`.  An existing
    /// member is refreshed rather than duplicated.  Fails only if the pool has
    /// no record to spare.
    pub fn join(
        &mut self,
        pool: &mut MemberPool,
        port: PortNo,
        addr: Ipv4Addr,
        expires: Tick,
    ) -> SnoopResult<MemberId> {
        if let Some(id) = self.find(pool, port, addr) {
            pool.get_mut(id).expires = expires;
            return Ok(id);
        }
        let id = pool.alloc(addr, expires)?;
        self.lists[usize::from(port)].insert(0, id);
        Ok(id)
    }

    /// Drop `addr` from `port`, returning its record to the pool.  Returns
    /// `false` if it wasn't a member.
    pub fn leave(
        &mut self,
        pool: &mut MemberPool,
        port: PortNo,
        addr: Ipv4Addr,
    ) -> bool {
        match self.find(pool, port, addr) {
            Some(id) => {
                self.lists[usize::from(port)].retain(|other| *other != id);
                pool.free(id);
                true
            }
            None => false,
        }
    }

    /// Rebuild the port mask from the member lists, returning the new mask.
    pub fn recompute(&mut self) -> PortMask {
        self.bitmask = self
            .lists
            .iter()
            .enumerate()
            .filter(|(_, list)| !list.is_empty())
            .fold(0, |mask, (port, _)| mask | port_bit(port as PortNo));
        self.bitmask
    }

    /// Release every member and clear the port mask.
    pub fn reset(&mut self, pool: &mut MemberPool) {
        for list in self.lists.iter_mut() {
            for id in list.drain(..) {
                pool.free(id);
            }
        }
        self.bitmask = 0;
    }

    /// Release each member whose expiry is not after `now`, and recompute the
    /// port mask.  Returns the earliest expiry among the survivors.
    pub fn expire_members(
        &mut self,
        pool: &mut MemberPool,
        now: Tick,
    ) -> Option<Tick> {
        let mut next: Option<Tick> = None;
        for list in self.lists.iter_mut() {
            list.retain(|id| {
                let expires = pool.get(*id).expires;
                if time::is_after(expires, now) {
                    next = Some(match next {
                        Some(t) => time::earliest(t, expires),
                        None => expires,
                    });
                    true
                } else {
                    pool.free(*id);
                    false
                }
            });
        }
        self.recompute();
        next
    }

    pub fn member_count(&self) -> usize {
        self.lists.iter().map(|list| list.len()).sum()
    }

    /// Every member as (port, record id), lowest port first.
    pub fn members(&self) -> impl Iterator<Item = (PortNo, MemberId)> + '_ {
        self.lists.iter().enumerate().flat_map(|(port, list)| {
            list.iter().map(move |id| (port as PortNo, *id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, n)
    }

    fn pool() -> MemberPool {
        MemberPool::new(&crate::test_logger(), 16)
    }

    #[test]
    fn test_join_refresh() -> anyhow::Result<()> {
        let mut pool = pool();
        let mut m = Membership::new(7);

        let a = m.join(&mut pool, 2, addr(5), 10)?;
        let b = m.join(&mut pool, 2, addr(5), 20)?;
        assert_eq!(a, b);
        assert_eq!(pool.get(a).expires, 20);
        assert_eq!(m.member_count(), 1);
        assert_eq!(pool.in_use(), 1);

        // The mask only moves when recomputed
        assert_eq!(m.bitmask(), 0);
        assert_eq!(m.recompute(), 0b100);
        Ok(())
    }

    #[test]
    fn test_same_addr_other_port() -> anyhow::Result<()> {
        let mut pool = pool();
        let mut m = Membership::new(7);

        m.join(&mut pool, 0, addr(5), 10)?;
        m.join(&mut pool, 3, addr(5), 10)?;
        assert_eq!(m.recompute(), 0b1001);

        assert!(m.leave(&mut pool, 0, addr(5)));
        assert!(!m.leave(&mut pool, 0, addr(5)));
        assert_eq!(m.recompute(), 0b1000);
        assert_eq!(pool.in_use(), 1);
        Ok(())
    }

    #[test]
    fn test_reset() -> anyhow::Result<()> {
        let mut pool = pool();
        let mut m = Membership::new(3);
        for n in 0..4 {
            m.join(&mut pool, n, addr(n), 10)?;
        }
        assert_eq!(m.recompute(), 0b1111);

        m.reset(&mut pool);
        assert_eq!(m.bitmask(), 0);
        assert_eq!(m.member_count(), 0);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.free_count(), 4);
        Ok(())
    }

    #[test]
    fn test_expire_members() -> anyhow::Result<()> {
        let mut pool = pool();
        let mut m = Membership::new(7);
        m.join(&mut pool, 0, addr(1), 5)?;
        m.join(&mut pool, 1, addr(2), 12)?;
        m.join(&mut pool, 1, addr(3), 9)?;
        m.recompute();

        // Nothing has expired yet
        assert_eq!(m.expire_members(&mut pool, 4), Some(5));
        assert_eq!(m.bitmask(), 0b11);

        // A member expires at its deadline, not after it
        assert_eq!(m.expire_members(&mut pool, 5), Some(9));
        assert_eq!(m.bitmask(), 0b10);

        assert_eq!(m.expire_members(&mut pool, 12), None);
        assert_eq!(m.bitmask(), 0);
        assert_eq!(pool.in_use(), 0);
        Ok(())
    }

    #[test]
    fn test_pool_exhaustion() -> anyhow::Result<()> {
        let mut pool = MemberPool::new(&crate::test_logger(), 1);
        let mut m = Membership::new(7);
        m.join(&mut pool, 0, addr(1), 5)?;
        assert!(m.join(&mut pool, 1, addr(2), 5).is_err());

        // Refreshing an existing member needs no new record
        m.join(&mut pool, 0, addr(1), 50)?;
        assert_eq!(m.recompute(), 0b1);
        Ok(())
    }
}
