// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

/// This is a simple structure for handing out and reclaiming the records that
/// track individual group members.  Every group, and the router state, draws
/// from the same pool.
use std::net::Ipv4Addr;

use crate::types::SnoopError;
use crate::types::SnoopResult;
use aal::Tick;

use slog::debug;

pub(crate) type MemberId = u16;

/// One listener (or router) heard on one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemberEntry {
    pub addr: Ipv4Addr,
    pub expires: Tick,
}

impl Default for MemberEntry {
    fn default() -> Self {
        MemberEntry {
            addr: Ipv4Addr::UNSPECIFIED,
            expires: 0,
        }
    }
}

/// A MemberPool is a fixed-capacity arena of MemberEntry records.  Records are
/// reserved lazily, up to the capacity, and released records are kept on a
/// freelist for reuse rather than returned to the allocator.
pub(crate) struct MemberPool {
    // Where debug messages are logged
    log: slog::Logger,
    // Maximum number of records that may ever be reserved
    capacity: usize,
    // Every record reserved so far, whether in use or free
    entries: Vec<MemberEntry>,
    // Released records, most recently released last
    freelist: Vec<MemberId>,
}

impl MemberPool {
    pub fn new(log: &slog::Logger, capacity: usize) -> Self {
        let log = log.new(slog::o!("unit" => "members"));
        debug!(log, "created member pool"; "capacity" => capacity);
        MemberPool {
            log,
            capacity,
            entries: Vec::new(),
            freelist: Vec::new(),
        }
    }

    // Discard every record, in use or not.  It is the caller's responsibility
    // not to free() records handed out prior to a reset().
    pub fn reset(&mut self) {
        debug!(self.log, "reset member pool";
            "reserved" => self.entries.len(),
            "free" => self.freelist.len(),
        );
        self.entries = Vec::new();
        self.freelist = Vec::new();
    }

    // Allocate a record for a new member.  A previously released record is
    // preferred; a new one is reserved only if the freelist is empty.  If the
    // pool is exhausted, we return an Error to the caller.
    pub fn alloc(
        &mut self,
        addr: Ipv4Addr,
        expires: Tick,
    ) -> SnoopResult<MemberId> {
        let entry = MemberEntry { addr, expires };
        if let Some(id) = self.freelist.pop() {
            self.entries[usize::from(id)] = entry;
            return Ok(id);
        }

        if self.entries.len() >= self.capacity {
            debug!(self.log, "member pool exhausted"; "addr" => %addr);
            return Err(SnoopError::TableFull("member".into()));
        }
        let id = MemberId::try_from(self.entries.len())
            .map_err(|_| SnoopError::TableFull("member".into()))?;
        self.entries.push(entry);
        Ok(id)
    }

    // Return a record to the freelist.  Its contents are wiped, so nothing of
    // the previous member survives into its next use.
    pub fn free(&mut self, id: MemberId) {
        self.entries[usize::from(id)] = MemberEntry::default();
        self.freelist.push(id);
    }

    pub fn get(&self, id: MemberId) -> &MemberEntry {
        &self.entries[usize::from(id)]
    }

    pub fn get_mut(&mut self, id: MemberId) -> &mut MemberEntry {
        &mut self.entries[usize::from(id)]
    }

    /// Number of records currently handed out.
    pub fn in_use(&self) -> usize {
        self.entries.len() - self.freelist.len()
    }

    /// Number of released records awaiting reuse.
    pub fn free_count(&self) -> usize {
        self.freelist.len()
    }
}

#[cfg(test)]
fn new_pool(capacity: usize) -> MemberPool {
    let log = crate::test_logger();
    MemberPool::new(&log, capacity)
}

#[cfg(test)]
fn addr(n: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, n)
}

// Test simple allocation.
#[test]
fn test_basic() -> anyhow::Result<()> {
    let mut pool = new_pool(128);

    let a = pool.alloc(addr(1), 10)?;
    assert_eq!(a, 0);
    let b = pool.alloc(addr(2), 20)?;
    assert_eq!(b, 1);
    assert_eq!(pool.get(a).addr, addr(1));
    assert_eq!(pool.get(b).expires, 20);
    assert_eq!(pool.in_use(), 2);
    assert_eq!(pool.free_count(), 0);
    Ok(())
}

// Test freeing post-allocation
#[test]
fn test_free() -> anyhow::Result<()> {
    let mut pool = new_pool(128);

    let a = pool.alloc(addr(1), 10)?;
    let _b = pool.alloc(addr(2), 10)?;
    pool.free(a);
    assert_eq!(pool.get(a), &MemberEntry::default());
    assert_eq!(pool.free_count(), 1);

    // The next allocation should be satisfied from the freelist, giving us
    // back the one we just freed, with none of its old contents
    let c = pool.alloc(addr(3), 30)?;
    assert_eq!(c, a);
    assert_eq!(pool.get(c), &MemberEntry { addr: addr(3), expires: 30 });
    assert_eq!(pool.in_use(), 2);
    Ok(())
}

#[test]
fn test_exhaustion() -> anyhow::Result<()> {
    let mut pool = new_pool(128);

    let mut s = Vec::new();
    for n in 0..128 {
        let id = pool
            .alloc(addr(n as u8), 0)
            .expect("exhausted pool prematurely");
        s.push(id);
    }
    let err = pool.alloc(addr(200), 0).unwrap_err();
    assert!(matches!(err, SnoopError::TableFull(_)));

    pool.free(s.pop().unwrap());
    let z = pool.alloc(addr(201), 0)?;
    assert_eq!(z, 127);

    Ok(())
}

#[test]
fn test_reset() -> anyhow::Result<()> {
    let mut pool = new_pool(2);
    let a = pool.alloc(addr(1), 0)?;
    pool.alloc(addr(2), 0)?;
    pool.free(a);
    pool.reset();
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.free_count(), 0);

    // The full capacity is available again
    assert_eq!(pool.alloc(addr(3), 0)?, 0);
    assert_eq!(pool.alloc(addr(4), 0)?, 1);
    pool.alloc(addr(5), 0).unwrap_err();
    Ok(())
}
