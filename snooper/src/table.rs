// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! A fixed-capacity table of MAC-keyed slots.
//!
//! Slots are addressed by a stable 16-bit index.  Each occupied slot is
//! threaded onto two index lists: the hash chain for its MAC, used for lookups,
//! and the age queue, which orders slots by when they were last (re)keyed and
//! is the order in which eviction candidates are considered.  A slot is never
//! freed once allocated: when the table is full, the owner picks a slot to
//! recycle and gives it a new identity in place.

use std::collections::VecDeque;

use common::network::MacAddr;

pub(crate) type SlotId = u16;

/// An entry that can live in a `SlotTable`.
pub(crate) trait Slot {
    fn mac(&self) -> MacAddr;
}

pub(crate) struct SlotTable<E> {
    capacity: usize,
    entries: Vec<E>,
    chains: Vec<Vec<SlotId>>,
    queue: VecDeque<SlotId>,
}

impl<E: Slot> SlotTable<E> {
    pub fn new(capacity: usize, hash_size: usize) -> Self {
        SlotTable {
            capacity,
            entries: Vec::new(),
            chains: vec![Vec::new(); hash_size],
            queue: VecDeque::new(),
        }
    }

    fn bucket(&self, mac: MacAddr) -> usize {
        // Multicast MACs differ only in their low octets, so mix the whole
        // address before folding it into the bucket range.
        let h = u64::from(mac).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        ((h >> 32) as usize) % self.chains.len()
    }

    /// Find the slot currently keyed by `mac`.
    pub fn lookup(&self, mac: MacAddr) -> Option<SlotId> {
        self.chains[self.bucket(mac)]
            .iter()
            .copied()
            .find(|id| self.entries[usize::from(*id)].mac() == mac)
    }

    /// Store a new entry in a never-used slot.  Returns `None` once every slot
    /// has been handed out.
    pub fn insert(&mut self, entry: E) -> Option<SlotId> {
        if self.entries.len() >= self.capacity {
            return None;
        }
        let id = SlotId::try_from(self.entries.len()).ok()?;
        self.entries.push(entry);
        self.link(id);
        Some(id)
    }

    /// Detach the oldest slot for which `eligible` holds from its hash chain
    /// and the age queue.  The caller must rekey the entry and then `link()`
    /// it again.
    pub fn unlink_oldest(
        &mut self,
        eligible: impl Fn(&E) -> bool,
    ) -> Option<SlotId> {
        let pos = self
            .queue
            .iter()
            .position(|id| eligible(&self.entries[usize::from(*id)]))?;
        let id = self.queue.remove(pos)?;
        let bucket = self.bucket(self.entries[usize::from(id)].mac());
        self.chains[bucket].retain(|other| *other != id);
        Some(id)
    }

    /// Thread a slot onto the head of its hash chain and the tail of the age
    /// queue, according to its current MAC.
    pub fn link(&mut self, id: SlotId) {
        let bucket = self.bucket(self.entries[usize::from(id)].mac());
        self.chains[bucket].insert(0, id);
        self.queue.push_back(id);
    }

    pub fn get(&self, id: SlotId) -> &E {
        &self.entries[usize::from(id)]
    }

    pub fn get_mut(&mut self, id: SlotId) -> &mut E {
        &mut self.entries[usize::from(id)]
    }

    /// The occupied slots, oldest first.
    pub fn ids(&self) -> Vec<SlotId> {
        self.queue.iter().copied().collect()
    }

    /// The occupied entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.queue.iter().map(|id| &self.entries[usize::from(*id)])
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Empty the table, returning the entries oldest first.
    pub fn drain(&mut self) -> Vec<E> {
        for chain in self.chains.iter_mut() {
            chain.clear();
        }
        let order: Vec<SlotId> = self.queue.drain(..).collect();
        let mut entries: Vec<Option<E>> =
            self.entries.drain(..).map(Some).collect();
        order
            .into_iter()
            .filter_map(|id| entries[usize::from(id)].take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Entry {
        mac: MacAddr,
        busy: bool,
    }

    impl Slot for Entry {
        fn mac(&self) -> MacAddr {
            self.mac
        }
    }

    fn mac(n: u8) -> MacAddr {
        MacAddr::new(0x01, 0x00, 0x5e, 0x00, 0x00, n)
    }

    fn entry(n: u8) -> Entry {
        Entry {
            mac: mac(n),
            busy: true,
        }
    }

    #[test]
    fn test_insert_lookup() {
        let mut table = SlotTable::new(4, 2);
        for n in 0..4 {
            assert_eq!(table.insert(entry(n)), Some(SlotId::from(n)));
        }
        assert_eq!(table.insert(entry(9)), None);
        assert_eq!(table.len(), 4);

        for n in 0..4 {
            assert_eq!(table.lookup(mac(n)), Some(SlotId::from(n)));
        }
        assert_eq!(table.lookup(mac(9)), None);
    }

    #[test]
    fn test_recycle() {
        let mut table = SlotTable::new(3, 8);
        for n in 0..3 {
            table.insert(entry(n));
        }
        table.get_mut(0).busy = true;
        table.get_mut(1).busy = false;
        table.get_mut(2).busy = false;

        // The oldest idle slot is chosen
        let id = table.unlink_oldest(|e| !e.busy).unwrap();
        assert_eq!(id, 1);
        assert_eq!(table.lookup(mac(1)), None);
        assert_eq!(table.len(), 2);

        *table.get_mut(id) = entry(7);
        table.link(id);
        assert_eq!(table.lookup(mac(7)), Some(1));

        // ...and the rekeyed slot moved to the back of the queue
        let order: Vec<MacAddr> = table.iter().map(|e| e.mac).collect();
        assert_eq!(order, vec![mac(0), mac(2), mac(7)]);

        table.get_mut(2).busy = true;
        table.get_mut(1).busy = true;
        assert_eq!(table.unlink_oldest(|e| !e.busy), None);
    }

    #[test]
    fn test_drain() {
        let mut table = SlotTable::new(3, 1);
        for n in 0..3 {
            table.insert(entry(n));
        }
        let id = table.unlink_oldest(|e| e.mac == mac(0)).unwrap();
        table.link(id);

        let drained: Vec<MacAddr> =
            table.drain().into_iter().map(|e| e.mac).collect();
        assert_eq!(drained, vec![mac(1), mac(2), mac(0)]);
        assert_eq!(table.len(), 0);
        assert_eq!(table.lookup(mac(1)), None);
        assert!(table.insert(entry(5)).is_some());
    }
}
