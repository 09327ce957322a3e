// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::sync::atomic::{AtomicU64, Ordering};

use aal::{Clock, Tick};

/// A tick counter that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Tick) -> Self {
        ManualClock {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward by `ticks`, returning the new time.  The counter
    /// wraps like a real one would.
    pub fn advance(&self, ticks: Tick) -> Tick {
        let prev = self.now.fetch_add(ticks, Ordering::SeqCst);
        prev.wrapping_add(ticks)
    }

    pub fn set(&self, now: Tick) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        self.now.load(Ordering::SeqCst)
    }
}
