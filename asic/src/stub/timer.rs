// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeMap;
use std::sync::Mutex;

use aal::time;
use aal::{Tick, TimerId, TimerOps};

/// One-shot timers that fire only when the owner asks which are due.
#[derive(Default)]
pub struct StubTimers {
    armed: Mutex<BTreeMap<TimerId, Tick>>,
}

impl StubTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disarm and return every timer whose deadline is at or before `now`,
    /// earliest deadline first.  The caller is expected to dispatch each of
    /// them to its owner.
    pub fn expire(&self, now: Tick) -> Vec<TimerId> {
        let mut armed = self.armed.lock().unwrap();
        let mut due: Vec<(Tick, TimerId)> = armed
            .iter()
            .filter(|(_, deadline)| !time::is_after(**deadline, now))
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort_by(|a, b| {
            if time::is_before(a.0, b.0) {
                std::cmp::Ordering::Less
            } else if time::is_before(b.0, a.0) {
                std::cmp::Ordering::Greater
            } else {
                a.1.cmp(&b.1)
            }
        });
        for (_, id) in &due {
            armed.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }
}

impl TimerOps for StubTimers {
    fn timer_schedule(&self, id: TimerId, deadline: Tick) {
        self.armed.lock().unwrap().insert(id, deadline);
    }

    fn timer_cancel(&self, id: TimerId) {
        self.armed.lock().unwrap().remove(&id);
    }

    fn timer_deadline(&self, id: TimerId) -> Option<Tick> {
        self.armed.lock().unwrap().get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire() {
        let timers = StubTimers::new();
        timers.timer_schedule(TimerId::RouterExpiry, 10);
        timers.timer_schedule(TimerId::GroupSweep, 5);

        assert!(timers.expire(4).is_empty());
        assert_eq!(timers.expire(5), vec![TimerId::GroupSweep]);
        assert!(!timers.timer_armed(TimerId::GroupSweep));
        assert!(timers.timer_armed(TimerId::RouterExpiry));

        timers.timer_schedule(TimerId::GroupSweep, 8);
        assert_eq!(
            timers.expire(20),
            vec![TimerId::GroupSweep, TimerId::RouterExpiry]
        );
        assert!(timers.expire(30).is_empty());
    }

    #[test]
    fn test_reschedule() {
        let timers = StubTimers::new();
        timers.timer_schedule(TimerId::GroupSweep, 5);
        timers.timer_schedule(TimerId::GroupSweep, 50);
        assert!(timers.expire(10).is_empty());
        timers.timer_cancel(TimerId::GroupSweep);
        assert!(timers.expire(100).is_empty());
    }
}
