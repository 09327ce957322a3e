// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Tick arithmetic.
//!
//! Ticks come from a free-running counter that is allowed to wrap.  Two ticks
//! are ordered by the sign of their wrapping difference, so any pair less than
//! half the counter range apart compares correctly across the wrap.

/// A reading of the monotonic tick counter, or a duration measured in ticks.
pub type Tick = u64;

/// Returns `true` if `a` is strictly earlier than `b`.
pub fn is_before(a: Tick, b: Tick) -> bool {
    (a.wrapping_sub(b) as i64) < 0
}

/// Returns `true` if `a` is strictly later than `b`.
pub fn is_after(a: Tick, b: Tick) -> bool {
    is_before(b, a)
}

/// Returns `true` if `a` is later than or equal to `b`.
pub fn is_after_eq(a: Tick, b: Tick) -> bool {
    !is_before(a, b)
}

/// The tick `timeout` ticks after `now`.
pub fn deadline(now: Tick, timeout: Tick) -> Tick {
    now.wrapping_add(timeout)
}

/// The earlier of two ticks.
pub fn earliest(a: Tick, b: Tick) -> Tick {
    if is_before(b, a) {
        b
    } else {
        a
    }
}
