// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The abstraction layer between the snooping cache and the pieces of the
//! switch it consumes but does not implement: the forwarding ASIC driver, the
//! timer service, and the tick counter.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use common::network::MacAddr;
use common::ports::PortMask;
use common::ports::PortNo;

pub mod time;
pub use time::Tick;

/// A specialized Result type for ASIC operations
pub type AsicResult<T> = Result<T, AsicError>;

/// Error type conveying additional information about ASIC errors
#[derive(Error, Debug)]
pub enum AsicError {
    /// An argument passed to the ASIC layer is invalid or inappropriate.  This
    /// indicates misbehavior from the caller.
    #[error("Invalid argument: {}", .0)]
    InvalidArg(String),
    /// This operation is unsupported by the ASIC model being used
    #[error("Operation unsupported by the ASIC")]
    OperationUnsupported,
    /// An error derived from a purposely triggered synthetic fault for testing
    /// purposes.
    #[error("Synthetic ASIC error: {}", .0)]
    Synthetic(String),
}

/// The `AsicOps` trait contains the switch driver operations the snooping
/// cache requires: the learned MAC-to-port lookup, and maintenance of the
/// per-group multicast forwarding masks.
///
/// All of these are expected to complete synchronously.  The cache treats the
/// mask updates as notifications: an error is logged, but the cache's own
/// state is never rolled back because of it.
pub trait AsicOps {
    /// Report the port on which the switch has learned `mac`, or `None` if the
    /// address hasn't been seen.
    fn mac_port_lookup(&self, mac: MacAddr) -> AsicResult<Option<PortNo>>;

    /// Replace the forwarding mask for a multicast MAC.
    fn mc_portmask_set(&self, group: MacAddr, mask: PortMask)
        -> AsicResult<()>;

    /// Remove all forwarding state for a multicast MAC.
    fn mc_portmask_clear(&self, group: MacAddr) -> AsicResult<()>;

    /// Add the ports in `mask` to a multicast MAC's forwarding mask, creating
    /// the entry if needed.
    fn mc_ports_add(&self, group: MacAddr, mask: PortMask) -> AsicResult<()>;

    /// Remove the ports in `mask` from a multicast MAC's forwarding mask.
    fn mc_ports_remove(&self, group: MacAddr, mask: PortMask)
        -> AsicResult<()>;
}

/// Identifies one of the timers owned by the snooping cache.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize,
    Serialize,
)]
pub enum TimerId {
    /// Periodic expiry sweep over the whole group table
    GroupSweep,
    /// Expiry of the earliest multicast router entry
    RouterExpiry,
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerId::GroupSweep => write!(f, "group_sweep"),
            TimerId::RouterExpiry => write!(f, "router_expiry"),
        }
    }
}

/// One-shot timers, addressed by `TimerId`.
///
/// A timer fires at most once per arming.  When its deadline is reached the
/// service disarms it and then tells the owner, which is free to arm it again
/// from inside the callback.
pub trait TimerOps {
    /// Arm the timer for `deadline`, replacing any deadline it already has.
    fn timer_schedule(&self, id: TimerId, deadline: Tick);

    /// Disarm the timer.  Cancelling an idle timer is not an error.
    fn timer_cancel(&self, id: TimerId);

    /// The deadline of an armed timer, or `None` if it is idle.
    fn timer_deadline(&self, id: TimerId) -> Option<Tick>;

    fn timer_armed(&self, id: TimerId) -> bool {
        self.timer_deadline(id).is_some()
    }

    /// Arm the timer for `deadline` if it is idle or currently set to fire
    /// later than that.
    fn timer_schedule_earlier(&self, id: TimerId, deadline: Tick) {
        match self.timer_deadline(id) {
            Some(current) if !time::is_before(deadline, current) => {}
            _ => self.timer_schedule(id, deadline),
        }
    }
}

/// Source of the monotonic tick counter.
pub trait Clock {
    fn now(&self) -> Tick;
}

impl<T: AsicOps + ?Sized> AsicOps for std::sync::Arc<T> {
    fn mac_port_lookup(&self, mac: MacAddr) -> AsicResult<Option<PortNo>> {
        (**self).mac_port_lookup(mac)
    }

    fn mc_portmask_set(
        &self,
        group: MacAddr,
        mask: PortMask,
    ) -> AsicResult<()> {
        (**self).mc_portmask_set(group, mask)
    }

    fn mc_portmask_clear(&self, group: MacAddr) -> AsicResult<()> {
        (**self).mc_portmask_clear(group)
    }

    fn mc_ports_add(&self, group: MacAddr, mask: PortMask) -> AsicResult<()> {
        (**self).mc_ports_add(group, mask)
    }

    fn mc_ports_remove(
        &self,
        group: MacAddr,
        mask: PortMask,
    ) -> AsicResult<()> {
        (**self).mc_ports_remove(group, mask)
    }
}

impl<T: TimerOps + ?Sized> TimerOps for std::sync::Arc<T> {
    fn timer_schedule(&self, id: TimerId, deadline: Tick) {
        (**self).timer_schedule(id, deadline)
    }

    fn timer_cancel(&self, id: TimerId) {
        (**self).timer_cancel(id)
    }

    fn timer_deadline(&self, id: TimerId) -> Option<Tick> {
        (**self).timer_deadline(id)
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> Tick {
        (**self).now()
    }
}
