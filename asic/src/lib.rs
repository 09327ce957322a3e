// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Backends for the ASIC abstraction layer.
//!
//! The only backend in-tree is the stub, which keeps the switch's MAC and
//! multicast forwarding state in memory.  It is used by the snooper's tests,
//! and by anything that wants to exercise the cache without hardware.

pub mod stub;
