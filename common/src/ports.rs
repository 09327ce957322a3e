// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fmt;

/// A physical switch port number, counted from 0.
pub type PortNo = u8;

/// A bit-per-port set of switch ports.  Bit `n` stands for port `n`.
pub type PortMask = u32;

/// The highest port number that fits in a `PortMask`.
pub const PORT_MASK_MAX: PortNo = (PortMask::BITS - 1) as PortNo;

/// Return the mask containing only `port`.
///
/// # Panics
///
/// Panics if `port` is larger than `PORT_MASK_MAX`.
pub fn port_bit(port: PortNo) -> PortMask {
    assert!(port <= PORT_MASK_MAX, "port {port} does not fit in a port mask");
    1 << port
}

/// Iterate over the ports included in a mask, lowest first.
pub fn mask_ports(mask: PortMask) -> impl Iterator<Item = PortNo> {
    (0..=PORT_MASK_MAX).filter(move |p| mask & (1 << p) != 0)
}

/// Wrapper used to render a `PortMask` as a list of ports in log messages,
/// e.g. `[0,2]`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ports(pub PortMask);

impl fmt::Display for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, port) in mask_ports(self.0).enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{port}")?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} ({:#b})", self.0)
    }
}
