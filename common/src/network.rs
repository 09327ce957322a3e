// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Given an IPv4 multicast group address, generate the MAC address that frames
/// sent to that group carry (RFC 1112, section 6.4).  Only the low 23 bits of
/// the group address survive the mapping.
pub fn ipv4_multicast_mac_addr(ip: Ipv4Addr) -> MacAddr {
    let o = ip.octets();
    MacAddr::new(0x01, 0x00, 0x5e, o[1] & 0x7f, o[2], o[3])
}

/// An EUI-48 MAC address.  Both the hosts and the multicast groups tracked by
/// the snooper are keyed by one of these.
#[derive(Copy, Deserialize, Serialize, Clone, Eq, PartialEq, Hash)]
pub struct MacAddr {
    a: [u8; 6],
}

impl MacAddr {
    /// Create a new MAC address from octets in network byte order.
    pub fn new(o0: u8, o1: u8, o2: u8, o3: u8, o4: u8, o5: u8) -> MacAddr {
        MacAddr {
            a: [o0, o1, o2, o3, o4, o5],
        }
    }

    /// Return `true` if the group bit (the low bit of the first octet) is set.
    pub fn is_multicast(self) -> bool {
        self.a[0] & 0x01 != 0
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacError {
    #[error("expected 6 octets, found {0}")]
    OctetCount(usize),
    #[error("invalid octet: {0:?}")]
    InvalidOctet(String),
}

impl FromStr for MacAddr {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, MacError> {
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != 6 {
            return Err(MacError::OctetCount(octets.len()));
        }
        let mut a = [0u8; 6];
        for (dst, octet) in a.iter_mut().zip(octets) {
            if octet.is_empty()
                || octet.len() > 2
                || !octet.bytes().all(|b| b.is_ascii_hexdigit())
            {
                return Err(MacError::InvalidOctet(octet.to_string()));
            }
            *dst = u8::from_str_radix(octet, 16)
                .map_err(|_| MacError::InvalidOctet(octet.to_string()))?;
        }
        Ok(MacAddr { a })
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let a = &self.a;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(a: [u8; 6]) -> Self {
        Self { a }
    }
}

impl From<MacAddr> for [u8; 6] {
    fn from(mac: MacAddr) -> [u8; 6] {
        mac.a
    }
}

// The 48 bits of the address, in the low bits of a u64
impl From<MacAddr> for u64 {
    fn from(mac: MacAddr) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[2..].copy_from_slice(&mac.a);
        u64::from_be_bytes(bytes)
    }
}

impl From<u64> for MacAddr {
    fn from(x: u64) -> Self {
        let mut a = [0u8; 6];
        a.copy_from_slice(&x.to_be_bytes()[2..]);
        MacAddr { a }
    }
}
