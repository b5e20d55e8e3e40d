// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Layer-2 and switch identifiers shared by the controller client and the
//! provisioning core.

use std::fmt;
use std::str::FromStr;

use serde::de;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

/// An EUI-48 MAC address, used for layer-2 addressing.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
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
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacError {
    /// Too few octets to be a valid MAC address
    #[error("Too few octets")]
    TooShort,
    /// Too many octets to be a valid MAC address
    #[error("Too many octets")]
    TooLong,
    /// Found an octet with a non-hexadecimal character or invalid separator
    #[error("Invalid octet")]
    InvalidOctet,
}

// Parse `count` colon-separated hex octets.  Both MAC addresses and switch
// datapath IDs use this notation.
fn parse_octets<const N: usize>(s: &str) -> Result<[u8; N], MacError> {
    let v: Vec<&str> = s.trim().split(':').collect();

    match v.len().cmp(&N) {
        std::cmp::Ordering::Less => Err(MacError::TooShort),
        std::cmp::Ordering::Greater => Err(MacError::TooLong),
        std::cmp::Ordering::Equal => {
            let mut a = [0u8; N];
            for (i, octet) in v.iter().enumerate() {
                if octet.is_empty() || octet.len() > 2 {
                    return Err(MacError::InvalidOctet);
                }
                a[i] = u8::from_str_radix(octet, 16)
                    .map_err(|_| MacError::InvalidOctet)?;
            }
            Ok(a)
        }
    }
}

impl FromStr for MacAddr {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, MacError> {
        parse_octets::<6>(s).map(|a| MacAddr { a })
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.a[0], self.a[1], self.a[2], self.a[3], self.a[4], self.a[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(|e| {
            de::Error::custom(format!("invalid MAC address {s:?}: {e}"))
        })
    }
}

/// An OpenFlow datapath ID, naming a single switch.
///
/// Controllers report these as eight colon-separated octets, e.g.
/// `00:00:00:00:00:00:00:01`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Dpid(u64);

impl Dpid {
    pub const fn new(id: u64) -> Self {
        Dpid(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl FromStr for Dpid {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, MacError> {
        parse_octets::<8>(s).map(|a| Dpid(u64::from_be_bytes(a)))
    }
}

impl fmt::Display for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let o = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5], o[6], o[7]
        )
    }
}

impl fmt::Debug for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Dpid {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dpid {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse()
            .map_err(|e| de::Error::custom(format!("invalid DPID {s:?}: {e}")))
    }
}
