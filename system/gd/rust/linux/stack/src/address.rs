//! Bluetooth device address used as the key of every device session.

use std::convert::TryInto;
use std::fmt::{Debug, Display, Formatter, Result};

/// Represents a Bluetooth device address.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawAddress {
    pub address: [u8; 6],
}

impl Debug for RawAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_fmt(format_args!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.address[0],
            self.address[1],
            self.address[2],
            self.address[3],
            self.address[4],
            self.address[5]
        ))
    }
}

impl Display for RawAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Debug::fmt(self, f)
    }
}

impl RawAddress {
    /// Constructs a RawAddress from a slice of 6 bytes.
    pub fn from_bytes(raw_addr: &[u8]) -> Option<RawAddress> {
        match raw_addr.try_into() {
            Ok(address) => Some(RawAddress { address }),
            Err(_) => None,
        }
    }

    /// Parses the `AA:BB:CC:DD:EE:FF` form. Hex digits are case-insensitive.
    pub fn from_string<S: Into<String>>(addr: S) -> Option<RawAddress> {
        let addr: String = addr.into();
        let s = addr.split(':').collect::<Vec<&str>>();

        if s.len() != 6 {
            return None;
        }

        let mut raw: [u8; 6] = [0; 6];
        for (i, part) in s.iter().enumerate() {
            if part.len() != 2 {
                return None;
            }
            raw[i] = match u8::from_str_radix(part, 16) {
                Ok(res) => res,
                Err(_) => {
                    return None;
                }
            };
        }

        Some(RawAddress { address: raw })
    }

    pub fn to_byte_arr(&self) -> [u8; 6] {
        self.address
    }
}
