//! Single-token predicates shared by the interface and bond spec grammars.
//!
//! Every predicate looks at one token in isolation. The grammars decide what a
//! token means by combining these checks in a fixed order per token count.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::LazyLock;

use mac_address::MacAddress;

use crate::bondspec::{BondMode, LacpMode};

pub const WIFI_KEYWORD: &str = "wifi";
pub const QINQ_KEYWORD: &str = "qinq";
pub const NO_FALLBACK_KEYWORD: &str = "no-lacp-fallback";

/// IEEE-registered OUIs of common hypervisor and NIC vendors.
const KNOWN_VENDOR_PREFIXES: &[([u8; 3], &str)] = &[
    ([0x00, 0x03, 0xff], "Microsoft"),
    ([0x00, 0x05, 0x69], "VMware"),
    ([0x00, 0x0c, 0x29], "VMware"),
    ([0x00, 0x15, 0x5d], "Microsoft"),
    ([0x00, 0x16, 0x3e], "Xensource"),
    ([0x00, 0x1b, 0x21], "Intel"),
    ([0x00, 0x1c, 0x14], "VMware"),
    ([0x00, 0x1c, 0x42], "Parallels"),
    ([0x00, 0x50, 0x56], "VMware"),
    ([0x00, 0xe0, 0x4c], "Realtek"),
    ([0x08, 0x00, 0x27], "PCS Systemtechnik"),
    ([0x3c, 0xfd, 0xfe], "Intel"),
];

static VENDOR_PREFIXES: LazyLock<HashMap<[u8; 3], &'static str>> =
    LazyLock::new(|| KNOWN_VENDOR_PREFIXES.iter().copied().collect());

/// Hardware address lengths accepted in interface specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareAddr {
    Eui48(MacAddress),
    Eui64([u8; 8]),
    Infiniband([u8; 20]),
}

impl HardwareAddr {
    pub fn oui(&self) -> [u8; 3] {
        match self {
            HardwareAddr::Eui48(mac) => {
                let octets = mac.bytes();
                [octets[0], octets[1], octets[2]]
            }
            HardwareAddr::Eui64(octets) => [octets[0], octets[1], octets[2]],
            HardwareAddr::Infiniband(octets) => [octets[0], octets[1], octets[2]],
        }
    }
}

/// Parse a 6, 8 or 20 octet hardware address, written either as two hex
/// digit groups joined by a single `:` or `-`, or as four hex digit groups
/// joined by `.`.
pub fn parse_mac(token: &str) -> Option<HardwareAddr> {
    let bytes = token.as_bytes();
    if bytes.len() < 14 {
        return None;
    }

    let octets = if bytes[2] == b':' || bytes[2] == b'-' {
        split_octets(bytes, 2, bytes[2])?
    } else if bytes[4] == b'.' {
        split_octets(bytes, 4, b'.')?
    } else {
        return None;
    };

    match octets.len() {
        6 => Some(HardwareAddr::Eui48(MacAddress::new(octets.try_into().ok()?))),
        8 => Some(HardwareAddr::Eui64(octets.try_into().ok()?)),
        20 => Some(HardwareAddr::Infiniband(octets.try_into().ok()?)),
        _ => None,
    }
}

fn split_octets(bytes: &[u8], width: usize, sep: u8) -> Option<Vec<u8>> {
    let mut octets = Vec::new();
    for group in bytes.split(|&b| b == sep) {
        if group.len() != width || !group.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        for pair in group.chunks(2) {
            let pair = std::str::from_utf8(pair).ok()?;
            octets.push(u8::from_str_radix(pair, 16).ok()?);
        }
    }

    Some(octets)
}

pub fn is_mac(token: &str) -> bool {
    parse_mac(token).is_some()
}

/// Vendor owning the MAC's prefix, if the prefix is a known allocation.
pub fn mac_vendor(token: &str) -> Option<&'static str> {
    VENDOR_PREFIXES.get(&parse_mac(token)?.oui()).copied()
}

pub fn is_allocated_mac(token: &str) -> bool {
    mac_vendor(token).is_some()
}

pub fn is_wifi(token: &str) -> bool {
    token.eq_ignore_ascii_case(WIFI_KEYWORD)
}

pub fn is_qinq(token: &str) -> bool {
    token.eq_ignore_ascii_case(QINQ_KEYWORD)
}

pub fn is_no_fallback(token: &str) -> bool {
    token.eq_ignore_ascii_case(NO_FALLBACK_KEYWORD)
}

pub fn is_coordinate(token: &str) -> bool {
    token.parse::<i32>().is_ok()
}

pub fn is_driver(token: &str, drivers: &HashSet<String>) -> bool {
    drivers.contains(token)
}

pub fn is_bond_mode(token: &str) -> bool {
    BondMode::from_str(token).is_ok()
}

pub fn is_lacp_mode(token: &str) -> bool {
    LacpMode::from_str(token).is_ok()
}
