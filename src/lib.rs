//! Parsing, serialization and validation of the comma separated specs that
//! describe the network interfaces and bonds of a VM.
//!
//! ```text
//! vm config networks my_bridge,foo,de:ad:be:ef:ca:fe wifi,1,2,3
//! vm config bonds 0,1,balance-tcp,active,no-lacp-fallback
//! ```
//!
//! Every spec accepted by [parse_net_spec] or [parse_bond_spec] formats back
//! to its canonical text through `Display`.

mod bondspec;
mod classify;
mod error;
mod netspec;
mod replay;
mod types;
mod validate;

pub use crate::bondspec::{parse_bond_spec, BondConfig, BondMode, LacpMode, BOND_NAME_PREFIX};
pub use crate::classify::{
    is_allocated_mac, is_bond_mode, is_coordinate, is_driver, is_lacp_mode, is_mac,
    is_no_fallback, is_qinq, is_wifi, mac_vendor, parse_mac, HardwareAddr,
};
pub use crate::error::{Result, SpecError};
pub use crate::netspec::{
    parse_net_spec, Attachment, InterfaceConfig, WifiCoordinates, WiredInterface,
    WirelessInterface, DEFAULT_BRIDGE, DEFAULT_DRIVER,
};
pub use crate::replay::{SpecContext, VlanResolver, VmNetworkConfig, WILDCARD};
pub use crate::types::{Namespace, Platform};
pub use crate::validate::resolve_bond;
