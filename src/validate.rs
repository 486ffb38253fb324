use log::warn;

use crate::bondspec::BondConfig;
use crate::error::{Result, SpecError};
use crate::netspec::InterfaceConfig;

/// Check a bond against the interfaces of the VM that owns it and derive the
/// bond's bridge, VLAN and QinQ flag from them.
///
/// Out of range indexes are skipped and differing VLANs only warn; the first
/// interface's VLAN wins. Bonding a wifi station or interfaces on different
/// bridges is an error.
pub fn resolve_bond(bond: &mut BondConfig, networks: &[InterfaceConfig], vm: &str) -> Result<()> {
    bond.bridge = None;
    bond.vlan = None;

    for &index in &bond.interfaces {
        let Some(iface) = networks.get(index) else {
            warn!(
                "{}",
                SpecError::InterfaceOutOfRange {
                    index,
                    vm: vm.to_string(),
                }
            );
            continue;
        };

        let Some(vlan) = iface.vlan() else {
            return Err(SpecError::WifiBond(index));
        };

        match &bond.bridge {
            None => bond.bridge = Some(iface.bridge().to_string()),
            Some(bridge) if bridge != iface.bridge() => {
                return Err(SpecError::BridgeMismatch {
                    index,
                    expected: bridge.clone(),
                    found: iface.bridge().to_string(),
                });
            }
            Some(_) => {}
        }

        match bond.vlan {
            None => bond.vlan = Some(vlan),
            Some(expected) if expected != vlan => {
                warn!(
                    "{}",
                    SpecError::VlanMismatch {
                        index,
                        vm: vm.to_string(),
                        expected,
                    }
                );
            }
            Some(_) => {}
        }

        bond.qinq |= iface.qinq();
    }

    Ok(())
}
