use std::collections::HashSet;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::str;

use anyhow::Context;
use log::{debug, info, warn};
use serde::Serialize;

use crate::bondspec::{parse_bond_spec, BondConfig};
use crate::error::{Result, SpecError};
use crate::netspec::{parse_net_spec, Attachment, InterfaceConfig};
use crate::validate::resolve_bond;

/// Clears every field.
pub const WILDCARD: &str = "all";

const FIELD_NETWORKS: &str = "networks";
const FIELD_BONDS: &str = "bonds";

/// Resolves a namespace scoped VLAN alias to a VLAN id.
pub trait VlanResolver {
    fn resolve_vlan(&self, namespace: &str, alias: &str) -> Result<i32>;
}

/// Everything needed to turn spec text into interfaces of a VM.
pub struct SpecContext<'a> {
    pub namespace: &'a str,
    pub drivers: &'a HashSet<String>,
    pub resolver: &'a dyn VlanResolver,
}

/// Network attachments and bonds of one VM, in the order they were
/// configured. Bonds refer to `networks` by index.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VmNetworkConfig {
    pub uuid: String,
    pub networks: Vec<InterfaceConfig>,
    pub bonds: Vec<BondConfig>,
}

fn join_specs<T: fmt::Display>(specs: &[T]) -> String {
    specs
        .iter()
        .map(T::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

impl VmNetworkConfig {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            ..Default::default()
        }
    }

    /// Parse `spec`, resolve its VLAN alias and append it to the networks.
    pub fn add_network(&mut self, spec: &str, ctx: &SpecContext) -> Result<()> {
        let mut iface = parse_net_spec(spec, ctx.drivers)?;

        if let Attachment::Wired(wired) = &mut iface.attachment {
            wired.vlan = ctx.resolver.resolve_vlan(ctx.namespace, &wired.alias)?;
        }

        iface.raw = spec.to_string();
        self.networks.push(iface);

        Ok(())
    }

    /// Parse `spec`, check it against the current networks and append it to
    /// the bonds.
    pub fn add_bond(&mut self, spec: &str) -> Result<()> {
        let mut bond = parse_bond_spec(spec)?;

        resolve_bond(&mut bond, &self.networks, &self.uuid)?;

        bond.raw = spec.to_string();
        self.bonds.push(bond);

        Ok(())
    }

    /// Replay persisted `vm config uuid`, `vm config networks` and
    /// `vm config bonds` lines.
    ///
    /// A spec that fails to parse or validate is logged and skipped; the rest
    /// of the line and the remaining lines are still applied. So are lines
    /// that are not valid UTF-8.
    pub fn read_config<R: BufRead>(&mut self, reader: R, ctx: &SpecContext) -> anyhow::Result<()> {
        for (number, line) in reader.split(b'\n').enumerate() {
            let line = line.context("Reading config")?;
            let Ok(line) = str::from_utf8(&line) else {
                warn!("Skipping config line {}: not valid UTF-8", number + 1);
                continue;
            };
            let fields: Vec<&str> = line.split_whitespace().collect();

            match fields.as_slice() {
                ["vm", "config", "uuid", uuid] => {
                    self.uuid = uuid.to_string();
                }
                ["vm", "config", "networks", specs @ ..] => {
                    for spec in specs {
                        if let Err(err) = self.add_network(spec, ctx) {
                            warn!("Skipping netspec '{spec}': {err}");
                        }
                    }
                }
                ["vm", "config", "bonds", specs @ ..] => {
                    for spec in specs {
                        if let Err(err) = self.add_bond(spec) {
                            warn!("Skipping bondspec '{spec}': {err}");
                        }
                    }
                }
                _ => {}
            }
        }

        debug!(
            "Replayed {} networks and {} bonds for vm {}",
            self.networks.len(),
            self.bonds.len(),
            self.uuid
        );

        Ok(())
    }

    pub fn write_config<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if !self.networks.is_empty() {
            writeln!(w, "vm config networks {}", join_specs(&self.networks))?;
        }

        if !self.bonds.is_empty() {
            writeln!(w, "vm config bonds {}", join_specs(&self.bonds))?;
        }

        Ok(())
    }

    pub fn network_string(&self) -> String {
        format!("[{}]", join_specs(&self.networks))
    }

    pub fn bond_string(&self) -> String {
        format!("[{}]", join_specs(&self.bonds))
    }

    pub fn info(&self, field: &str) -> Result<String> {
        match field {
            FIELD_NETWORKS => Ok(join_specs(&self.networks)),
            FIELD_BONDS => Ok(join_specs(&self.bonds)),
            _ => Err(SpecError::UnknownField(field.to_string())),
        }
    }

    /// Reset `networks`, `bonds` or, with [`WILDCARD`], everything including
    /// the uuid. Clearing the networks also drops the bonds, as their indexes
    /// no longer point anywhere. Fields owned by other parts of the VM config
    /// are ignored.
    pub fn clear(&mut self, mask: &str) {
        if mask == WILDCARD {
            self.uuid.clear();
        }
        if mask == WILDCARD || mask == FIELD_NETWORKS {
            self.networks.clear();
            self.bonds.clear();
        }
        if mask == FIELD_BONDS {
            self.bonds.clear();
        }
    }

    /// Rebuild this config from the spec text of each interface and bond, as
    /// done when cloning a VM. Derived bond fields are recomputed against the
    /// rebuilt networks.
    pub fn reparse(&self, ctx: &SpecContext) -> VmNetworkConfig {
        let mut cloned = VmNetworkConfig::new(&self.uuid);

        for iface in &self.networks {
            let spec = if iface.raw.is_empty() {
                iface.to_string()
            } else {
                iface.raw.clone()
            };

            if let Err(err) = cloned.add_network(&spec, ctx) {
                warn!("Dropping netspec '{spec}' from clone: {err}");
            }
        }

        for bond in &self.bonds {
            let spec = if bond.raw.is_empty() {
                bond.to_string()
            } else {
                bond.raw.clone()
            };

            if let Err(err) = cloned.add_bond(&spec) {
                warn!("Dropping bondspec '{spec}' from clone: {err}");
            }
        }

        info!(
            "Reparsed {} networks and {} bonds for vm {}",
            cloned.networks.len(),
            cloned.bonds.len(),
            cloned.uuid
        );

        cloned
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use std::io::{BufReader, Cursor};

    use crate::error::{Result, SpecError};
    use crate::replay::{SpecContext, VlanResolver, VmNetworkConfig, WILDCARD};

    struct Aliases(HashMap<&'static str, i32>);

    impl VlanResolver for Aliases {
        fn resolve_vlan(&self, namespace: &str, alias: &str) -> Result<i32> {
            self.0
                .get(alias)
                .copied()
                .ok_or_else(|| SpecError::UnresolvedAlias {
                    namespace: namespace.to_string(),
                    alias: alias.to_string(),
                })
        }
    }

    fn aliases() -> Aliases {
        Aliases(HashMap::from([("foo", 101), ("bar", 102)]))
    }

    fn drivers() -> HashSet<String> {
        HashSet::from(["virtio-net-pci".to_string()])
    }

    fn read_fixture(resolver: &Aliases, drivers: &HashSet<String>) -> anyhow::Result<VmNetworkConfig> {
        let ctx = SpecContext {
            namespace: "minimega",
            drivers,
            resolver,
        };

        let file = fs::File::open("testdata/replay/vm.conf")?;
        let mut vm = VmNetworkConfig::new("vm0");
        vm.read_config(BufReader::new(file), &ctx)?;

        Ok(vm)
    }

    #[test]
    fn read_config_skips_bad_specs() -> anyhow::Result<()> {
        let vm = read_fixture(&aliases(), &drivers())?;

        assert_eq!(vm.networks.len(), 4);
        assert_eq!(vm.networks[0].vlan(), Some(101));
        assert_eq!(vm.networks[1].vlan(), Some(102));
        assert!(vm.networks[0].qinq());
        assert_eq!(vm.networks[1].raw, "bar,DE:AD:BE:EF:CA:FE,virtio-net-pci");
        assert_eq!(vm.networks[2].bridge(), "my_bridge");
        assert!(vm.networks[3].is_wifi());

        assert_eq!(vm.bonds.len(), 2);

        let bond = &vm.bonds[0];
        assert_eq!(bond.raw, "0,1,active-backup");
        assert_eq!(bond.bridge.as_deref(), Some("mega_bridge"));
        assert_eq!(bond.vlan, Some(101));
        assert!(bond.qinq);

        let bond = &vm.bonds[1];
        assert_eq!(bond.interfaces, vec![0, 9]);
        assert_eq!(bond.name.as_deref(), Some("lan-bond"));
        assert_eq!(bond.vlan, Some(101));
        assert!(bond.qinq);

        Ok(())
    }

    #[test]
    fn read_config_takes_uuid_from_config() -> anyhow::Result<()> {
        let vm = read_fixture(&aliases(), &drivers())?;
        assert_eq!(vm.uuid, "6b2b4b4e-7d3c-4f0e-9d0a-2f1c5e9a8b10");

        Ok(())
    }

    #[test]
    fn read_config_skips_lines_that_are_not_utf8() -> anyhow::Result<()> {
        let resolver = aliases();
        let drivers = drivers();
        let ctx = SpecContext {
            namespace: "minimega",
            drivers: &drivers,
            resolver: &resolver,
        };

        let input = b"vm config tags note caf\xe9\nvm config networks foo bar\r\nvm config bonds 0,1,active-backup";
        let mut vm = VmNetworkConfig::new("vm0");
        vm.read_config(Cursor::new(&input[..]), &ctx)?;

        assert_eq!(vm.network_string(), "[foo bar]");
        assert_eq!(vm.networks[0].vlan(), Some(101));
        assert_eq!(vm.bond_string(), "[0,1,active-backup]");

        Ok(())
    }

    #[test]
    fn write_config_emits_canonical_specs() -> anyhow::Result<()> {
        let vm = read_fixture(&aliases(), &drivers())?;

        let mut out = Vec::new();
        vm.write_config(&mut out)?;

        assert_eq!(
            String::from_utf8(out)?,
            "vm config networks foo,qinq bar,de:ad:be:ef:ca:fe,virtio-net-pci my_bridge,foo wifi,1,2,3\n\
             vm config bonds 0,1,active-backup,qinq 0,9,balance-tcp,passive,qinq,lan-bond\n"
        );

        Ok(())
    }

    #[test]
    fn write_config_skips_empty_lists() -> anyhow::Result<()> {
        let mut out = Vec::new();
        VmNetworkConfig::new("vm0").write_config(&mut out)?;
        assert!(out.is_empty());

        Ok(())
    }

    #[test]
    fn written_config_replays_to_same_networks() -> anyhow::Result<()> {
        let resolver = aliases();
        let drivers = drivers();
        let vm = read_fixture(&resolver, &drivers)?;

        let mut out = Vec::new();
        vm.write_config(&mut out)?;

        let ctx = SpecContext {
            namespace: "minimega",
            drivers: &drivers,
            resolver: &resolver,
        };
        let mut replayed = VmNetworkConfig::new("vm0");
        replayed.read_config(Cursor::new(out), &ctx)?;

        assert_eq!(replayed.network_string(), vm.network_string());
        assert_eq!(replayed.bond_string(), vm.bond_string());

        Ok(())
    }

    #[test]
    fn unknown_driver_changes_meaning_of_spec() -> anyhow::Result<()> {
        let vm = read_fixture(&aliases(), &HashSet::new())?;

        // Without virtio-net-pci the second interface no longer parses.
        assert_eq!(vm.networks.len(), 3);
        assert_eq!(vm.networks[1].bridge(), "my_bridge");

        Ok(())
    }

    #[test]
    fn reparse_matches_original() -> anyhow::Result<()> {
        let resolver = aliases();
        let drivers = drivers();
        let vm = read_fixture(&resolver, &drivers)?;

        let ctx = SpecContext {
            namespace: "minimega",
            drivers: &drivers,
            resolver: &resolver,
        };
        let cloned = vm.reparse(&ctx);

        assert_eq!(cloned, vm);

        Ok(())
    }

    #[test]
    fn reparse_falls_back_to_canonical_text() -> anyhow::Result<()> {
        let resolver = aliases();
        let drivers = drivers();
        let mut vm = read_fixture(&resolver, &drivers)?;
        vm.networks.iter_mut().for_each(|iface| iface.raw.clear());

        let ctx = SpecContext {
            namespace: "minimega",
            drivers: &drivers,
            resolver: &resolver,
        };
        let cloned = vm.reparse(&ctx);

        assert_eq!(cloned.network_string(), vm.network_string());
        assert_eq!(cloned.networks[1].raw, "bar,de:ad:be:ef:ca:fe,virtio-net-pci");

        Ok(())
    }

    #[test]
    fn info_and_clear() -> anyhow::Result<()> {
        let mut vm = read_fixture(&aliases(), &drivers())?;

        assert_eq!(
            vm.info("bonds")?,
            "0,1,active-backup,qinq 0,9,balance-tcp,passive,qinq,lan-bond"
        );
        assert_eq!(
            vm.info("memory").unwrap_err(),
            SpecError::UnknownField("memory".to_string())
        );

        vm.clear("memory");
        assert_eq!(vm.bonds.len(), 2);

        vm.clear("bonds");
        assert!(vm.bonds.is_empty());
        assert_eq!(vm.networks.len(), 4);
        assert_eq!(vm.bond_string(), "[]");

        let mut vm = read_fixture(&aliases(), &drivers())?;
        vm.clear("networks");
        assert!(vm.networks.is_empty());
        assert!(vm.bonds.is_empty());
        assert_eq!(vm.uuid, "6b2b4b4e-7d3c-4f0e-9d0a-2f1c5e9a8b10");

        let mut vm = read_fixture(&aliases(), &drivers())?;
        vm.clear(WILDCARD);
        assert_eq!(vm, VmNetworkConfig::default());

        Ok(())
    }
}
