use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpecError};
use crate::replay::VlanResolver;

const MIN_VLAN: i32 = 1;
const MAX_VLAN: i32 = 4094;

/// Platform facts the spec grammars depend on: the NIC drivers the
/// hypervisor supports and the VLAN aliases of each namespace.
#[derive(Serialize, Deserialize, Debug, Default)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Platform {
    #[serde(default)]
    pub(crate) drivers: Vec<String>,
    #[serde(default)]
    pub(crate) namespaces: Vec<Namespace>,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Namespace {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) vlans: HashMap<String, i32>,
}

impl Platform {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("Reading platform config {path:?}"))?;

        serde_yaml::from_str(&data).context("Parsing platform config")
    }

    pub fn drivers(&self) -> HashSet<String> {
        self.drivers.iter().cloned().collect()
    }
}

impl VlanResolver for Platform {
    /// Numeric aliases name the VLAN directly, anything else is looked up in
    /// the namespace.
    fn resolve_vlan(&self, namespace: &str, alias: &str) -> Result<i32> {
        if let Ok(vlan) = alias.parse::<i32>() {
            if (MIN_VLAN..=MAX_VLAN).contains(&vlan) {
                return Ok(vlan);
            }
        }

        self.namespaces
            .iter()
            .find(|ns| ns.name == namespace)
            .and_then(|ns| ns.vlans.get(alias))
            .copied()
            .ok_or_else(|| SpecError::UnresolvedAlias {
                namespace: namespace.to_string(),
                alias: alias.to_string(),
            })
    }
}
