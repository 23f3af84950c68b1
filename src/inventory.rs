//! Host-pattern resolution for playbooks.
//!
//! The original project resolves `hosts:` patterns against a live Ansible
//! inventory via `ansible.inventory.manager.InventoryManager`
//! (`tdp/core/inventory_reader.py`). This crate has no Ansible runtime to
//! call into, so [`InventoryReader`] is reduced to what it is actually used
//! for here: turning a `hosts:` pattern string into a list of host names.
//! A bare host/group pattern with no inventory loaded resolves to itself
//! (single-host shorthand); `all`/`*` resolve to every host known to an
//! optionally-loaded static inventory file.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// Adapter over a static group → hosts mapping, loaded once at startup from
/// an Ansible-style YAML inventory (`all: {hosts: {h1: null, h2: null}}`) or
/// left empty, in which case every pattern is treated as a literal host name.
#[derive(Debug, Clone, Default)]
pub struct InventoryReader {
    groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct InventoryGroup {
    #[serde(default)]
    hosts: BTreeMap<String, Option<serde_yaml::Value>>,
    #[serde(default)]
    children: BTreeMap<String, InventoryGroup>,
}

impl InventoryReader {
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        let root: BTreeMap<String, InventoryGroup> = serde_yaml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut groups = BTreeMap::new();
        for (name, group) in &root {
            Self::flatten(name, group, &mut groups);
        }
        Ok(InventoryReader { groups })
    }

    fn flatten(
        name: &str,
        group: &InventoryGroup,
        out: &mut BTreeMap<String, Vec<String>>,
    ) {
        let mut hosts: Vec<String> = group.hosts.keys().cloned().collect();
        for (child_name, child) in &group.children {
            Self::flatten(child_name, child, out);
            if let Some(child_hosts) = out.get(child_name) {
                hosts.extend(child_hosts.iter().cloned());
            }
        }
        hosts.sort();
        hosts.dedup();
        out.insert(name.to_string(), hosts);
    }

    /// Resolve a single `hosts:` pattern into a list of host names.
    ///
    /// `all` and `*` expand to every known host; a known group name expands
    /// to its members; anything else (including every pattern when no
    /// inventory was loaded) is treated as a literal host name.
    pub fn resolve(&self, pattern: &str) -> Vec<String> {
        if self.groups.is_empty() {
            return vec![pattern.to_string()];
        }
        if pattern == "all" || pattern == "*" {
            let mut all: Vec<String> = self
                .groups
                .get("all")
                .cloned()
                .unwrap_or_else(|| self.groups.values().flatten().cloned().collect());
            all.sort();
            all.dedup();
            return all;
        }
        if let Some(hosts) = self.groups.get(pattern) {
            return hosts.clone();
        }
        vec![pattern.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use std::io::Write;

    #[test]
    fn literal_pattern_with_no_inventory() {
        let reader = InventoryReader::default();
        assert_eq!(reader.resolve("h1"), vec!["h1".to_string()]);
        assert_eq!(reader.resolve("all"), vec!["all".to_string()]);
    }

    #[test]
    fn resolves_group_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "all:\n  children:\n    hdfs:\n      hosts:\n        h1: null\n        h2: null\n"
        )
        .unwrap();
        let reader = InventoryReader::from_file(file.path()).unwrap();
        let mut hosts = reader.resolve("hdfs");
        hosts.sort();
        assert_eq!(hosts, vec!["h1".to_string(), "h2".to_string()]);
    }
}
