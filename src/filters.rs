//! Name filters shared by the DAG engine and the planner.
//!
//! Grounded on `tdp/core/filters.py`'s `FilterFactory` (glob via `fnmatch`,
//! regex via `re.match`).

use once_cell::sync::OnceCell;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Glob,
    Regex,
}

pub enum Filter {
    Glob(glob::Pattern),
    Regex(Regex),
}

impl Filter {
    pub fn glob(pattern: &str) -> Self {
        // fnmatch-style patterns are always valid glob syntax for our
        // purposes (operation names have no path separators); fall back to
        // a pattern matching nothing on malformed input rather than panic.
        Filter::Glob(glob::Pattern::new(pattern).unwrap_or_else(|_| {
            static EMPTY: OnceCell<glob::Pattern> = OnceCell::new();
            EMPTY
                .get_or_init(|| glob::Pattern::new("\u{0}").expect("sentinel pattern"))
                .clone()
        }))
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Filter::Regex(Regex::new(pattern)?))
    }

    pub fn create(filter_type: FilterType, pattern: &str) -> Result<Self, regex::Error> {
        match filter_type {
            FilterType::Glob => Ok(Filter::glob(pattern)),
            FilterType::Regex => Filter::regex(pattern),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Filter::Glob(p) => p.matches(name),
            Filter::Regex(r) => r.is_match(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_filter_matches_suffix() {
        let f = Filter::glob("*_install");
        assert!(f.matches("hdfs_namenode_install"));
        assert!(!f.matches("hdfs_namenode_start"));
    }

    #[test]
    fn regex_filter_matches() {
        let f = Filter::regex("^hdfs_.*").unwrap();
        assert!(f.matches("hdfs_namenode_start"));
        assert!(!f.matches("yarn_resourcemanager_start"));
    }
}
