//! Environment snapshot
//!
//! A captured copy of environment variables. Resolution reads from this
//! value instead of the live process environment, so tests can build one
//! from literal pairs.

use std::collections::HashMap;

/// Immutable view of environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    vars: HashMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from literal pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of a variable, treating empty values as unset
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// First alias with a non-empty value, in priority order
    pub fn first<'a>(&'a self, aliases: &[&'static str]) -> Option<(&'static str, &'a str)> {
        aliases
            .iter()
            .find_map(|name| self.get(name).map(|value| (*name, value)))
    }

    /// Whether any alias in any of the given sets is set
    pub fn any_set(&self, alias_sets: &[&[&'static str]]) -> bool {
        alias_sets.iter().any(|aliases| self.first(aliases).is_some())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Parse a boolean from environment text; anything unrecognised is false
pub fn parse_bool(value: &str) -> bool {
    matches!(value, "true" | "TRUE" | "True" | "t" | "T" | "1")
}

/// Split a comma-separated list, trimming entries and dropping empty ones
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
