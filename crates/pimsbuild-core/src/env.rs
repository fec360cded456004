//! The environment shared by every subprocess of one build variant.

use serde::Serialize;
use std::collections::BTreeMap;

/// Application install path (source tree and default config).
pub const INSTALL_PATH_VAR: &str = "PIMS_INSTALL_PATH";
/// Root directory holding one subdirectory per plugin.
pub const PLUGIN_PATH_VAR: &str = "PIMS_PLUGIN_PATH";
/// Version being built.
pub const BUILD_VERSION_VAR: &str = "PIMS_BUILD_VERSION";
/// Install prefix of the native image library.
pub const VIPS_PREFIX_VAR: &str = "VIPS_PREFIX";

/// Immutable set of environment variables for one variant.
///
/// Values here override whatever the orchestrator process inherited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SharedEnv {
    vars: BTreeMap<String, String>,
}

impl SharedEnv {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Prepend `entry` to a colon-separated search path, keeping the value
    /// inherited from the current process after it.
    pub fn with_path_prefix(self, key: &str, entry: impl Into<String>) -> Self {
        let entry = entry.into();
        let value = match std::env::var(key) {
            Ok(existing) if !existing.is_empty() => format!("{entry}:{existing}"),
            _ => entry,
        };
        self.with(key, value)
    }

    /// Add every pair from `extra`, replacing existing keys.
    pub fn extend<'a>(mut self, extra: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (k, v) in extra {
            self.vars.insert(k.clone(), v.clone());
        }
        self
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate over all variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
