//! Error type for plugin hook failures.

use pimsbuild_core::LifecyclePhase;
use thiserror::Error;

/// A plugin hook failed; fatal for the variant running it.
#[derive(Error, Debug)]
#[error("plugin '{plugin_name}' failed during {phase}: {underlying_error:#}")]
pub struct PluginFailure {
    /// Name of the failing plugin.
    pub plugin_name: String,

    /// Phase whose hook failed.
    pub phase: LifecyclePhase,

    /// What went wrong inside the hook.
    pub underlying_error: anyhow::Error,
}

impl PluginFailure {
    pub fn new(plugin_name: &str, phase: LifecyclePhase, underlying_error: anyhow::Error) -> Self {
        Self {
            plugin_name: plugin_name.to_string(),
            phase,
            underlying_error,
        }
    }
}
