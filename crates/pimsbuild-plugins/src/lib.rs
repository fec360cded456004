//! pimsbuild plugins - plugin lifecycle for image builds
//!
//! Provides:
//! - The `Plugin` capability set (four optional lifecycle hooks)
//! - `ScriptPlugin`, which runs git / `install-prerequisites.sh` / pip hooks
//! - `LifecycleRunner`, which runs a phase over the plugin set, fail-fast

pub mod error;
pub mod plugin;
pub mod runner;
pub mod script;

// Re-export key types
pub use error::PluginFailure;
pub use plugin::{HookContext, Plugin, PluginProvider};
pub use runner::{HookRecord, LifecycleRunner, PhaseReport};
pub use script::{ScriptPlugin, ScriptPluginProvider};
