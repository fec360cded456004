//! pimsbuild core - shared building blocks of the image build orchestrator
//!
//! Provides:
//! - Version resolution from git state and idempotent version stamping
//! - Plugin manifest parsing and the lifecycle phase order
//! - Build configuration, the per-variant shared environment and bounded
//!   subprocess execution
//! - Tracing setup and lifecycle event emitters

pub mod config;
pub mod env;
pub mod error;
pub mod exec;
pub mod git;
pub mod manifest;
pub mod obs;
pub mod phase;
pub mod stamp;
pub mod telemetry;
pub mod version;

// Re-export key types
pub use config::{BuildConfig, NativeConfig, PackageConfig, PluginToolsConfig, TimeoutConfig};
pub use env::SharedEnv;
pub use error::{PimsBuildError, Result};
pub use exec::{CommandError, CommandOutput, CommandSpec};
pub use git::{probe, VcsState};
pub use manifest::{PluginDescriptor, PluginManifest};
pub use phase::LifecyclePhase;
pub use stamp::{read_stamped, stamp, StampStatus};
pub use telemetry::init_tracing;
pub use version::{resolve, VersionRecord};
