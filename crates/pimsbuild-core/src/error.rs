//! Error taxonomy for the invocation-wide inputs of a build.
//!
//! These errors are fatal for the whole invocation: a bad tag or a bad
//! manifest means no variant is built at all.

use std::path::PathBuf;

/// pimsbuild core errors.
#[derive(Debug, thiserror::Error)]
pub enum PimsBuildError {
    #[error("version resolution failed: {0}")]
    VersionResolution(String),

    #[error("manifest parse error at line {line}: {reason}")]
    ManifestParse { line: usize, reason: String },

    #[error("duplicate plugin name '{name}' (lines {first_line} and {line})")]
    DuplicatePluginName {
        name: String,
        first_line: usize,
        line: usize,
    },

    #[error("version slot missing in {}: {reason}", path.display())]
    StampTargetMissing { path: PathBuf, reason: String },

    #[error("git error: {0}")]
    GitError(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PimsBuildError {
    /// Whether the error came from the plugin manifest.
    pub fn is_manifest_error(&self) -> bool {
        matches!(
            self,
            PimsBuildError::ManifestParse { .. } | PimsBuildError::DuplicatePluginName { .. }
        )
    }
}

/// Result type for pimsbuild core operations.
pub type Result<T> = std::result::Result<T, PimsBuildError>;
