//! Error types for pimsbuild-native

use pimsbuild_core::CommandError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Steps of a native build, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeStep {
    Fetch,
    Extract,
    Configure,
    Compile,
    Install,
}

impl NativeStep {
    pub fn name(&self) -> &'static str {
        match self {
            NativeStep::Fetch => "fetch",
            NativeStep::Extract => "extract",
            NativeStep::Configure => "configure",
            NativeStep::Compile => "compile",
            NativeStep::Install => "install",
        }
    }
}

impl fmt::Display for NativeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur while building the native library
#[derive(Error, Debug)]
pub enum BuildFailure {
    /// Archive download or copy failed
    #[error("fetching {source_ref} failed: {reason}")]
    Fetch { source_ref: String, reason: String },

    /// Archive does not match the pinned checksum
    #[error("checksum mismatch for {source_ref}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        source_ref: String,
        expected: String,
        actual: String,
    },

    /// A build command failed or timed out
    #[error("{step} failed: {source}")]
    Command {
        step: NativeStep,
        #[source]
        source: CommandError,
    },

    /// Filesystem error around a step
    #[error("io error during {step}: {source}")]
    Io {
        step: NativeStep,
        #[source]
        source: std::io::Error,
    },

    /// Recipe cannot be rendered
    #[error("invalid build recipe: {0}")]
    InvalidRecipe(String),
}

impl BuildFailure {
    /// The step that failed.
    pub fn step(&self) -> NativeStep {
        match self {
            BuildFailure::Fetch { .. } | BuildFailure::ChecksumMismatch { .. } => NativeStep::Fetch,
            BuildFailure::Command { step, .. } | BuildFailure::Io { step, .. } => *step,
            BuildFailure::InvalidRecipe(_) => NativeStep::Configure,
        }
    }

    /// Whether the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            BuildFailure::Command { source, .. } => source.is_timeout(),
            BuildFailure::Fetch { reason, .. } => reason.contains("timed out"),
            _ => false,
        }
    }

    pub(crate) fn io(step: NativeStep) -> impl FnOnce(std::io::Error) -> BuildFailure {
        move |source| BuildFailure::Io { step, source }
    }
}

impl From<reqwest::Error> for BuildFailure {
    fn from(err: reqwest::Error) -> Self {
        let source_ref = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown url>".to_string());
        BuildFailure::Fetch {
            source_ref,
            reason: err.to_string(),
        }
    }
}
