//! Error types for pimsbuild-assembler

use crate::state::VariantState;
use pimsbuild_core::{LifecyclePhase, PimsBuildError};
use pimsbuild_native::BuildFailure;
use pimsbuild_plugins::PluginFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where a variant stopped.
///
/// Every step except `Internal` has a number used in the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStep {
    Workspace,
    Fetch,
    PreNativeBuild,
    NativeBuild,
    PrePackageInstall,
    PackageInstall,
    Install,
    Stamp,
    Cancelled,
    Internal,
}

impl FailedStep {
    pub fn name(&self) -> &'static str {
        match self {
            FailedStep::Workspace => "workspace",
            FailedStep::Fetch => "fetch",
            FailedStep::PreNativeBuild => "pre_native_build",
            FailedStep::NativeBuild => "native_build",
            FailedStep::PrePackageInstall => "pre_package_install",
            FailedStep::PackageInstall => "package_install",
            FailedStep::Install => "install",
            FailedStep::Stamp => "stamp",
            FailedStep::Cancelled => "cancelled",
            FailedStep::Internal => "internal",
        }
    }

    /// Step number inside a variant's exit-code band.
    pub fn number(&self) -> Option<u8> {
        match self {
            FailedStep::Workspace => Some(1),
            FailedStep::Fetch => Some(2),
            FailedStep::PreNativeBuild => Some(3),
            FailedStep::NativeBuild => Some(4),
            FailedStep::PrePackageInstall => Some(5),
            FailedStep::PackageInstall => Some(6),
            FailedStep::Install => Some(7),
            FailedStep::Stamp => Some(8),
            FailedStep::Cancelled => Some(9),
            FailedStep::Internal => None,
        }
    }
}

impl From<LifecyclePhase> for FailedStep {
    fn from(phase: LifecyclePhase) -> Self {
        match phase {
            LifecyclePhase::Fetch => FailedStep::Fetch,
            LifecyclePhase::PreNativeBuild => FailedStep::PreNativeBuild,
            LifecyclePhase::PrePackageInstall => FailedStep::PrePackageInstall,
            LifecyclePhase::Install => FailedStep::Install,
        }
    }
}

impl fmt::Display for FailedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur while assembling image variants
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// The version could not be resolved; no variant is built
    #[error(transparent)]
    Version(PimsBuildError),

    /// The plugin manifest is invalid; no variant is built
    #[error(transparent)]
    Manifest(PimsBuildError),

    /// The variant workspace could not be prepared
    #[error("workspace {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Plugin(#[from] PluginFailure),

    #[error("native build failed: {0}")]
    Native(#[from] BuildFailure),

    #[error("package install failed: {0:#}")]
    PackageInstall(anyhow::Error),

    #[error("stamping failed: {0}")]
    Stamp(#[source] PimsBuildError),

    /// The artifact record could not be written
    #[error("writing artifact record {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    /// Out-of-order state transition
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: VariantState, to: VariantState },
}

impl AssemblyError {
    pub(crate) fn workspace(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| AssemblyError::Workspace {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The step a variant failed at, for variant-level errors.
    pub fn failed_step(&self) -> FailedStep {
        match self {
            AssemblyError::Workspace { .. } => FailedStep::Workspace,
            AssemblyError::Plugin(failure) => failure.phase.into(),
            AssemblyError::Native(_) => FailedStep::NativeBuild,
            AssemblyError::PackageInstall(_) => FailedStep::PackageInstall,
            AssemblyError::Stamp(_) | AssemblyError::Artifact { .. } => FailedStep::Stamp,
            AssemblyError::Version(_)
            | AssemblyError::Manifest(_)
            | AssemblyError::InvalidTransition { .. } => FailedStep::Internal,
        }
    }

    /// Process exit code for an invocation that failed before any variant ran.
    pub fn exit_code(&self) -> u8 {
        match self {
            AssemblyError::Version(_) => 10,
            AssemblyError::Manifest(_) => 11,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_numbers_are_distinct() {
        let steps = [
            FailedStep::Workspace,
            FailedStep::Fetch,
            FailedStep::PreNativeBuild,
            FailedStep::NativeBuild,
            FailedStep::PrePackageInstall,
            FailedStep::PackageInstall,
            FailedStep::Install,
            FailedStep::Stamp,
            FailedStep::Cancelled,
        ];
        let numbers: Vec<u8> = steps.iter().filter_map(|s| s.number()).collect();
        assert_eq!(numbers, (1..=9).collect::<Vec<u8>>());
        assert_eq!(FailedStep::Internal.number(), None);
    }

    #[test]
    fn test_plugin_failure_maps_to_phase_step() {
        let err = AssemblyError::from(PluginFailure::new(
            "p1",
            LifecyclePhase::PrePackageInstall,
            anyhow::anyhow!("boom"),
        ));
        assert_eq!(err.failed_step(), FailedStep::PrePackageInstall);
    }

    #[test]
    fn test_invocation_exit_codes() {
        let version = AssemblyError::Version(PimsBuildError::VersionResolution("x".into()));
        let manifest = AssemblyError::Manifest(PimsBuildError::ManifestParse {
            line: 2,
            reason: "x".into(),
        });
        assert_eq!(version.exit_code(), 10);
        assert_eq!(manifest.exit_code(), 11);
    }
}
