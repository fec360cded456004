//! Terminal results of variant builds and their exit codes.

use crate::error::FailedStep;
use crate::state::Transition;
use crate::variant::BuildVariant;
use pimsbuild_core::{LifecyclePhase, VersionRecord};
use pimsbuild_native::InstalledLibrary;
use pimsbuild_plugins::PhaseReport;
use serde::Serialize;

/// Result of one variant build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub variant: BuildVariant,

    /// Image tag of the variant.
    pub tag: String,

    pub version_record: VersionRecord,

    pub success: bool,

    /// Step the variant stopped at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<FailedStep>,

    /// Lifecycle phase of a failing plugin hook.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<LifecyclePhase>,

    /// Plugin whose hook failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_plugin: Option<String>,

    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Completed lifecycle phases.
    pub phases: Vec<PhaseReport>,

    /// Native library, when the build got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<InstalledLibrary>,

    pub transitions: Vec<Transition>,

    pub duration_ms: u64,
}

impl BuildOutcome {
    /// Outcome of a variant whose task was aborted or panicked.
    pub fn cancelled(variant: BuildVariant, version: &VersionRecord, reason: String) -> Self {
        Self {
            variant,
            tag: variant.tag(version),
            version_record: version.clone(),
            success: false,
            failed_step: Some(FailedStep::Cancelled),
            failed_phase: None,
            failed_plugin: None,
            error: Some(reason),
            phases: Vec::new(),
            native: None,
            transitions: Vec::new(),
            duration_ms: 0,
        }
    }

    /// `0` on success, otherwise the variant band plus the step number.
    /// Internal errors are `1`.
    pub fn exit_code(&self) -> u8 {
        if self.success {
            return 0;
        }
        match self.failed_step.and_then(|step| step.number()) {
            Some(n) => self.variant.exit_band() + n,
            None => 1,
        }
    }

    /// Names of the plugins whose hooks ran in `phase`.
    pub fn invoked_in(&self, phase: LifecyclePhase) -> Vec<&str> {
        self.phases
            .iter()
            .filter(|r| r.phase == phase)
            .flat_map(|r| r.invoked_names())
            .collect()
    }
}

/// Outcomes of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyReport {
    pub build_id: String,
    pub version: String,
    pub outcomes: Vec<BuildOutcome>,
}

impl AssemblyReport {
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn outcome(&self, variant: BuildVariant) -> Option<&BuildOutcome> {
        self.outcomes.iter().find(|o| o.variant == variant)
    }

    /// Exit code of the invocation. When both variants fail, the base
    /// variant's code is returned.
    pub fn exit_code(&self) -> u8 {
        BuildVariant::ALL
            .iter()
            .filter_map(|v| self.outcome(*v))
            .map(BuildOutcome::exit_code)
            .find(|code| *code != 0)
            .unwrap_or(0)
    }
}
