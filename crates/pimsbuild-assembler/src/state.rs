//! The per-variant build state machine.

use crate::error::{AssemblyError, FailedStep};
use chrono::{DateTime, Utc};
use pimsbuild_core::obs;
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of one variant build, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantState {
    Init,
    VersionResolved,
    PluginsParsed,
    Fetched,
    NativePrereqsReady,
    NativeBuilt,
    PackagePrereqsReady,
    Installed,
    Stamped,
    Failed(FailedStep),
}

impl VariantState {
    pub fn name(&self) -> &'static str {
        match self {
            VariantState::Init => "init",
            VariantState::VersionResolved => "version_resolved",
            VariantState::PluginsParsed => "plugins_parsed",
            VariantState::Fetched => "fetched",
            VariantState::NativePrereqsReady => "native_prereqs_ready",
            VariantState::NativeBuilt => "native_built",
            VariantState::PackagePrereqsReady => "package_prereqs_ready",
            VariantState::Installed => "installed",
            VariantState::Stamped => "stamped",
            VariantState::Failed(_) => "failed",
        }
    }

    /// The only state a successful step may lead to.
    pub fn successor(&self) -> Option<VariantState> {
        match self {
            VariantState::Init => Some(VariantState::VersionResolved),
            VariantState::VersionResolved => Some(VariantState::PluginsParsed),
            VariantState::PluginsParsed => Some(VariantState::Fetched),
            VariantState::Fetched => Some(VariantState::NativePrereqsReady),
            VariantState::NativePrereqsReady => Some(VariantState::NativeBuilt),
            VariantState::NativeBuilt => Some(VariantState::PackagePrereqsReady),
            VariantState::PackagePrereqsReady => Some(VariantState::Installed),
            VariantState::Installed => Some(VariantState::Stamped),
            VariantState::Stamped | VariantState::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VariantState::Stamped | VariantState::Failed(_))
    }
}

impl fmt::Display for VariantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantState::Failed(step) => write!(f, "failed({step})"),
            other => f.write_str(other.name()),
        }
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: VariantState,
    pub to: VariantState,
    pub at: DateTime<Utc>,
}

/// Tracks the state of one variant and rejects out-of-order moves.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: VariantState,
    trace: Vec<Transition>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: VariantState::Init,
            trace: Vec::new(),
        }
    }

    pub fn state(&self) -> VariantState {
        self.state
    }

    pub fn trace(&self) -> &[Transition] {
        &self.trace
    }

    pub fn into_trace(self) -> Vec<Transition> {
        self.trace
    }

    /// Move to `to`, which must be the successor of the current state.
    pub fn advance(&mut self, to: VariantState) -> Result<(), AssemblyError> {
        if self.state.successor() != Some(to) {
            return Err(AssemblyError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.record(to);
        Ok(())
    }

    /// Move to `Failed(step)`. A terminal state is left untouched.
    pub fn fail(&mut self, step: FailedStep) {
        if !self.state.is_terminal() {
            self.record(VariantState::Failed(step));
        }
    }

    fn record(&mut self, to: VariantState) {
        obs::emit_transition(self.state.name(), &to.to_string());
        self.trace.push(Transition {
            from: self.state,
            to,
            at: Utc::now(),
        });
        self.state = to;
    }
}
