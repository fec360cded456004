//! Fail-fast execution of one lifecycle phase across the plugin set.

use crate::error::PluginFailure;
use crate::plugin::{dispatch, HookContext, Plugin};
use pimsbuild_core::obs;
use pimsbuild_core::LifecyclePhase;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A hook that ran to completion.
#[derive(Debug, Clone, Serialize)]
pub struct HookRecord {
    /// Plugin name.
    pub plugin_name: String,

    /// Hook duration in milliseconds.
    pub duration_ms: u64,
}

/// Result of a phase that completed for every plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    /// The phase that ran.
    pub phase: LifecyclePhase,

    /// Hooks invoked, in manifest order.
    pub invoked: Vec<HookRecord>,

    /// Plugins without a hook for this phase.
    pub skipped: Vec<String>,

    /// Total phase duration in milliseconds.
    pub duration_ms: u64,
}

impl PhaseReport {
    /// Names of the plugins whose hook ran, in order.
    pub fn invoked_names(&self) -> Vec<&str> {
        self.invoked.iter().map(|h| h.plugin_name.as_str()).collect()
    }
}

/// Runs lifecycle phases over an ordered plugin set.
pub struct LifecycleRunner;

impl LifecycleRunner {
    /// Run `phase` for every plugin, in order.
    ///
    /// Plugins without a hook for the phase are skipped. The first failing
    /// hook stops the phase: no later plugin is attempted. Each hook is
    /// bounded by `ctx.hook_timeout`; running out of time is a failure of
    /// that hook.
    pub async fn run(
        plugins: &[Arc<dyn Plugin>],
        phase: LifecyclePhase,
        ctx: &HookContext,
    ) -> Result<PhaseReport, PluginFailure> {
        let start = Instant::now();
        obs::emit_phase_started(phase.name(), plugins.len());

        let mut invoked = Vec::new();
        let mut skipped = Vec::new();

        for plugin in plugins {
            if !plugin.declares(phase, ctx) {
                debug!(plugin = %plugin.name(), phase = %phase, "No hook declared, skipping");
                skipped.push(plugin.name().to_string());
                continue;
            }

            let hook_start = Instant::now();
            let outcome =
                tokio::time::timeout(ctx.hook_timeout, dispatch(plugin.as_ref(), phase, ctx)).await;

            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(anyhow::anyhow!(
                    "hook timed out after {}s",
                    ctx.hook_timeout.as_secs()
                )),
            };

            if let Some(error) = error {
                obs::emit_hook_failed(plugin.name(), phase.name(), &error);
                return Err(PluginFailure::new(plugin.name(), phase, error));
            }

            let duration_ms = hook_start.elapsed().as_millis() as u64;
            obs::emit_hook_finished(plugin.name(), phase.name(), duration_ms);
            invoked.push(HookRecord {
                plugin_name: plugin.name().to_string(),
                duration_ms,
            });
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_phase_finished(phase.name(), invoked.len(), duration_ms);

        Ok(PhaseReport {
            phase,
            invoked,
            skipped,
            duration_ms,
        })
    }

    /// Run several phases in order, stopping at the first failure.
    pub async fn run_phases(
        plugins: &[Arc<dyn Plugin>],
        phases: &[LifecyclePhase],
        ctx: &HookContext,
    ) -> Result<Vec<PhaseReport>, PluginFailure> {
        let mut reports = Vec::with_capacity(phases.len());
        for phase in phases {
            reports.push(Self::run(plugins, *phase, ctx).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pimsbuild_core::{PluginDescriptor, PluginToolsConfig, SharedEnv};
    use std::path::PathBuf;
    use std::time::Duration;

    struct SleepyPlugin {
        descriptor: PluginDescriptor,
    }

    #[async_trait]
    impl Plugin for SleepyPlugin {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        fn declares(&self, phase: LifecyclePhase, _ctx: &HookContext) -> bool {
            phase == LifecyclePhase::Fetch
        }

        async fn fetch(&self, _ctx: &HookContext) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn ctx(hook_timeout: Duration) -> HookContext {
        HookContext {
            plugin_root: PathBuf::from("/nonexistent/plugins"),
            app_path: PathBuf::from("/nonexistent/app"),
            env: SharedEnv::new(),
            tools: PluginToolsConfig::default(),
            hook_timeout,
        }
    }

    #[tokio::test]
    async fn test_empty_plugin_set_is_a_noop() {
        let report = LifecycleRunner::run(&[], LifecyclePhase::Install, &ctx(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(report.invoked.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hook_timeout_is_plugin_failure() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(SleepyPlugin {
            descriptor: PluginDescriptor::new("sleepy", "u", "r"),
        })];

        let failure =
            LifecycleRunner::run(&plugins, LifecyclePhase::Fetch, &ctx(Duration::from_secs(5)))
                .await
                .unwrap_err();
        assert_eq!(failure.plugin_name, "sleepy");
        assert_eq!(failure.phase, LifecyclePhase::Fetch);
        assert!(failure.underlying_error.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_undeclared_phase_skips() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(SleepyPlugin {
            descriptor: PluginDescriptor::new("sleepy", "u", "r"),
        })];
        let report =
            LifecycleRunner::run(&plugins, LifecyclePhase::Install, &ctx(Duration::from_secs(1)))
                .await
                .unwrap();
        assert_eq!(report.skipped, vec!["sleepy"]);
    }
}
