//! Image assembly: runs both variants through the build state machine.

use crate::error::{AssemblyError, FailedStep};
use crate::outcome::{AssemblyReport, BuildOutcome};
use crate::package::{PackageInstall, PackageInstallRequest, PipPackageInstaller};
use crate::state::{StateMachine, VariantState};
use crate::variant::BuildVariant;
use crate::workspace::VariantWorkspace;
use pimsbuild_core::{obs, BuildConfig, LifecyclePhase, PluginManifest, VcsState, VersionRecord};
use pimsbuild_native::{InstalledLibrary, NativeBuild, NativeBuildRequest, NativeDependencyBuilder};
use pimsbuild_plugins::{
    HookContext, LifecycleRunner, PhaseReport, Plugin, PluginProvider, ScriptPluginProvider,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Invocation-wide inputs, computed once and shared by both variants.
#[derive(Debug, Clone)]
pub struct PreparedBuild {
    pub build_id: String,
    pub version: Arc<VersionRecord>,
    pub manifest: Arc<PluginManifest>,
}

impl PreparedBuild {
    pub fn new(version: VersionRecord, manifest: PluginManifest) -> Self {
        Self {
            build_id: Uuid::new_v4().to_string(),
            version: Arc::new(version),
            manifest: Arc::new(manifest),
        }
    }

    /// Resolve the version from `vcs` and parse the manifest.
    pub fn resolve(
        vcs: &VcsState,
        prerelease: Option<&str>,
        manifest_raw: &str,
    ) -> Result<Self, AssemblyError> {
        let version = Self::resolve_version(vcs, prerelease)?;
        let manifest = PluginManifest::parse(manifest_raw).map_err(AssemblyError::Manifest)?;
        Ok(Self::new(version, manifest))
    }

    /// A `prerelease` label is attached to release versions only.
    pub fn resolve_version(
        vcs: &VcsState,
        prerelease: Option<&str>,
    ) -> Result<VersionRecord, AssemblyError> {
        let mut version = pimsbuild_core::resolve(vcs.tag.as_deref(), &vcs.branch, vcs.commit_time)
            .map_err(AssemblyError::Version)?;
        if let Some(label) = prerelease {
            version = version.with_prerelease(label).map_err(AssemblyError::Version)?;
        }
        Ok(version)
    }
}

/// Written to `artifact.json` in the variant workspace after stamping.
#[derive(Debug, Clone, Serialize)]
struct ArtifactRecord<'a> {
    build_id: &'a str,
    variant: BuildVariant,
    tag: &'a str,
    version: String,
    plugins: Vec<&'a str>,
    native: Option<&'a InstalledLibrary>,
}

/// A variant running on its own task.
pub struct VariantTask {
    variant: BuildVariant,
    version: Arc<VersionRecord>,
    handle: JoinHandle<BuildOutcome>,
}

impl VariantTask {
    pub fn variant(&self) -> BuildVariant {
        self.variant
    }

    /// Abort the task. Running subprocesses are killed; the other variant
    /// is not affected.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the outcome. An aborted or panicked task yields a
    /// `cancelled` outcome.
    pub async fn join(self) -> BuildOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = if e.is_cancelled() {
                    "variant task was cancelled".to_string()
                } else {
                    format!("variant task panicked: {e}")
                };
                warn!(variant = %self.variant, reason = %reason, "Variant did not finish");
                obs::emit_variant_finished(
                    self.variant.name(),
                    false,
                    0,
                    Some(FailedStep::Cancelled.name()),
                );
                BuildOutcome::cancelled(self.variant, &self.version, reason)
            }
        }
    }
}

/// Progress of one variant, turned into a [`BuildOutcome`] at the end.
struct VariantRun {
    machine: StateMachine,
    phases: Vec<PhaseReport>,
    native: Option<InstalledLibrary>,
}

/// Composes the image variants.
///
/// Cheap to clone: configuration and collaborators are shared read-only.
#[derive(Clone)]
pub struct ImageAssembler {
    config: Arc<BuildConfig>,
    plugins: Arc<dyn PluginProvider>,
    native: Arc<dyn NativeBuild>,
    package: Arc<dyn PackageInstall>,
}

impl ImageAssembler {
    /// Assembler with the production collaborators: script plugins, a
    /// source build of the native library and pip.
    pub fn new(config: BuildConfig) -> Self {
        let native = NativeDependencyBuilder::new(&config.native, &config.timeouts);
        let package = PipPackageInstaller::new(&config.package, config.timeouts.package_install());
        Self::with_collaborators(
            config,
            Arc::new(ScriptPluginProvider),
            Arc::new(native),
            Arc::new(package),
        )
    }

    pub fn with_collaborators(
        config: BuildConfig,
        plugins: Arc<dyn PluginProvider>,
        native: Arc<dyn NativeBuild>,
        package: Arc<dyn PackageInstall>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            plugins,
            native,
            package,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build `variants` and collect their outcomes.
    ///
    /// Variants run concurrently unless `parallel_variants` is off; either
    /// way each runs on its own task.
    pub async fn assemble(&self, prepared: &PreparedBuild, variants: &[BuildVariant]) -> AssemblyReport {
        obs::emit_assembly_started(
            &prepared.build_id,
            &prepared.version.to_string(),
            prepared.manifest.enabled().len(),
        );

        let outcomes = if self.config.parallel_variants {
            let tasks: Vec<VariantTask> = variants
                .iter()
                .map(|v| self.spawn_variant(prepared, *v))
                .collect();
            futures::future::join_all(tasks.into_iter().map(VariantTask::join)).await
        } else {
            let mut outcomes = Vec::with_capacity(variants.len());
            for variant in variants {
                outcomes.push(self.spawn_variant(prepared, *variant).join().await);
            }
            outcomes
        };

        AssemblyReport {
            build_id: prepared.build_id.clone(),
            version: prepared.version.to_string(),
            outcomes,
        }
    }

    /// Start `variant` on a new task.
    pub fn spawn_variant(&self, prepared: &PreparedBuild, variant: BuildVariant) -> VariantTask {
        let assembler = self.clone();
        let task_prepared = prepared.clone();
        let span = obs::variant_span(variant.name(), &variant.tag(&prepared.version));
        let handle = tokio::spawn(
            async move { assembler.run_variant(&task_prepared, variant).await }.instrument(span),
        );
        VariantTask {
            variant,
            version: prepared.version.clone(),
            handle,
        }
    }

    /// Run `variant` to a terminal state on the current task.
    pub async fn run_variant(&self, prepared: &PreparedBuild, variant: BuildVariant) -> BuildOutcome {
        let start = Instant::now();
        let mut run = VariantRun {
            machine: StateMachine::new(),
            phases: Vec::new(),
            native: None,
        };

        let result = self.drive(&mut run, prepared, variant).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let tag = variant.tag(&prepared.version);

        let mut outcome = BuildOutcome {
            variant,
            tag,
            version_record: (*prepared.version).clone(),
            success: result.is_ok(),
            failed_step: None,
            failed_phase: None,
            failed_plugin: None,
            error: None,
            phases: run.phases,
            native: run.native,
            transitions: Vec::new(),
            duration_ms,
        };

        if let Err(e) = result {
            let step = e.failed_step();
            run.machine.fail(step);
            if let AssemblyError::Plugin(failure) = &e {
                outcome.failed_phase = Some(failure.phase);
                outcome.failed_plugin = Some(failure.plugin_name.clone());
            }
            warn!(step = %step, error = %e, "Variant failed");
            outcome.failed_step = Some(step);
            outcome.error = Some(e.to_string());
        } else {
            info!(tag = %outcome.tag, duration_ms, "Variant built");
        }

        obs::emit_variant_finished(
            variant.name(),
            outcome.success,
            duration_ms,
            outcome.failed_step.map(|s| s.name()),
        );
        outcome.transitions = run.machine.into_trace();
        outcome
    }

    async fn drive(
        &self,
        run: &mut VariantRun,
        prepared: &PreparedBuild,
        variant: BuildVariant,
    ) -> Result<(), AssemblyError> {
        let config = &self.config;
        let version = &prepared.version;

        // inputs were resolved once for the whole invocation
        run.machine.advance(VariantState::VersionResolved)?;
        let descriptors = variant.plugin_set(&prepared.manifest);
        run.machine.advance(VariantState::PluginsParsed)?;

        let workspace = VariantWorkspace::new(&config.workspace_root, variant)
            .map_err(AssemblyError::workspace(&config.workspace_root))?;
        workspace
            .recreate()
            .await
            .map_err(AssemblyError::workspace(&workspace.root))?;

        let env = workspace.shared_env(config, version);
        let plugins: Vec<Arc<dyn Plugin>> =
            descriptors.iter().map(|d| self.plugins.provide(d)).collect();
        let ctx = HookContext {
            plugin_root: workspace.plugins.clone(),
            app_path: workspace.app.clone(),
            env: env.clone(),
            tools: config.plugins.clone(),
            hook_timeout: config.timeouts.hook(),
        };
        info!(plugins = plugins.len(), workspace = %workspace.root.display(), "Variant workspace ready");

        run.phases
            .push(LifecycleRunner::run(&plugins, LifecyclePhase::Fetch, &ctx).await?);
        run.machine.advance(VariantState::Fetched)?;

        run.phases
            .push(LifecycleRunner::run(&plugins, LifecyclePhase::PreNativeBuild, &ctx).await?);
        run.machine.advance(VariantState::NativePrereqsReady)?;

        let request =
            NativeBuildRequest::from_config(&config.native, &workspace.native, &workspace.scratch, &env);
        run.native = Some(self.native.build(&request).await?);
        run.machine.advance(VariantState::NativeBuilt)?;

        run.phases
            .push(LifecycleRunner::run(&plugins, LifecyclePhase::PrePackageInstall, &ctx).await?);
        run.machine.advance(VariantState::PackagePrereqsReady)?;

        let package_request = PackageInstallRequest {
            app_source: config.app_source.clone(),
            install_path: workspace.app.clone(),
            default_config_file: config.default_config_file.clone(),
            exclude: vec![config.workspace_root.clone()],
            env: env.clone(),
        };
        self.package
            .install(&package_request)
            .await
            .map_err(AssemblyError::PackageInstall)?;

        run.phases
            .push(LifecycleRunner::run(&plugins, LifecyclePhase::Install, &ctx).await?);
        run.machine.advance(VariantState::Installed)?;

        let slot = workspace.app.join(&config.version_slot);
        let status = pimsbuild_core::stamp(&slot, version).map_err(AssemblyError::Stamp)?;
        info!(slot = %slot.display(), status = ?status, version = %version, "Version stamped");

        let tag = variant.tag(version);
        let record = ArtifactRecord {
            build_id: &prepared.build_id,
            variant,
            tag: &tag,
            version: version.to_string(),
            plugins: descriptors.iter().map(|d| d.name.as_str()).collect(),
            native: run.native.as_ref(),
        };
        write_artifact(&workspace, &record).await?;
        run.machine.advance(VariantState::Stamped)?;
        Ok(())
    }
}

async fn write_artifact(workspace: &VariantWorkspace, record: &ArtifactRecord<'_>) -> Result<(), AssemblyError> {
    let path = workspace.artifact_path();
    let artifact_error = |reason: String| AssemblyError::Artifact {
        path: path.clone(),
        reason,
    };
    let json = serde_json::to_string_pretty(record).map_err(|e| artifact_error(e.to_string()))?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| artifact_error(e.to_string()))
}
