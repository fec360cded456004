//! Native library build: fetch, extract, configure, compile, install.

use crate::archive;
use crate::error::{BuildFailure, NativeStep};
use crate::recipe::BuildRecipe;
use crate::Result;
use async_trait::async_trait;
use pimsbuild_core::exec::{self, CommandSpec};
use pimsbuild_core::{obs, NativeConfig, SharedEnv, TimeoutConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Inputs of one native build.
#[derive(Debug, Clone)]
pub struct NativeBuildRequest {
    /// Archive URL or local path.
    pub source_ref: String,

    /// Expected archive checksum.
    pub sha256: Option<String>,

    /// Extra configure arguments.
    pub config_options: Vec<String>,

    /// Install prefix. Only populated when the build succeeds.
    pub prefix: PathBuf,

    /// Scratch directory for the archive and the unpacked sources.
    pub scratch: PathBuf,

    /// Environment of every build command.
    pub env: SharedEnv,
}

impl NativeBuildRequest {
    pub fn from_config(config: &NativeConfig, prefix: &Path, scratch: &Path, env: &SharedEnv) -> Self {
        Self {
            source_ref: config.source_ref(),
            sha256: config.sha256.clone(),
            config_options: config.config_options.clone(),
            prefix: prefix.to_path_buf(),
            scratch: scratch.to_path_buf(),
            env: env.clone(),
        }
    }
}

/// Handle to an installed native library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledLibrary {
    pub prefix: PathBuf,
    pub version: String,
    pub lib_dir: PathBuf,
    pub pkgconfig_dir: PathBuf,
    pub archive_sha256: String,
}

impl InstalledLibrary {
    fn at(prefix: &Path, version: &str, archive_sha256: String) -> Self {
        let lib_dir = prefix.join("lib");
        Self {
            prefix: prefix.to_path_buf(),
            version: version.to_string(),
            pkgconfig_dir: lib_dir.join("pkgconfig"),
            lib_dir,
            archive_sha256,
        }
    }
}

/// Builds the native dependency of a variant.
#[async_trait]
pub trait NativeBuild: Send + Sync {
    /// Run the whole build as one unit. On error nothing is left at the
    /// request's prefix.
    async fn build(&self, request: &NativeBuildRequest) -> Result<InstalledLibrary>;
}

/// Source build driven by a [`BuildRecipe`].
#[derive(Debug, Clone)]
pub struct NativeDependencyBuilder {
    recipe: BuildRecipe,
    version: String,
    timeouts: TimeoutConfig,
}

impl NativeDependencyBuilder {
    pub fn new(config: &NativeConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            recipe: BuildRecipe::from_config(config),
            version: config.version.clone(),
            timeouts: timeouts.clone(),
        }
    }

    async fn step(
        &self,
        step: NativeStep,
        argv: Vec<String>,
        source_dir: &Path,
        env: &SharedEnv,
        timeout: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        let spec = CommandSpec::new(format!("native:{step}"), argv, timeout)
            .current_dir(source_dir)
            .env(env);
        info!(step = %step, command = %spec.display(), "Running native build step");

        exec::run(&spec)
            .await
            .map_err(|source| BuildFailure::Command { step, source })?;
        obs::emit_native_step(step.name(), start.elapsed().as_millis() as u64);
        Ok(())
    }

    async fn run_steps(&self, request: &NativeBuildRequest) -> Result<InstalledLibrary> {
        for dir in [&request.prefix, &request.scratch] {
            reset_dir(dir).await.map_err(BuildFailure::io(NativeStep::Fetch))?;
        }

        let start = Instant::now();
        let archive_path = request.scratch.join("source-archive");
        let archive_sha256 = archive::fetch(
            &request.source_ref,
            request.sha256.as_deref(),
            &archive_path,
            self.timeouts.fetch(),
        )
        .await?;
        obs::emit_native_step(NativeStep::Fetch.name(), start.elapsed().as_millis() as u64);

        let start = Instant::now();
        let source_dir = request.scratch.join("src");
        archive::extract(&archive_path, &source_dir, &request.env, self.timeouts.fetch()).await?;
        obs::emit_native_step(NativeStep::Extract.name(), start.elapsed().as_millis() as u64);

        let rendered = self
            .recipe
            .render(&request.prefix, &source_dir, &request.config_options)?;

        self.step(
            NativeStep::Configure,
            rendered.configure,
            &source_dir,
            &request.env,
            self.timeouts.configure(),
        )
        .await?;
        self.step(
            NativeStep::Compile,
            rendered.compile,
            &source_dir,
            &request.env,
            self.timeouts.compile(),
        )
        .await?;
        self.step(
            NativeStep::Install,
            rendered.install,
            &source_dir,
            &request.env,
            self.timeouts.install(),
        )
        .await?;

        Ok(InstalledLibrary::at(&request.prefix, &self.version, archive_sha256))
    }
}

#[async_trait]
impl NativeBuild for NativeDependencyBuilder {
    async fn build(&self, request: &NativeBuildRequest) -> Result<InstalledLibrary> {
        info!(source = %request.source_ref, prefix = %request.prefix.display(), "Building native library");
        let result = self.run_steps(request).await;

        if let Err(e) = &result {
            warn!(step = %e.step(), error = %e, "Native build failed, removing prefix");
            remove_dir_if_exists(&request.prefix).await;
        }
        remove_dir_if_exists(&request.scratch).await;
        result
    }
}

async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    if tokio::fs::try_exists(dir).await? {
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::create_dir_all(dir).await
}

async fn remove_dir_if_exists(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove directory"),
    }
}
