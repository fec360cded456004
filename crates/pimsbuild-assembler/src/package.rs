//! Placing the application at the install path and installing its packages.

use anyhow::Context;
use async_trait::async_trait;
use pimsbuild_core::exec::{self, CommandSpec};
use pimsbuild_core::{PackageConfig, SharedEnv};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// What a package install works on.
#[derive(Debug, Clone)]
pub struct PackageInstallRequest {
    /// Application source tree.
    pub app_source: PathBuf,

    /// Install path of the variant.
    pub install_path: PathBuf,

    /// Default configuration file, relative to the source tree.
    pub default_config_file: PathBuf,

    /// Directories never copied (the build workspace when it lives inside
    /// the source tree).
    pub exclude: Vec<PathBuf>,

    pub env: SharedEnv,
}

/// Installs the application into a variant.
#[async_trait]
pub trait PackageInstall: Send + Sync {
    async fn install(&self, request: &PackageInstallRequest) -> anyhow::Result<()>;
}

/// Copies the source tree and runs `pip install -r <requirements>`.
#[derive(Debug, Clone)]
pub struct PipPackageInstaller {
    config: PackageConfig,
    timeout: Duration,
}

impl PipPackageInstaller {
    pub fn new(config: &PackageConfig, timeout: Duration) -> Self {
        Self {
            config: config.clone(),
            timeout,
        }
    }
}

#[async_trait]
impl PackageInstall for PipPackageInstaller {
    async fn install(&self, request: &PackageInstallRequest) -> anyhow::Result<()> {
        let config_file = request.app_source.join(&request.default_config_file);
        if !config_file.is_file() {
            anyhow::bail!(
                "default configuration file {} is missing",
                config_file.display()
            );
        }

        info!(
            source = %request.app_source.display(),
            install_path = %request.install_path.display(),
            "Placing application source"
        );
        let source = request.app_source.clone();
        let dest = request.install_path.clone();
        let exclude: Vec<PathBuf> = request
            .exclude
            .iter()
            .filter_map(|p| std::fs::canonicalize(p).ok())
            .collect();
        tokio::task::spawn_blocking(move || copy_tree(&source, &dest, &exclude))
            .await
            .context("copy task failed")??;

        let requirements = request.install_path.join(&self.config.requirements);
        if !requirements.is_file() {
            debug!(file = %requirements.display(), "No requirements file, skipping pip");
            return Ok(());
        }

        let mut argv = vec![self.config.pip.clone()];
        argv.extend(self.config.pip_install_args.iter().cloned());
        argv.extend(["-r".to_string(), self.config.requirements.clone()]);
        let spec = CommandSpec::new("package:install", argv, self.timeout)
            .current_dir(&request.install_path)
            .env(&request.env);

        info!(command = %spec.display(), "Installing application packages");
        exec::run(&spec).await?;
        Ok(())
    }
}

/// Recursively copy `src` into `dest`, skipping `.git` and `exclude`.
fn copy_tree(src: &Path, dest: &Path, exclude: &[PathBuf]) -> anyhow::Result<()> {
    std::fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;

    for entry in std::fs::read_dir(src).with_context(|| format!("reading {}", src.display()))? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_name() == ".git" {
            continue;
        }
        if let Ok(canonical) = std::fs::canonicalize(&path) {
            if exclude.contains(&canonical) {
                continue;
            }
        }

        let target = dest.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(&path, &target, exclude)?;
        } else if file_type.is_file() {
            std::fs::copy(&path, &target)
                .with_context(|| format!("copying {}", path.display()))?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(&path)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target)
                .with_context(|| format!("linking {}", target.display()))?;
            #[cfg(not(unix))]
            std::fs::copy(&path, &target)
                .with_context(|| format!("copying {} -> {}", path.display(), link.display()))?;
        }
    }
    Ok(())
}
