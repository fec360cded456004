//! Per-variant filesystem workspace and environment.

use crate::variant::BuildVariant;
use pimsbuild_core::env::{BUILD_VERSION_VAR, INSTALL_PATH_VAR, PLUGIN_PATH_VAR, VIPS_PREFIX_VAR};
use pimsbuild_core::{BuildConfig, SharedEnv, VersionRecord};
use std::io;
use std::path::{Path, PathBuf};

/// Name of the artifact record written after a successful build.
pub const ARTIFACT_FILE: &str = "artifact.json";

const PYTHON_USER_BASE_VAR: &str = "PYTHONUSERBASE";
const PIP_USER_VAR: &str = "PIP_USER";

/// Directories owned by one variant. Nothing here is shared with the
/// other variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantWorkspace {
    /// `<workspace_root>/<variant>`
    pub root: PathBuf,
    /// Application install path.
    pub app: PathBuf,
    /// Plugin install path; one subdirectory per plugin.
    pub plugins: PathBuf,
    /// Native library prefix.
    pub native: PathBuf,
    /// Temporary files of the native build.
    pub scratch: PathBuf,
    /// Python user base; every pip install of this variant lands here.
    pub python: PathBuf,
}

impl VariantWorkspace {
    /// Lay out the workspace of `variant` under `workspace_root`.
    ///
    /// Paths are made absolute because every subprocess runs with its own
    /// working directory.
    pub fn new(workspace_root: &Path, variant: BuildVariant) -> io::Result<Self> {
        let root = std::path::absolute(workspace_root)?.join(variant.name());
        Ok(Self {
            app: root.join("app"),
            plugins: root.join("plugins"),
            native: root.join("native"),
            scratch: root.join("scratch"),
            python: root.join("python"),
            root,
        })
    }

    /// Remove whatever a previous run left and create empty directories.
    pub async fn recreate(&self) -> io::Result<()> {
        if tokio::fs::try_exists(&self.root).await? {
            tokio::fs::remove_dir_all(&self.root).await?;
        }
        for dir in [&self.app, &self.plugins, &self.scratch, &self.python] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.root.join(ARTIFACT_FILE)
    }

    /// The environment every subprocess of this variant runs with.
    ///
    /// `PIP_USER` makes pip honor `PYTHONUSERBASE`, so package and plugin
    /// installs never touch the interpreter's own site-packages.
    /// User-supplied `[env]` entries are applied last and win.
    pub fn shared_env(&self, config: &BuildConfig, version: &VersionRecord) -> SharedEnv {
        let lib = self.native.join("lib");
        let path = |p: &Path| p.to_string_lossy().to_string();

        SharedEnv::new()
            .with(INSTALL_PATH_VAR, path(&self.app))
            .with(PLUGIN_PATH_VAR, path(&self.plugins))
            .with(BUILD_VERSION_VAR, version.to_string())
            .with(VIPS_PREFIX_VAR, path(&self.native))
            .with(PYTHON_USER_BASE_VAR, path(&self.python))
            .with(PIP_USER_VAR, "1")
            .with_path_prefix("PKG_CONFIG_PATH", path(&lib.join("pkgconfig")))
            .with_path_prefix("LD_LIBRARY_PATH", path(&lib))
            .with_path_prefix(
                "PATH",
                format!(
                    "{}:{}",
                    path(&self.native.join("bin")),
                    path(&self.python.join("bin"))
                ),
            )
            .extend(&config.env)
    }
}
