//! Build configuration.
//!
//! Loaded from a TOML file; every field has a default so a missing file or a
//! partial file is valid. Command-line flags are applied on top by the CLI.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PimsBuildError, Result};

/// libvips release built by default.
pub const DEFAULT_VIPS_VERSION: &str = "8.11.2";

/// Top-level build configuration, shared read-only by both variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory holding one workspace per variant.
    pub workspace_root: PathBuf,

    /// Application source tree copied into each variant's install path.
    pub app_source: PathBuf,

    /// Default configuration file, relative to the application source.
    pub default_config_file: PathBuf,

    /// Version-record file, relative to the application source.
    pub version_slot: PathBuf,

    /// Build both variants concurrently.
    pub parallel_variants: bool,

    pub timeouts: TimeoutConfig,
    pub native: NativeConfig,
    pub plugins: PluginToolsConfig,
    pub package: PackageConfig,

    /// Extra variables exported to every subprocess.
    pub env: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("build"),
            app_source: PathBuf::from("."),
            default_config_file: PathBuf::from("pims-config.env"),
            version_slot: PathBuf::from("pims/version.json"),
            parallel_variants: true,
            timeouts: TimeoutConfig::default(),
            native: NativeConfig::default(),
            plugins: PluginToolsConfig::default(),
            package: PackageConfig::default(),
            env: BTreeMap::new(),
        }
    }
}

impl BuildConfig {
    /// Load a configuration file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    PimsBuildError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| PimsBuildError::Config(e.to_string()))
    }

    /// Reject settings that would make a build unbounded or ill-formed.
    pub fn validate(&self) -> Result<()> {
        self.timeouts.validate()?;
        if self.native.jobs == 0 {
            return Err(PimsBuildError::Config("native.jobs must be at least 1".into()));
        }
        for (name, template) in [
            ("native.configure", &self.native.configure),
            ("native.compile", &self.native.compile),
            ("native.install", &self.native.install),
        ] {
            if template.is_empty() {
                return Err(PimsBuildError::Config(format!("{name} must not be empty")));
            }
        }
        if self.version_slot.is_absolute() || self.default_config_file.is_absolute() {
            return Err(PimsBuildError::Config(
                "version_slot and default_config_file must be relative to app_source".into(),
            ));
        }
        Ok(())
    }
}

/// Timeouts in seconds. Zero is rejected: every external call is bounded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub vcs: u64,
    pub hook: u64,
    pub fetch: u64,
    pub configure: u64,
    pub compile: u64,
    pub install: u64,
    pub package_install: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            vcs: 30,
            hook: 1800,
            fetch: 600,
            configure: 600,
            compile: 3600,
            install: 600,
            package_install: 1800,
        }
    }
}

impl TimeoutConfig {
    /// Bound on each git call of the version probe.
    pub fn vcs(&self) -> Duration {
        Duration::from_secs(self.vcs)
    }

    /// Bound on one plugin hook invocation.
    pub fn hook(&self) -> Duration {
        Duration::from_secs(self.hook)
    }

    /// Bound on downloading the native source archive.
    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch)
    }

    /// Bound on the native configure step.
    pub fn configure(&self) -> Duration {
        Duration::from_secs(self.configure)
    }

    /// Bound on the native compile step.
    pub fn compile(&self) -> Duration {
        Duration::from_secs(self.compile)
    }

    /// Bound on the native install step.
    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install)
    }

    /// Bound on the application package install.
    pub fn package_install(&self) -> Duration {
        Duration::from_secs(self.package_install)
    }

    fn validate(&self) -> Result<()> {
        let all = [
            ("vcs", self.vcs),
            ("hook", self.hook),
            ("fetch", self.fetch),
            ("configure", self.configure),
            ("compile", self.compile),
            ("install", self.install),
            ("package_install", self.package_install),
        ];
        match all.iter().find(|(_, secs)| *secs == 0) {
            Some((name, _)) => Err(PimsBuildError::Config(format!(
                "timeouts.{name} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }
}

/// Native library source and build recipe.
///
/// Command templates understand `{prefix}`, `{jobs}` and `{source}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NativeConfig {
    /// Library version, recorded on the installed handle.
    pub version: String,

    /// Archive URL or local path. `{version}` is substituted.
    pub source: String,

    /// Expected SHA-256 of the archive, hex encoded.
    pub sha256: Option<String>,

    /// Parallel compile jobs.
    pub jobs: usize,

    /// Extra arguments appended to the configure command.
    pub config_options: Vec<String>,

    pub configure: Vec<String>,
    pub compile: Vec<String>,
    pub install: Vec<String>,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VIPS_VERSION.to_string(),
            source: "https://github.com/libvips/libvips/releases/download/v{version}/vips-{version}.tar.gz"
                .to_string(),
            sha256: None,
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            config_options: Vec::new(),
            configure: vec!["./configure".to_string(), "--prefix={prefix}".to_string()],
            compile: vec!["make".to_string(), "-j{jobs}".to_string()],
            install: vec!["make".to_string(), "install".to_string()],
        }
    }
}

impl NativeConfig {
    /// Archive reference with the version substituted.
    pub fn source_ref(&self) -> String {
        self.source.replace("{version}", &self.version)
    }
}

/// Executables used by plugin hooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PluginToolsConfig {
    pub git: String,
    pub bash: String,
    pub pip: String,
    /// Arguments placed before the requirement selection in `pip` calls.
    pub pip_install_args: Vec<String>,
}

impl Default for PluginToolsConfig {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            bash: "bash".to_string(),
            pip: "pip".to_string(),
            pip_install_args: vec!["install".to_string(), "--no-cache-dir".to_string()],
        }
    }
}

/// Application package installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageConfig {
    /// Requirements file name inside the application tree.
    pub requirements: String,
    pub pip: String,
    pub pip_install_args: Vec<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            requirements: "requirements.txt".to_string(),
            pip: "pip".to_string(),
            pip_install_args: vec!["install".to_string(), "--no-cache-dir".to_string()],
        }
    }
}
