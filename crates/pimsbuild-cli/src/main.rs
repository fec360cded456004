//! pimsbuild - container image build orchestrator for PIMS
//!
//! ## Commands
//!
//! - `build`: assemble the base and all-plugins image variants
//! - `version`: resolve the build version and print the image tags
//! - `plugins`: list the active plugin set of a manifest
//! - `stamp`: write the resolved version into a version-record file

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use pimsbuild_assembler::{AssemblyError, AssemblyReport, BuildVariant, ImageAssembler, PreparedBuild};
use pimsbuild_core::telemetry::default_level;
use pimsbuild_core::{BuildConfig, PluginManifest, StampStatus, VcsState};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

/// Seconds allowed for each git call when probing outside a build.
const DEFAULT_VCS_TIMEOUT_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "pimsbuild")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build the PIMS image server with and without plugins", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the version comes from. Without `--tag` and `--branch` the git
/// repository at `--repo` is probed.
#[derive(Args, Debug, Clone, Default)]
struct VcsArgs {
    /// Tag of the commit being built (`vX.Y.Z` for releases)
    #[arg(long, env = "PIMSBUILD_TAG")]
    tag: Option<String>,

    /// Branch being built
    #[arg(long, env = "PIMSBUILD_BRANCH")]
    branch: Option<String>,

    /// Commit time, RFC 3339 or seconds since the epoch (default: now)
    #[arg(long, value_parser = parse_commit_time)]
    commit_time: Option<DateTime<Utc>>,

    /// Repository to probe
    #[arg(long, env = "PIMSBUILD_REPO", default_value = ".")]
    repo: PathBuf,

    /// Prerelease label appended to release versions (e.g. rc.1)
    #[arg(long)]
    prerelease: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
struct ManifestArgs {
    /// Plugin manifest file (CSV)
    #[arg(long, env = "PIMSBUILD_MANIFEST", conflicts_with = "manifest_csv")]
    manifest: Option<PathBuf>,

    /// Plugin manifest given inline as CSV text
    #[arg(long)]
    manifest_csv: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the image variants
    Build {
        /// Build configuration file (TOML)
        #[arg(short, long, env = "PIMSBUILD_CONFIG")]
        config: Option<PathBuf>,

        #[command(flatten)]
        manifest: ManifestArgs,

        #[command(flatten)]
        vcs: VcsArgs,

        /// Workspace root (overrides the config file)
        #[arg(long, env = "PIMSBUILD_WORKSPACE")]
        workspace: Option<PathBuf>,

        /// Application source tree (overrides the config file)
        #[arg(long, env = "PIMSBUILD_APP_SOURCE")]
        app_source: Option<PathBuf>,

        /// Build a single variant: base or all-plugins
        #[arg(long)]
        only: Option<BuildVariant>,

        /// Build the variants one after the other
        #[arg(long)]
        sequential: bool,

        /// Write the build report as JSON to this file
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Resolve the version and print the image tags
    Version {
        #[command(flatten)]
        vcs: VcsArgs,
    },

    /// List the plugins a manifest enables
    Plugins {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Also list disabled rows
        #[arg(long)]
        all: bool,
    },

    /// Stamp the resolved version into a version-record file
    Stamp {
        /// Version-record file (JSON with a "version" key)
        slot: PathBuf,

        #[command(flatten)]
        vcs: VcsArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    pimsbuild_core::init_tracing(cli.json, default_level(cli.verbose));

    match run(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "pimsbuild failed");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(command: Commands) -> Result<u8> {
    match command {
        Commands::Build {
            config,
            manifest,
            vcs,
            workspace,
            app_source,
            only,
            sequential,
            report_json,
        } => {
            let mut config = BuildConfig::load(config.as_deref())?;
            if let Some(workspace) = workspace {
                config.workspace_root = workspace;
            }
            if let Some(app_source) = app_source {
                config.app_source = app_source;
            }
            if sequential {
                config.parallel_variants = false;
            }
            config.validate()?;
            cmd_build(config, &manifest, &vcs, only, report_json.as_deref()).await
        }
        Commands::Version { vcs } => cmd_version(&vcs).await.map(|_| 0),
        Commands::Plugins { manifest, all } => cmd_plugins(&manifest, all).map(|_| 0),
        Commands::Stamp { slot, vcs } => cmd_stamp(&slot, &vcs).await.map(|_| 0),
    }
}

/// Exit code for an error that ended the invocation.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<AssemblyError>() {
        Some(e) => e.exit_code(),
        None => 1,
    }
}

fn parse_commit_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        let secs: i64 = raw.parse().map_err(|e| format!("invalid epoch seconds: {e}"))?;
        return DateTime::from_timestamp(secs, 0).ok_or_else(|| format!("epoch {secs} out of range"));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 or epoch seconds: {e}"))
}

/// Version-control state from flags, or from git when no flag names it.
async fn vcs_state(args: &VcsArgs, timeout: Duration) -> Result<VcsState> {
    if args.tag.is_none() && args.branch.is_none() {
        let mut state = pimsbuild_core::probe(&args.repo, timeout)
            .await
            .map_err(AssemblyError::Version)
            .with_context(|| format!("Failed to read git state of {}", args.repo.display()))?;
        if let Some(commit_time) = args.commit_time {
            state.commit_time = commit_time;
        }
        return Ok(state);
    }

    Ok(VcsState {
        tag: args.tag.clone(),
        branch: args.branch.clone().unwrap_or_default(),
        commit_time: args.commit_time.unwrap_or_else(Utc::now),
    })
}

fn load_manifest(args: &ManifestArgs) -> Result<PluginManifest, AssemblyError> {
    match (&args.manifest_csv, &args.manifest) {
        (Some(csv), _) => PluginManifest::parse(csv),
        (None, Some(path)) => PluginManifest::from_file(path),
        (None, None) => Ok(PluginManifest::default()),
    }
    .map_err(AssemblyError::Manifest)
}

async fn prepare(vcs: &VcsArgs, manifest: &ManifestArgs, timeout: Duration) -> Result<PreparedBuild> {
    let state = vcs_state(vcs, timeout).await?;
    let version = PreparedBuild::resolve_version(&state, vcs.prerelease.as_deref())?;
    let manifest = load_manifest(manifest)?;
    Ok(PreparedBuild::new(version, manifest))
}

async fn cmd_build(
    config: BuildConfig,
    manifest: &ManifestArgs,
    vcs: &VcsArgs,
    only: Option<BuildVariant>,
    report_json: Option<&Path>,
) -> Result<u8> {
    let prepared = prepare(vcs, manifest, config.timeouts.vcs()).await?;
    let variants: Vec<BuildVariant> = match only {
        Some(variant) => vec![variant],
        None => BuildVariant::ALL.to_vec(),
    };

    info!(
        build_id = %prepared.build_id,
        version = %prepared.version,
        workspace = %config.workspace_root.display(),
        "Starting build"
    );
    let assembler = ImageAssembler::new(config);
    let report = assembler.assemble(&prepared, &variants).await;

    print_report(&report);
    if let Some(path) = report_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }
    Ok(report.exit_code())
}

fn print_report(report: &AssemblyReport) {
    println!("Build {} (version {})", report.build_id, report.version);
    for outcome in &report.outcomes {
        if outcome.success {
            println!(
                "  ✓ {:<12} {}  ({} ms)",
                outcome.variant.name(),
                outcome.tag,
                outcome.duration_ms
            );
            continue;
        }
        let step = outcome.failed_step.map(|s| s.name()).unwrap_or("internal");
        println!(
            "  ✗ {:<12} {}  failed at {}",
            outcome.variant.name(),
            outcome.tag,
            step
        );
        if let Some(plugin) = &outcome.failed_plugin {
            println!("    plugin: {plugin}");
        }
        if let Some(error) = &outcome.error {
            println!("    error:  {error}");
        }
    }
}

async fn cmd_version(vcs: &VcsArgs) -> Result<()> {
    let state = vcs_state(vcs, Duration::from_secs(DEFAULT_VCS_TIMEOUT_SECS)).await?;
    let prepared = PreparedBuild::resolve(&state, vcs.prerelease.as_deref(), "")?;

    println!("version: {}", prepared.version);
    for variant in BuildVariant::ALL {
        println!("{}: {}", variant.name(), variant.tag(&prepared.version));
    }
    Ok(())
}

fn cmd_plugins(args: &ManifestArgs, all: bool) -> Result<()> {
    let manifest = load_manifest(args)?;

    let rows: Vec<_> = manifest
        .all()
        .iter()
        .filter(|p| all || p.enabled)
        .collect();
    if rows.is_empty() {
        println!("No plugins enabled");
        return Ok(());
    }
    for plugin in rows {
        let marker = if plugin.enabled { "enabled " } else { "disabled" };
        let reference = if plugin.source_ref.is_empty() {
            "(default branch)"
        } else {
            plugin.source_ref.as_str()
        };
        println!("{marker} {} {} {}", plugin.name, plugin.source_url, reference);
    }
    Ok(())
}

async fn cmd_stamp(slot: &Path, vcs: &VcsArgs) -> Result<()> {
    let state = vcs_state(vcs, Duration::from_secs(DEFAULT_VCS_TIMEOUT_SECS)).await?;
    let prepared = PreparedBuild::resolve(&state, vcs.prerelease.as_deref(), "")?;

    match pimsbuild_core::stamp(slot, &prepared.version)? {
        StampStatus::Written => println!("✓ Stamped {} into {}", prepared.version, slot.display()),
        StampStatus::Unchanged => {
            println!("✓ {} already holds {}", slot.display(), prepared.version)
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_commit_time() {
        let expected = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(parse_commit_time("1614834367").unwrap(), expected);
        assert_eq!(parse_commit_time("2021-03-04T06:06:07+01:00").unwrap(), expected);
        assert!(parse_commit_time("yesterday").is_err());
    }

    #[test]
    fn test_build_flags_parse() {
        let cli = Cli::try_parse_from([
            "pimsbuild",
            "--json",
            "build",
            "--tag",
            "v1.2.3",
            "--manifest-csv",
            "enabled,name,git_url,git_branch\n",
            "--only",
            "all-plugins",
            "--sequential",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Build {
                vcs,
                only,
                sequential,
                manifest,
                ..
            } => {
                assert_eq!(vcs.tag.as_deref(), Some("v1.2.3"));
                assert_eq!(only, Some(BuildVariant::AllPlugins));
                assert!(sequential);
                assert!(manifest.manifest_csv.is_some());
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_manifest_sources_conflict() {
        let result = Cli::try_parse_from([
            "pimsbuild",
            "plugins",
            "--manifest",
            "plugins.csv",
            "--manifest-csv",
            "enabled,name,git_url,git_branch\n",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_flags_bypass_git_probe() {
        let args = VcsArgs {
            tag: Some("v3.1.4".to_string()),
            repo: PathBuf::from("/nonexistent"),
            ..VcsArgs::default()
        };
        let state = vcs_state(&args, Duration::from_secs(5)).await.unwrap();
        assert_eq!(state.tag.as_deref(), Some("v3.1.4"));
    }

    #[tokio::test]
    async fn test_missing_manifest_file_is_manifest_error() {
        let args = ManifestArgs {
            manifest: Some(PathBuf::from("/nonexistent/plugins.csv")),
            manifest_csv: None,
        };
        let vcs = VcsArgs {
            tag: Some("v1.0.0".to_string()),
            ..VcsArgs::default()
        };
        let err = prepare(&vcs, &args, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(exit_code_for(&err), 11);
    }

    #[tokio::test]
    async fn test_unresolvable_version_exit_code() {
        let vcs = VcsArgs {
            branch: Some(String::new()),
            ..VcsArgs::default()
        };
        let err = prepare(&vcs, &ManifestArgs::default(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 10);
    }

    #[tokio::test]
    async fn test_git_probe_failure_is_version_error() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = VcsArgs {
            repo: dir.path().to_path_buf(),
            ..VcsArgs::default()
        };
        let err = prepare(&vcs, &ManifestArgs::default(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read git state"));
        assert_eq!(exit_code_for(&err), 10);
    }

    #[tokio::test]
    async fn test_manifest_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.csv");
        std::fs::write(
            &path,
            "enabled,name,git_url,git_branch\n1,pims-plugin-format-isyntax,https://example.org/isyntax.git,master\n",
        )
        .unwrap();
        let args = ManifestArgs {
            manifest: Some(path),
            manifest_csv: None,
        };

        let manifest = load_manifest(&args).unwrap();
        assert_eq!(manifest.enabled().len(), 1);

        std::fs::write(
            dir.path().join("plugins.csv"),
            "enabled,name,git_url,git_branch\n1,a,u,r\n1,a,u,r\n",
        )
        .unwrap();
        let err = prepare(
            &VcsArgs {
                tag: Some("v1.0.0".to_string()),
                ..VcsArgs::default()
            },
            &args,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(exit_code_for(&err), 11);
    }

    #[tokio::test]
    async fn test_stamp_command() {
        let dir = tempfile::tempdir().unwrap();
        let slot = dir.path().join("version.json");
        std::fs::write(&slot, "{\"version\": \"0.0.0\"}\n").unwrap();
        let vcs = VcsArgs {
            tag: Some("v0.1.0".to_string()),
            ..VcsArgs::default()
        };

        cmd_stamp(&slot, &vcs).await.unwrap();
        assert_eq!(pimsbuild_core::read_stamped(&slot).unwrap(), "0.1.0");

        let err = cmd_stamp(&dir.path().join("missing.json"), &vcs)
            .await
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 1);
    }
}
