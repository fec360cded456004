//! Integration tests for the lifecycle runner with recording plugins and
//! real git-backed script plugins.

use async_trait::async_trait;
use pimsbuild_core::{LifecyclePhase, PluginDescriptor, PluginToolsConfig, SharedEnv};
use pimsbuild_plugins::{
    HookContext, LifecycleRunner, Plugin, PluginProvider, ScriptPluginProvider,
};
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type CallLog = Arc<Mutex<Vec<(String, LifecyclePhase)>>>;

/// Plugin that records hook calls and fails on request.
struct RecordingPlugin {
    descriptor: PluginDescriptor,
    hooks: Vec<LifecyclePhase>,
    fail_on: Option<LifecyclePhase>,
    log: CallLog,
}

impl RecordingPlugin {
    fn new(name: &str, hooks: &[LifecyclePhase], log: &CallLog) -> Self {
        Self {
            descriptor: PluginDescriptor::new(name, "https://example.org/x.git", "main"),
            hooks: hooks.to_vec(),
            fail_on: None,
            log: log.clone(),
        }
    }

    fn failing_on(mut self, phase: LifecyclePhase) -> Self {
        self.fail_on = Some(phase);
        self
    }

    fn record(&self, phase: LifecyclePhase) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((self.descriptor.name.clone(), phase));
        if self.fail_on == Some(phase) {
            anyhow::bail!("{} broke during {}", self.descriptor.name, phase);
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn declares(&self, phase: LifecyclePhase, _ctx: &HookContext) -> bool {
        self.hooks.contains(&phase)
    }

    async fn fetch(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        self.record(LifecyclePhase::Fetch)
    }

    async fn pre_native_build(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        self.record(LifecyclePhase::PreNativeBuild)
    }

    async fn pre_package_install(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        self.record(LifecyclePhase::PrePackageInstall)
    }

    async fn install(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        self.record(LifecyclePhase::Install)
    }
}

fn context(root: &Path) -> HookContext {
    HookContext {
        plugin_root: root.join("plugins"),
        app_path: root.join("app"),
        env: SharedEnv::new(),
        tools: PluginToolsConfig::default(),
        hook_timeout: Duration::from_secs(60),
    }
}

/// Test: A(fetch, install) then B(install fails) then C(install).
/// INSTALL applies A, reports B, never reaches C.
#[tokio::test]
async fn test_install_fail_fast_in_manifest_order() {
    let log: CallLog = Arc::default();
    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(RecordingPlugin::new(
            "A",
            &[LifecyclePhase::Fetch, LifecyclePhase::Install],
            &log,
        )),
        Arc::new(
            RecordingPlugin::new("B", &[LifecyclePhase::Install], &log)
                .failing_on(LifecyclePhase::Install),
        ),
        Arc::new(RecordingPlugin::new("C", &[LifecyclePhase::Install], &log)),
    ];
    let root = tempfile::tempdir().unwrap();

    let failure = LifecycleRunner::run(&plugins, LifecyclePhase::Install, &context(root.path()))
        .await
        .expect_err("B must fail the phase");

    assert_eq!(failure.plugin_name, "B");
    assert_eq!(failure.phase, LifecyclePhase::Install);
    assert!(failure.underlying_error.to_string().contains("B broke"));

    let calls = log.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            ("A".to_string(), LifecyclePhase::Install),
            ("B".to_string(), LifecyclePhase::Install),
        ],
        "C must not run after B fails"
    );
}

/// Test: phases run in global order and each only invokes declared hooks.
#[tokio::test]
async fn test_run_phases_in_order() {
    let log: CallLog = Arc::default();
    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(RecordingPlugin::new(
            "A",
            &[LifecyclePhase::Fetch, LifecyclePhase::Install],
            &log,
        )),
        Arc::new(RecordingPlugin::new(
            "B",
            &[LifecyclePhase::PreNativeBuild, LifecyclePhase::Install],
            &log,
        )),
    ];
    let root = tempfile::tempdir().unwrap();

    let reports = LifecycleRunner::run_phases(&plugins, &LifecyclePhase::ALL, &context(root.path()))
        .await
        .expect("all phases succeed");

    assert_eq!(reports.len(), 4);
    assert_eq!(reports[0].invoked_names(), vec!["A"]);
    assert_eq!(reports[0].skipped, vec!["B"]);
    assert_eq!(reports[1].invoked_names(), vec!["B"]);
    assert!(reports[2].invoked.is_empty());
    assert_eq!(reports[3].invoked_names(), vec!["A", "B"]);

    let calls = log.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            ("A".to_string(), LifecyclePhase::Fetch),
            ("B".to_string(), LifecyclePhase::PreNativeBuild),
            ("A".to_string(), LifecyclePhase::Install),
            ("B".to_string(), LifecyclePhase::Install),
        ]
    );
}

/// Test: a failure stops later phases too.
#[tokio::test]
async fn test_run_phases_stops_at_first_failed_phase() {
    let log: CallLog = Arc::default();
    let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(
        RecordingPlugin::new("A", &LifecyclePhase::ALL, &log)
            .failing_on(LifecyclePhase::PreNativeBuild),
    )];
    let root = tempfile::tempdir().unwrap();

    let failure = LifecycleRunner::run_phases(&plugins, &LifecyclePhase::ALL, &context(root.path()))
        .await
        .unwrap_err();
    assert_eq!(failure.phase, LifecyclePhase::PreNativeBuild);
    assert_eq!(log.lock().unwrap().len(), 2);
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Creates a plugin repository with a prerequisites script and a `v1.0.0`
/// tag; the default branch then moves past the tag.
fn make_plugin_repo(root: &Path) -> PathBuf {
    let repo = root.join("remote-plugin");
    std::fs::create_dir_all(&repo).unwrap();
    run_git(&repo, &["init"]);
    run_git(&repo, &["config", "user.name", "test-user"]);
    run_git(&repo, &["config", "user.email", "test@example.com"]);
    std::fs::write(
        repo.join("install-prerequisites.sh"),
        "echo \"$1\" >> \"$PIMS_PLUGIN_PATH/prereqs.log\"\n",
    )
    .unwrap();
    std::fs::write(repo.join("VERSION"), "1.0.0\n").unwrap();
    run_git(&repo, &["add", "."]);
    run_git(&repo, &["commit", "-m", "v1"]);
    run_git(&repo, &["tag", "v1.0.0"]);
    std::fs::write(repo.join("VERSION"), "2.0.0-dev\n").unwrap();
    run_git(&repo, &["commit", "-am", "dev"]);
    repo
}

/// Test: script plugins clone, check out the manifest ref and run their
/// prerequisite script with the shared environment.
#[tokio::test]
async fn test_script_plugin_fetch_and_prerequisites() {
    let root = tempfile::tempdir().unwrap();
    let repo = make_plugin_repo(root.path());

    let descriptor = PluginDescriptor::new("fmt-plugin", &repo.to_string_lossy(), "v1.0.0");
    let plugins = vec![ScriptPluginProvider.provide(&descriptor)];

    let mut ctx = context(root.path());
    ctx.env = SharedEnv::new().with(
        "PIMS_PLUGIN_PATH",
        ctx.plugin_root.to_string_lossy().to_string(),
    );

    LifecycleRunner::run_phases(
        &plugins,
        &[
            LifecyclePhase::Fetch,
            LifecyclePhase::PreNativeBuild,
            LifecyclePhase::PrePackageInstall,
        ],
        &ctx,
    )
    .await
    .expect("fetch and prerequisites succeed");

    let checked_out = std::fs::read_to_string(ctx.plugin_root.join("fmt-plugin/VERSION")).unwrap();
    assert_eq!(checked_out.trim(), "1.0.0");

    let prereqs = std::fs::read_to_string(ctx.plugin_root.join("prereqs.log")).unwrap();
    assert_eq!(
        prereqs.lines().collect::<Vec<_>>(),
        vec!["dependencies_before_vips", "dependencies_before_python"]
    );
}

/// Test: cloning an unreachable source is a fetch failure of that plugin.
#[tokio::test]
async fn test_script_plugin_bad_source() {
    let root = tempfile::tempdir().unwrap();
    let descriptor = PluginDescriptor::new(
        "ghost",
        &root.path().join("does-not-exist").to_string_lossy(),
        "",
    );
    let plugins = vec![ScriptPluginProvider.provide(&descriptor)];

    let failure = LifecycleRunner::run(&plugins, LifecyclePhase::Fetch, &context(root.path()))
        .await
        .unwrap_err();
    assert_eq!(failure.plugin_name, "ghost");
    assert_eq!(failure.phase, LifecyclePhase::Fetch);
}
