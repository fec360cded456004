//! Bounded subprocess execution.
//!
//! Every external call of a build (git, bash, pip, tar, make) goes through
//! [`run`], which always applies a timeout and the variant's [`SharedEnv`].
//! Children are spawned with `kill_on_drop`, so dropping the future (timeout
//! or task abort) kills the process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::env::SharedEnv;

/// Bytes of stderr kept in failure messages.
const STDERR_TAIL_BYTES: usize = 2048;

/// A command to execute.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Label used in logs and errors.
    pub label: String,

    /// Program and arguments.
    pub argv: Vec<String>,

    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Variables layered on top of the inherited environment.
    pub env: SharedEnv,

    /// Hard limit on the run time.
    pub timeout: Duration,
}

impl CommandSpec {
    /// Create a command from an argument vector.
    pub fn new(label: impl Into<String>, argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            argv,
            cwd: None,
            env: SharedEnv::new(),
            timeout,
        }
    }

    /// Run in `dir`.
    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Use `env` for this command.
    pub fn env(mut self, env: &SharedEnv) -> Self {
        self.env = env.clone();
        self
    }

    /// Command line for display.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Output of a successful command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub label: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Errors from [`run`].
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{label}: empty command")]
    Empty { label: String },

    #[error("{label}: failed to spawn '{program}': {source}")]
    Spawn {
        label: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{label}: '{command}' exited with code {exit_code}: {stderr_tail}")]
    Failed {
        label: String,
        command: String,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error("{label}: timed out after {timeout_secs}s")]
    TimedOut { label: String, timeout_secs: u64 },

    #[error("{label}: waiting for process failed: {source}")]
    Wait {
        label: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Whether the command was stopped by its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::TimedOut { .. })
    }
}

fn tail(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

/// Execute a command and wait for it, bounded by its timeout.
///
/// A non-zero exit is an error carrying the tail of stderr.
pub async fn run(spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
    let start = Instant::now();

    let Some((program, args)) = spec.argv.split_first() else {
        return Err(CommandError::Empty {
            label: spec.label.clone(),
        });
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .envs(spec.env.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    debug!(label = %spec.label, command = %spec.display(), "Spawning command");

    let child = command.spawn().map_err(|source| CommandError::Spawn {
        label: spec.label.clone(),
        program: program.clone(),
        source,
    })?;

    let output = tokio::time::timeout(spec.timeout, child.wait_with_output())
        .await
        .map_err(|_| CommandError::TimedOut {
            label: spec.label.clone(),
            timeout_secs: spec.timeout.as_secs(),
        })?
        .map_err(|source| CommandError::Wait {
            label: spec.label.clone(),
            source,
        })?;

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(CommandError::Failed {
            label: spec.label.clone(),
            command: spec.display(),
            exit_code,
            stderr_tail: tail(&stderr),
        });
    }

    debug!(label = %spec.label, duration_ms, "Command finished");

    Ok(CommandOutput {
        label: spec.label.clone(),
        exit_code,
        stdout,
        stderr,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let spec = CommandSpec::new("echo_test", argv(&["echo", "hello"]), Duration::from_secs(60));
        let output = run(&spec).await.expect("execute failed");
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let spec = CommandSpec::new(
            "fail_test",
            argv(&["sh", "-c", "echo broken >&2; exit 3"]),
            Duration::from_secs(60),
        );
        match run(&spec).await.unwrap_err() {
            CommandError::Failed {
                exit_code,
                stderr_tail,
                ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr_tail, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_error() {
        let spec = CommandSpec::new("sleep_test", argv(&["sleep", "5"]), Duration::from_millis(100));
        let start = Instant::now();
        let err = run(&spec).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let env = SharedEnv::new().with("PIMSBUILD_TEST_VALUE", "shared");
        let spec = CommandSpec::new(
            "env_test",
            argv(&["sh", "-c", "echo $PIMSBUILD_TEST_VALUE > out.txt"]),
            Duration::from_secs(60),
        )
        .current_dir(dir.path())
        .env(&env);

        run(&spec).await.unwrap();
        let written = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(written.trim(), "shared");
    }

    #[tokio::test]
    async fn test_empty_and_missing_programs() {
        let empty = CommandSpec::new("empty", vec![], Duration::from_secs(1));
        assert!(matches!(run(&empty).await, Err(CommandError::Empty { .. })));

        let missing = CommandSpec::new(
            "missing",
            argv(&["pimsbuild-definitely-not-a-program"]),
            Duration::from_secs(1),
        );
        assert!(matches!(run(&missing).await, Err(CommandError::Spawn { .. })));
    }

    #[test]
    fn test_tail_keeps_end_of_output() {
        let long = "x".repeat(STDERR_TAIL_BYTES + 10) + "END";
        let t = tail(&long);
        assert!(t.starts_with("..."));
        assert!(t.ends_with("END"));
    }
}
