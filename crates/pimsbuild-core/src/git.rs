//! Git integration for capturing the version-control state of a build.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PimsBuildError, Result};
use crate::exec::{self, CommandSpec};
use crate::version::is_release_tag;

/// What the version resolver needs to know about HEAD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsState {
    /// Tag pointing at HEAD, preferring a release tag when several exist.
    pub tag: Option<String>,

    /// Current branch; `HEAD` when detached.
    pub branch: String,

    /// Committer time of HEAD.
    pub commit_time: DateTime<Utc>,
}

async fn git(repo_dir: &Path, args: &[&str], timeout: Duration) -> Result<String> {
    let mut argv = vec!["git".to_string()];
    argv.extend(args.iter().map(|a| a.to_string()));
    let spec = CommandSpec::new(format!("git {}", args.join(" ")), argv, timeout)
        .current_dir(repo_dir);

    let output = exec::run(&spec)
        .await
        .map_err(|e| PimsBuildError::GitError(e.to_string()))?;
    Ok(output.stdout.trim().to_string())
}

/// Pick the tag to resolve from the tags pointing at HEAD.
fn pick_tag(tags: &str) -> Option<String> {
    let tags: Vec<&str> = tags.lines().map(str::trim).filter(|t| !t.is_empty()).collect();
    tags.iter()
        .find(|t| is_release_tag(t))
        .or_else(|| tags.first())
        .map(|t| t.to_string())
}

/// Read tag, branch and commit time of HEAD in `repo_dir`.
///
/// Every git call is bounded by `timeout`.
pub async fn probe(repo_dir: &Path, timeout: Duration) -> Result<VcsState> {
    let inside = git(repo_dir, &["rev-parse", "--is-inside-work-tree"], timeout).await?;
    if inside != "true" {
        return Err(PimsBuildError::GitError(format!(
            "{} is not inside a git work tree",
            repo_dir.display()
        )));
    }

    let tags = git(repo_dir, &["tag", "--points-at", "HEAD"], timeout).await?;
    let branch = git(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"], timeout).await?;
    let epoch = git(repo_dir, &["log", "-1", "--format=%ct", "HEAD"], timeout).await?;

    let secs: i64 = epoch
        .parse()
        .map_err(|e| PimsBuildError::GitError(format!("bad commit time '{epoch}': {e}")))?;
    let commit_time = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| PimsBuildError::GitError(format!("commit time {secs} out of range")))?;

    Ok(VcsState {
        tag: pick_tag(&tags),
        branch,
        commit_time,
    })
}
