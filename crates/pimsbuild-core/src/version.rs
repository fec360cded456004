//! Version resolution from version-control state.
//!
//! A build is either a release (HEAD carries a `vX.Y.Z` tag) or a snapshot
//! identified by branch and commit time. [`resolve`] is pure: the git lookup
//! happens in [`crate::git`] and its results are passed in.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{PimsBuildError, Result};

/// Timestamp layout embedded in snapshot identifiers (UTC, sortable).
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Suffix closing every snapshot identifier.
pub const SNAPSHOT_SUFFIX: &str = "SNAPSHOT";

fn release_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^v([0-9]+)\.([0-9]+)\.([0-9]+)$").expect("release tag pattern is valid")
    })
}

/// The version of one build invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionRecord {
    /// Official release parsed from a `vX.Y.Z` tag.
    Release {
        major: u64,
        minor: u64,
        patch: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prerelease: Option<String>,
    },

    /// Anything else: `v<branch>-<timestamp>-SNAPSHOT`.
    Snapshot { id: String },
}

impl VersionRecord {
    /// Create a release record.
    pub fn release(major: u64, minor: u64, patch: u64) -> Self {
        VersionRecord::Release {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    /// Attach a prerelease label (`rc.1`, `beta`) to a release record.
    ///
    /// Snapshots already identify themselves and reject a label.
    pub fn with_prerelease(self, label: &str) -> Result<Self> {
        let valid = !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if !valid {
            return Err(PimsBuildError::VersionResolution(format!(
                "invalid prerelease label '{label}'"
            )));
        }
        match self {
            VersionRecord::Release {
                major, minor, patch, ..
            } => Ok(VersionRecord::Release {
                major,
                minor,
                patch,
                prerelease: Some(label.to_string()),
            }),
            VersionRecord::Snapshot { id } => Err(PimsBuildError::VersionResolution(format!(
                "prerelease label '{label}' cannot be applied to snapshot {id}"
            ))),
        }
    }

    /// Whether this is an official release.
    pub fn is_release(&self) -> bool {
        matches!(self, VersionRecord::Release { .. })
    }

    /// The numeric triple of a release.
    pub fn triple(&self) -> Option<(u64, u64, u64)> {
        match self {
            VersionRecord::Release {
                major, minor, patch, ..
            } => Some((*major, *minor, *patch)),
            VersionRecord::Snapshot { .. } => None,
        }
    }

    /// Image tag for this version with a variant suffix appended.
    pub fn tag_with_suffix(&self, suffix: &str) -> String {
        format!("{self}{suffix}")
    }
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRecord::Release {
                major,
                minor,
                patch,
                prerelease,
            } => {
                write!(f, "{major}.{minor}.{patch}")?;
                if let Some(label) = prerelease {
                    write!(f, "-{label}")?;
                }
                Ok(())
            }
            VersionRecord::Snapshot { id } => f.write_str(id),
        }
    }
}

/// Whether `tag` is an official release tag (`v<major>.<minor>.<patch>`).
pub fn is_release_tag(tag: &str) -> bool {
    release_tag_pattern().is_match(tag)
}

/// Make a branch name usable inside an image tag.
pub fn normalize_branch(branch: &str) -> String {
    branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Compute the version record for a build.
///
/// A tag matching `v\d+\.\d+\.\d+` exactly yields a release; every other
/// state yields a snapshot built from `branch` and `commit_time`.
pub fn resolve(
    vcs_tag: Option<&str>,
    branch: &str,
    commit_time: DateTime<Utc>,
) -> Result<VersionRecord> {
    if let Some(caps) = vcs_tag.and_then(|tag| release_tag_pattern().captures(tag)) {
        let component = |idx: usize| -> Result<u64> {
            caps[idx].parse::<u64>().map_err(|e| {
                PimsBuildError::VersionResolution(format!(
                    "tag component '{}' out of range: {e}",
                    &caps[idx]
                ))
            })
        };
        return Ok(VersionRecord::release(component(1)?, component(2)?, component(3)?));
    }

    let branch = normalize_branch(branch.trim());
    if branch.is_empty() {
        return Err(PimsBuildError::VersionResolution(
            "no release tag and no branch name to build a snapshot from".to_string(),
        ));
    }

    Ok(VersionRecord::Snapshot {
        id: format!(
            "v{branch}-{}-{SNAPSHOT_SUFFIX}",
            commit_time.format(SNAPSHOT_TIMESTAMP_FORMAT)
        ),
    })
}
