//! Source archive retrieval and unpacking.

use crate::error::{BuildFailure, NativeStep};
use crate::Result;
use pimsbuild_core::exec::{self, CommandSpec};
use pimsbuild_core::SharedEnv;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Whether `source_ref` should be downloaded rather than copied.
pub fn is_remote(source_ref: &str) -> bool {
    source_ref.starts_with("https://") || source_ref.starts_with("http://")
}

/// SHA-256 of `bytes`, hex encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

async fn download(source_ref: &str, timeout: Duration) -> Result<Vec<u8>> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("pimsbuild/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?;

    let fetch = async {
        let response = client.get(source_ref).send().await?.error_for_status()?;
        Ok::<_, reqwest::Error>(response.bytes().await?.to_vec())
    };

    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(BuildFailure::Fetch {
            source_ref: source_ref.to_string(),
            reason: format!("timed out after {}s", timeout.as_secs()),
        }),
    }
}

/// Fetch `source_ref` into `dest` and return the archive's SHA-256.
///
/// When `expected_sha256` is set the archive must match it; nothing is
/// written to `dest` for a mismatching archive.
pub async fn fetch(
    source_ref: &str,
    expected_sha256: Option<&str>,
    dest: &Path,
    timeout: Duration,
) -> Result<String> {
    let bytes = if is_remote(source_ref) {
        info!(source = %source_ref, "Downloading native source archive");
        download(source_ref, timeout).await?
    } else {
        debug!(source = %source_ref, "Reading local native source archive");
        tokio::fs::read(source_ref)
            .await
            .map_err(|e| BuildFailure::Fetch {
                source_ref: source_ref.to_string(),
                reason: e.to_string(),
            })?
    };

    let actual = sha256_hex(&bytes);
    if let Some(expected) = expected_sha256 {
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(BuildFailure::ChecksumMismatch {
                source_ref: source_ref.to_string(),
                expected: expected.to_lowercase(),
                actual,
            });
        }
    }

    tokio::fs::write(dest, &bytes)
        .await
        .map_err(BuildFailure::io(NativeStep::Fetch))?;
    Ok(actual)
}

/// Unpack `archive` into `dest`, dropping the archive's top-level directory.
pub async fn extract(archive: &Path, dest: &Path, env: &SharedEnv, timeout: Duration) -> Result<()> {
    tokio::fs::create_dir_all(dest)
        .await
        .map_err(BuildFailure::io(NativeStep::Extract))?;

    let argv = vec![
        "tar".to_string(),
        "-xf".to_string(),
        archive.to_string_lossy().to_string(),
        "-C".to_string(),
        dest.to_string_lossy().to_string(),
        "--strip-components=1".to_string(),
    ];
    let spec = CommandSpec::new("native:extract", argv, timeout).env(env);
    exec::run(&spec)
        .await
        .map_err(|source| BuildFailure::Command {
            step: NativeStep::Extract,
            source,
        })?;
    Ok(())
}
