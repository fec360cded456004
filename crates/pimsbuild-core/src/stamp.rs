//! Version stamping into the application's version-record file.
//!
//! The application ships a JSON record (by default `pims/version.json`)
//! whose `"version"` key is the one value the build rewrites. A missing file
//! or key means the packaging regressed, so stamping fails instead of
//! creating it.

use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::error::{PimsBuildError, Result};
use crate::version::VersionRecord;

/// Key holding the stamped version inside the record file.
pub const VERSION_KEY: &str = "version";

/// What a stamp call did to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampStatus {
    /// The slot held another value and was rewritten.
    Written,
    /// The slot already held this version; the file was left untouched.
    Unchanged,
}

fn missing(slot: &Path, reason: impl Into<String>) -> PimsBuildError {
    PimsBuildError::StampTargetMissing {
        path: slot.to_path_buf(),
        reason: reason.into(),
    }
}

fn load_slot(slot: &Path) -> Result<serde_json::Map<String, Value>> {
    let raw = match std::fs::read_to_string(slot) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(missing(slot, "version record file not found"));
        }
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(map) if map.contains_key(VERSION_KEY) => Ok(map),
        Value::Object(_) => Err(missing(slot, format!("no \"{VERSION_KEY}\" key"))),
        _ => Err(missing(slot, "version record is not a JSON object")),
    }
}

/// Write `record` into the slot at `slot`.
///
/// Only the `"version"` value changes; other keys and their order are kept.
/// Stamping a slot that already holds the same version does not touch the
/// file, so repeated stamps are byte-identical.
pub fn stamp(slot: &Path, record: &VersionRecord) -> Result<StampStatus> {
    let mut map = load_slot(slot)?;
    let rendered = record.to_string();

    if map.get(VERSION_KEY).and_then(Value::as_str) == Some(rendered.as_str()) {
        debug!(slot = %slot.display(), version = %rendered, "Version slot already stamped");
        return Ok(StampStatus::Unchanged);
    }

    map.insert(VERSION_KEY.to_string(), Value::String(rendered.clone()));
    let mut out = serde_json::to_string_pretty(&Value::Object(map))?;
    out.push('\n');

    let staged = slot.with_extension("json.stamping");
    std::fs::write(&staged, out)?;
    std::fs::rename(&staged, slot)?;

    debug!(slot = %slot.display(), version = %rendered, "Version slot stamped");
    Ok(StampStatus::Written)
}

/// Read the version currently held by the slot.
pub fn read_stamped(slot: &Path) -> Result<String> {
    let map = load_slot(slot)?;
    map.get(VERSION_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(slot, format!("\"{VERSION_KEY}\" is not a string")))
}
