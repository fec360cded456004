//! Plugin manifest parsing.
//!
//! The manifest is CSV with a header row and the columns
//! `enabled,name,git_url,git_branch`, one row per plugin. Row order is the
//! order in which plugin hooks run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{PimsBuildError, Result};

/// Expected header columns, in order.
pub const MANIFEST_COLUMNS: [&str; 4] = ["enabled", "name", "git_url", "git_branch"];

/// One plugin row of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Whether the plugin is part of the all-plugins variant.
    pub enabled: bool,

    /// Plugin name, also its directory name under the plugin install path.
    pub name: String,

    /// Git remote to clone.
    pub source_url: String,

    /// Branch, tag or commit to check out. Empty means the remote default.
    pub source_ref: String,
}

impl PluginDescriptor {
    /// Create an enabled descriptor.
    pub fn new(name: &str, source_url: &str, source_ref: &str) -> Self {
        Self {
            enabled: true,
            name: name.to_string(),
            source_url: source_url.to_string(),
            source_ref: source_ref.to_string(),
        }
    }

    /// Mark this descriptor as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Parsed plugin manifest, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    plugins: Vec<PluginDescriptor>,
}

impl PluginManifest {
    /// Parse manifest text.
    ///
    /// The first non-blank line is the header and is skipped. Rows must have
    /// exactly four fields. Names must be unique among enabled rows; disabled
    /// rows are not checked.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut plugins = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut header_skipped = false;

        for (idx, line) in raw.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            if !header_skipped {
                header_skipped = true;
                continue;
            }

            let fields = split_record(line).map_err(|reason| PimsBuildError::ManifestParse {
                line: line_no,
                reason,
            })?;
            if fields.len() != MANIFEST_COLUMNS.len() {
                return Err(PimsBuildError::ManifestParse {
                    line: line_no,
                    reason: format!(
                        "expected {} fields, found {}",
                        MANIFEST_COLUMNS.len(),
                        fields.len()
                    ),
                });
            }

            let descriptor = PluginDescriptor {
                enabled: parse_enabled(&fields[0]),
                name: fields[1].trim().to_string(),
                source_url: fields[2].trim().to_string(),
                source_ref: fields[3].trim().to_string(),
            };

            if descriptor.enabled {
                if descriptor.name.is_empty() {
                    return Err(PimsBuildError::ManifestParse {
                        line: line_no,
                        reason: "enabled plugin has an empty name".to_string(),
                    });
                }
                if let Some(first_line) = seen.get(&descriptor.name) {
                    return Err(PimsBuildError::DuplicatePluginName {
                        name: descriptor.name,
                        first_line: *first_line,
                        line: line_no,
                    });
                }
                seen.insert(descriptor.name.clone(), line_no);
            }

            plugins.push(descriptor);
        }

        Ok(Self { plugins })
    }

    /// Read and parse a manifest file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Build a manifest from descriptors, applying the same uniqueness rule.
    pub fn from_descriptors(plugins: Vec<PluginDescriptor>) -> Result<Self> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (idx, plugin) in plugins.iter().enumerate().filter(|(_, p)| p.enabled) {
            if let Some(first) = seen.insert(plugin.name.as_str(), idx + 1) {
                return Err(PimsBuildError::DuplicatePluginName {
                    name: plugin.name.clone(),
                    first_line: first,
                    line: idx + 1,
                });
            }
        }
        Ok(Self { plugins })
    }

    /// Every row, enabled or not, in source order.
    pub fn all(&self) -> &[PluginDescriptor] {
        &self.plugins
    }

    /// Enabled rows in source order.
    pub fn enabled(&self) -> Vec<PluginDescriptor> {
        self.plugins.iter().filter(|p| p.enabled).cloned().collect()
    }

    /// Whether the manifest has no rows at all.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// `0` disables a plugin, as do the usual spelled-out false values.
fn parse_enabled(field: &str) -> bool {
    let value = field.trim();
    !(value == "0"
        || value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("no")
        || value.eq_ignore_ascii_case("off"))
}

/// Split one CSV record, honoring double-quoted fields.
///
/// Leading whitespace before a field is dropped.
fn split_record(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut at_field_start = true;
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            ',' => {
                fields.push(std::mem::take(&mut field));
                at_field_start = true;
            }
            ' ' | '\t' if at_field_start => {}
            '"' if at_field_start => {
                in_quotes = true;
                at_field_start = false;
            }
            '\r' => {}
            _ => {
                field.push(c);
                at_field_start = false;
            }
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);
    Ok(fields)
}
