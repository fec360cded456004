//! The two image variants of a build.

use pimsbuild_core::{PluginDescriptor, PluginManifest, VersionRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An image variant: which plugins it carries and how its tag is suffixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildVariant {
    /// No plugins.
    Base,
    /// Every enabled plugin of the manifest.
    AllPlugins,
}

impl BuildVariant {
    /// Both variants; the base variant comes first.
    pub const ALL: [BuildVariant; 2] = [BuildVariant::Base, BuildVariant::AllPlugins];

    pub fn name(&self) -> &'static str {
        match self {
            BuildVariant::Base => "base",
            BuildVariant::AllPlugins => "all-plugins",
        }
    }

    pub fn tag_suffix(&self) -> &'static str {
        match self {
            BuildVariant::Base => "",
            BuildVariant::AllPlugins => "-all-plugins",
        }
    }

    /// First exit code of this variant's band.
    pub fn exit_band(&self) -> u8 {
        match self {
            BuildVariant::Base => 20,
            BuildVariant::AllPlugins => 30,
        }
    }

    /// Image tag of this variant for `version`.
    pub fn tag(&self, version: &VersionRecord) -> String {
        version.tag_with_suffix(self.tag_suffix())
    }

    /// Plugins installed in this variant, in manifest order.
    pub fn plugin_set(&self, manifest: &PluginManifest) -> Vec<PluginDescriptor> {
        match self {
            BuildVariant::Base => Vec::new(),
            BuildVariant::AllPlugins => manifest.enabled(),
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuildVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(BuildVariant::Base),
            "all-plugins" => Ok(BuildVariant::AllPlugins),
            other => Err(format!(
                "unknown variant '{other}' (expected 'base' or 'all-plugins')"
            )),
        }
    }
}
