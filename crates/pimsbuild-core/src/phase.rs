//! Plugin lifecycle phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four plugin lifecycle phases, in their fixed global order.
///
/// The derived `Ord` follows declaration order, so sorting phases yields
/// execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Clone the plugin sources.
    Fetch,

    /// Prepare prerequisites before the native library is compiled.
    PreNativeBuild,

    /// Prepare prerequisites before the Python packages are installed.
    PrePackageInstall,

    /// Install the plugin package itself.
    Install,
}

impl LifecyclePhase {
    /// All phases in execution order.
    pub const ALL: [LifecyclePhase; 4] = [
        LifecyclePhase::Fetch,
        LifecyclePhase::PreNativeBuild,
        LifecyclePhase::PrePackageInstall,
        LifecyclePhase::Install,
    ];

    /// Hook name as exposed to plugins.
    pub fn name(&self) -> &'static str {
        match self {
            LifecyclePhase::Fetch => "fetch",
            LifecyclePhase::PreNativeBuild => "pre_native_build",
            LifecyclePhase::PrePackageInstall => "pre_package_install",
            LifecyclePhase::Install => "install",
        }
    }

    /// Method argument understood by plugin `install-prerequisites.sh` scripts.
    pub fn method(&self) -> &'static str {
        match self {
            LifecyclePhase::Fetch => "download",
            LifecyclePhase::PreNativeBuild => "dependencies_before_vips",
            LifecyclePhase::PrePackageInstall => "dependencies_before_python",
            LifecyclePhase::Install => "install",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_is_total() {
        let mut shuffled = vec![
            LifecyclePhase::Install,
            LifecyclePhase::Fetch,
            LifecyclePhase::PrePackageInstall,
            LifecyclePhase::PreNativeBuild,
        ];
        shuffled.sort();
        assert_eq!(shuffled, LifecyclePhase::ALL.to_vec());
    }

    #[test]
    fn test_methods_match_prerequisite_scripts() {
        assert_eq!(LifecyclePhase::PreNativeBuild.method(), "dependencies_before_vips");
        assert_eq!(
            LifecyclePhase::PrePackageInstall.method(),
            "dependencies_before_python"
        );
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&LifecyclePhase::PreNativeBuild).unwrap();
        assert_eq!(json, "\"pre_native_build\"");
    }
}
