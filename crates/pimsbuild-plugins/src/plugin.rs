//! The plugin capability set and the context hooks run with.

use async_trait::async_trait;
use pimsbuild_core::{LifecyclePhase, PluginDescriptor, PluginToolsConfig, SharedEnv};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Read-only context handed to every hook of one variant.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Directory holding one subdirectory per plugin.
    pub plugin_root: PathBuf,

    /// Application install path.
    pub app_path: PathBuf,

    /// Shared configuration, as environment variables.
    pub env: SharedEnv,

    /// Executables hooks may call.
    pub tools: PluginToolsConfig,

    /// Upper bound on a single hook invocation.
    pub hook_timeout: Duration,
}

impl HookContext {
    /// The directory a plugin owns.
    pub fn plugin_dir(&self, descriptor: &PluginDescriptor) -> PathBuf {
        self.plugin_root.join(&descriptor.name)
    }
}

/// A plugin: a descriptor plus up to four lifecycle hooks.
///
/// Every hook defaults to a no-op. A plugin reports which hooks it has via
/// [`Plugin::declares`]; the runner only invokes declared hooks, so an
/// undeclared phase is skipped rather than treated as an error.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The manifest row this plugin was created from.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Plugin name.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Whether the plugin has a hook for `phase`.
    fn declares(&self, phase: LifecyclePhase, ctx: &HookContext) -> bool;

    async fn fetch(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn pre_native_build(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn pre_package_install(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn install(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Invoke the hook of `plugin` matching `phase`.
pub(crate) async fn dispatch(
    plugin: &dyn Plugin,
    phase: LifecyclePhase,
    ctx: &HookContext,
) -> anyhow::Result<()> {
    match phase {
        LifecyclePhase::Fetch => plugin.fetch(ctx).await,
        LifecyclePhase::PreNativeBuild => plugin.pre_native_build(ctx).await,
        LifecyclePhase::PrePackageInstall => plugin.pre_package_install(ctx).await,
        LifecyclePhase::Install => plugin.install(ctx).await,
    }
}

/// Turns manifest rows into plugins.
pub trait PluginProvider: Send + Sync {
    fn provide(&self, descriptor: &PluginDescriptor) -> Arc<dyn Plugin>;
}
