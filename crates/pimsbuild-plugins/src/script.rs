//! Plugins driven by their repository layout.
//!
//! A script plugin is a git repository. Its hooks are:
//! - fetch: clone the repository and check out the requested ref
//! - pre_native_build / pre_package_install: `bash install-prerequisites.sh
//!   <method>`, only when the script exists
//! - install: `pip install -r requirements.txt`, or an editable install of
//!   the repository when it has no requirements file

use crate::plugin::{HookContext, Plugin, PluginProvider};
use anyhow::Context;
use async_trait::async_trait;
use pimsbuild_core::exec::{self, CommandSpec};
use pimsbuild_core::{LifecyclePhase, PluginDescriptor};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Prerequisite script every plugin may ship at its repository root.
pub const INSTALL_PREREQUISITES: &str = "install-prerequisites.sh";

/// Requirements file selecting what `pip` installs for a plugin.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Plugin backed by a git repository and shell/pip conventions.
#[derive(Debug, Clone)]
pub struct ScriptPlugin {
    descriptor: PluginDescriptor,
}

impl ScriptPlugin {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self { descriptor }
    }

    fn command(&self, ctx: &HookContext, step: &str, argv: Vec<String>, dir: &Path) -> CommandSpec {
        CommandSpec::new(
            format!("{}:{}", self.descriptor.name, step),
            argv,
            ctx.hook_timeout,
        )
        .current_dir(dir)
        .env(&ctx.env)
    }

    async fn run_prerequisites(&self, phase: LifecyclePhase, ctx: &HookContext) -> anyhow::Result<()> {
        let dir = ctx.plugin_dir(&self.descriptor);
        info!(plugin = %self.descriptor.name, method = phase.method(), "Running plugin prerequisites script");

        let argv = vec![
            ctx.tools.bash.clone(),
            INSTALL_PREREQUISITES.to_string(),
            phase.method().to_string(),
        ];
        exec::run(&self.command(ctx, phase.name(), argv, &dir)).await?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for ScriptPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn declares(&self, phase: LifecyclePhase, ctx: &HookContext) -> bool {
        match phase {
            LifecyclePhase::Fetch | LifecyclePhase::Install => true,
            LifecyclePhase::PreNativeBuild | LifecyclePhase::PrePackageInstall => ctx
                .plugin_dir(&self.descriptor)
                .join(INSTALL_PREREQUISITES)
                .is_file(),
        }
    }

    async fn fetch(&self, ctx: &HookContext) -> anyhow::Result<()> {
        let dir = ctx.plugin_dir(&self.descriptor);
        if dir.exists() {
            anyhow::bail!("plugin directory {} already exists", dir.display());
        }
        tokio::fs::create_dir_all(&ctx.plugin_root)
            .await
            .with_context(|| format!("creating {}", ctx.plugin_root.display()))?;

        info!(plugin = %self.descriptor.name, url = %self.descriptor.source_url, "Cloning plugin");
        let clone = vec![
            ctx.tools.git.clone(),
            "clone".to_string(),
            self.descriptor.source_url.clone(),
            dir.to_string_lossy().to_string(),
        ];
        exec::run(&self.command(ctx, "clone", clone, &ctx.plugin_root)).await?;

        if !self.descriptor.source_ref.is_empty() {
            let checkout = vec![
                ctx.tools.git.clone(),
                "checkout".to_string(),
                self.descriptor.source_ref.clone(),
            ];
            exec::run(&self.command(ctx, "checkout", checkout, &dir)).await?;
        }
        Ok(())
    }

    async fn pre_native_build(&self, ctx: &HookContext) -> anyhow::Result<()> {
        self.run_prerequisites(LifecyclePhase::PreNativeBuild, ctx).await
    }

    async fn pre_package_install(&self, ctx: &HookContext) -> anyhow::Result<()> {
        self.run_prerequisites(LifecyclePhase::PrePackageInstall, ctx).await
    }

    async fn install(&self, ctx: &HookContext) -> anyhow::Result<()> {
        let dir = ctx.plugin_dir(&self.descriptor);
        let mut argv = vec![ctx.tools.pip.clone()];
        argv.extend(ctx.tools.pip_install_args.iter().cloned());
        if dir.join(REQUIREMENTS_FILE).is_file() {
            argv.extend(["-r".to_string(), REQUIREMENTS_FILE.to_string()]);
        } else {
            argv.extend(["-e".to_string(), ".".to_string()]);
        }

        info!(plugin = %self.descriptor.name, "Installing plugin package");
        exec::run(&self.command(ctx, "install", argv, &dir)).await?;
        Ok(())
    }
}

/// Provides a [`ScriptPlugin`] for every manifest row.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptPluginProvider;

impl PluginProvider for ScriptPluginProvider {
    fn provide(&self, descriptor: &PluginDescriptor) -> Arc<dyn Plugin> {
        Arc::new(ScriptPlugin::new(descriptor.clone()))
    }
}
