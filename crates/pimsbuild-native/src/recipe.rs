//! Configure / compile / install command templates.

use crate::error::BuildFailure;
use crate::Result;
use pimsbuild_core::NativeConfig;
use std::path::Path;

/// Command templates for the three build steps.
///
/// Arguments may contain `{prefix}`, `{jobs}` and `{source}`, which are
/// substituted when the recipe is rendered for a concrete build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe {
    pub configure: Vec<String>,
    pub compile: Vec<String>,
    pub install: Vec<String>,
    pub jobs: usize,
}

/// A recipe with every placeholder filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRecipe {
    pub configure: Vec<String>,
    pub compile: Vec<String>,
    pub install: Vec<String>,
}

impl BuildRecipe {
    pub fn from_config(config: &NativeConfig) -> Self {
        Self {
            configure: config.configure.clone(),
            compile: config.compile.clone(),
            install: config.install.clone(),
            jobs: config.jobs,
        }
    }

    /// Fill in placeholders. `config_options` are appended to configure.
    pub fn render(&self, prefix: &Path, source: &Path, config_options: &[String]) -> Result<RenderedRecipe> {
        let prefix = prefix.to_string_lossy();
        let source = source.to_string_lossy();
        let jobs = self.jobs.max(1).to_string();

        let fill = |name: &str, template: &[String]| -> Result<Vec<String>> {
            if template.is_empty() {
                return Err(BuildFailure::InvalidRecipe(format!("{name} command is empty")));
            }
            Ok(template
                .iter()
                .map(|arg| {
                    arg.replace("{prefix}", &prefix)
                        .replace("{source}", &source)
                        .replace("{jobs}", &jobs)
                })
                .collect())
        };

        let mut configure = fill("configure", &self.configure)?;
        configure.extend(config_options.iter().cloned());

        Ok(RenderedRecipe {
            configure,
            compile: fill("compile", &self.compile)?,
            install: fill("install", &self.install)?,
        })
    }
}
