//! The typed configuration record and its loader.
//!
//! Configuration lives at `.config/cem.yaml` under the workspace root; a
//! missing file means defaults. CLI flags are merged over file values by
//! the caller.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cem_common::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = ".config/cem.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Base URL for source hrefs; empty disables href emission.
    pub source_control_root_url: Option<String>,
    pub verbose: bool,
    pub generate: GenerateConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateConfig {
    /// Input globs, module-relative.
    pub files: Vec<String>,
    /// Exclusion globs applied after `files`.
    pub exclude: Vec<String>,
    /// Manifest output path; `None` writes to stdout.
    pub output: Option<String>,
    /// Cap on worker parallelism; defaults to hardware parallelism.
    pub workers: Option<usize>,
    pub design_tokens: Option<DesignTokensConfig>,
    pub demo_discovery: Option<DemoDiscoveryConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignTokensConfig {
    /// Path to a design-tokens JSON document.
    pub spec: String,
    /// CSS custom property prefix, e.g. "token" for `--token-*`.
    #[serde(default = "default_token_prefix")]
    pub prefix: String,
}

fn default_token_prefix() -> String {
    "token".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DemoDiscoveryConfig {
    /// Glob for demo files, module-relative.
    pub file_glob: String,
    /// Pattern matched against a demo path to recover the tag name.
    pub url_pattern: Option<String>,
    /// URL template with `{tag}` / `{path}` placeholders.
    pub url_template: Option<String>,
}

/// Load configuration for `root`.
///
/// `path` overrides the default location. The default location is allowed
/// to be absent; an explicit path is not.
pub fn load_config(root: &Path, path: Option<&Path>) -> Result<Config> {
    let (candidate, explicit) = match path {
        Some(path) => (resolve(root, path), true),
        None => (root.join(DEFAULT_CONFIG_PATH), false),
    };

    if !candidate.is_file() {
        if explicit {
            return Err(Error::file_read(
                "open config",
                candidate,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        tracing::debug!(path = %candidate.display(), "no config file, using defaults");
        return Ok(Config::default());
    }

    let text = std::fs::read_to_string(&candidate)
        .map_err(|e| Error::file_read("read config", candidate.clone(), e))?;
    let config: Config = serde_yaml::from_str(&text)?;
    tracing::debug!(path = %candidate.display(), "loaded config");
    Ok(config)
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
