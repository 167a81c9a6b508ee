//! Effective configuration with provenance
//!
//! Layers are merged as JSON values, validated, then deserialized into
//! [`GitTarConfig`]. Each contributing layer is recorded as a
//! [`ConfigSource`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoConfig {
    /// Upstream repository URL or path
    pub url: String,

    /// Bare clone location; a temporary directory when unset
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub base_dir: String,
    pub output: PathBuf,
    pub patch_file: String,
    pub commit: String,
    pub fetch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolveConfig {
    pub branch_candidates: Vec<String>,
}

/// Typed, validated configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitTarConfig {
    pub repo: RepoConfig,
    pub archive: ArchiveConfig,
    pub resolve: ResolveConfig,
}

impl GitTarConfig {
    /// Built-in defaults for everything but the repository URL.
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let cli = serde_json::json!({"repo": {"url": url.into()}});
        Ok(EffectiveConfig::build(None, Some(cli))?.config)
    }
}

/// Merged configuration together with the sources it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub config: GitTarConfig,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge built-in defaults, an optional TOML file and CLI overrides.
    pub fn build(file: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = file {
            let (value, digest) = load_toml_file(path)?;
            debug!(path = %path.display(), %digest, "loaded config file");
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.display().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let config: GitTarConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::Parse(format!("invalid configuration: {e}")))?;
        validate(&config)?;

        Ok(Self { config, sources })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Parse a TOML file, returning it as JSON plus the digest of its bytes.
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::Parse(format!("{}: invalid UTF-8: {e}", path.display())))?;
    let value: Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;

    Ok((value, digest))
}

fn validate(config: &GitTarConfig) -> Result<(), ConfigError> {
    if config.repo.url.trim().is_empty() {
        return Err(ConfigError::Validation("repo.url is required".to_string()));
    }

    let base_dir = Path::new(&config.archive.base_dir);
    if base_dir.is_absolute() || base_dir.components().any(|c| c == Component::ParentDir) {
        return Err(ConfigError::Validation(format!(
            "archive.base_dir must be a relative path without '..': {:?}",
            config.archive.base_dir
        )));
    }

    let patch_file = &config.archive.patch_file;
    if patch_file.is_empty() || patch_file.contains('/') || patch_file == "." || patch_file == ".." {
        return Err(ConfigError::Validation(format!(
            "archive.patch_file must be a single file name: {patch_file:?}"
        )));
    }

    if config.archive.commit.trim().is_empty() {
        return Err(ConfigError::Validation("archive.commit must not be empty".to_string()));
    }

    if config.resolve.branch_candidates.is_empty() {
        return Err(ConfigError::Validation(
            "resolve.branch_candidates must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
