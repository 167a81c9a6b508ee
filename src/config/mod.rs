//! Configuration merge system
//!
//! Three layers, later ones winning:
//! 1. Built-in defaults
//! 2. TOML config file (`--config`)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    ArchiveConfig, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, GitTarConfig,
    RepoConfig, ResolveConfig,
};
pub use merge::{deep_merge, merge_layers};
