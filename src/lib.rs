//! git-tar - reproducible tarballs of git commits
//!
//! Clones or updates a bare mirror, resolves a commit identifier to a
//! provenance line (`<branch> <committer time> <hash> <describe>`), checks
//! the commit out into memory with that line in `.patch`, and writes a
//! deterministic tar archive annotated with the commit hash.

pub mod config;
pub mod git;
pub mod pipeline;
pub mod resolve;

pub use config::{ConfigError, EffectiveConfig, GitTarConfig};
pub use git::{GitCommand, GitMirror};
pub use pipeline::{run_archive, ArchiveSummary, PipelineError};
pub use resolve::{normalize_branch_name, patch_line, PatchLine, RefBackend, RefResolver, ResolveError};
