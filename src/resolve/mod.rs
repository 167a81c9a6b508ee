//! Reference resolution
//!
//! Turns a loosely specified commit identifier (`blead`, `v5.10.1`, a short
//! hash) into a verified commit and the most meaningful symbolic name for
//! it. Candidates are tried strictly in order and the first hit wins.

mod backend;
mod patch_line;

#[cfg(test)]
pub(crate) mod scripted;

pub use backend::{BackendError, CommitMetadata, RefBackend};
pub use patch_line::{patch_line, PatchLine, PATCH_TIME_FORMAT};

use thiserror::Error;
use tracing::debug;

/// Branch patterns tried in priority order
pub const DEFAULT_BRANCH_CANDIDATES: &[&str] = &[
    "blead",
    "maint-5.10",
    "maint-5.8",
    "maint-5.8-dor",
    "maint-5.6",
    "maint-5.005",
    "maint-5.004",
    "refs/heads/*",
    "refs/remotes/*",
    "refs/*",
    "tags/*",
];

/// Remote whose refs are consulted
const REMOTE_PREFIX: &str = "remotes/origin/";

/// At most one of these is stripped, first match wins.
/// `refs/remotes` deliberately has no trailing slash.
const STRIP_PREFIXES: &[&str] = &["origin/", "refs/heads/", "refs/remotes", "refs/"];

/// `name-rev` suffix delimiters (`blead~2`, `v1.0^0`)
const SUFFIX_DELIMITERS: &[char] = &['~', '^'];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not resolve {id:?} to a commit")]
    UnresolvedReference { id: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Resolves identifiers against a [`RefBackend`].
pub struct RefResolver<B> {
    backend: B,
    candidates: Vec<String>,
}

impl<B: RefBackend> RefResolver<B> {
    /// Resolver using [`DEFAULT_BRANCH_CANDIDATES`].
    pub fn new(backend: B) -> Self {
        Self::with_candidates(backend, DEFAULT_BRANCH_CANDIDATES.iter().map(|c| c.to_string()))
    }

    pub fn with_candidates<I, S>(backend: B, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backend,
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Full commit hash for `id`.
    ///
    /// The remote-tracking name `remotes/origin/<id>` is preferred over
    /// `<id>` itself. A ref that fails to verify moves on to the next
    /// target; any other backend failure is returned as is.
    pub fn resolve_hash(&self, id: &str) -> Result<String, ResolveError> {
        if id.is_empty() || id.starts_with('-') {
            debug!(%id, "identifier is not a reference name");
            return Err(ResolveError::UnresolvedReference { id: id.to_string() });
        }
        for target in [format!("{REMOTE_PREFIX}{id}"), id.to_string()] {
            match self.backend.verify_ref(&target) {
                Ok(hash) => {
                    debug!(%id, %target, %hash, "verified reference");
                    return Ok(hash);
                }
                Err(e) if e.is_command_failure() => {
                    debug!(%target, error = %e, "reference does not verify");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ResolveError::UnresolvedReference { id: id.to_string() })
    }

    /// Normalized symbolic name for `hash`, or an empty string when no
    /// candidate names it.
    pub fn resolve_branch(&self, hash: &str) -> Result<String, ResolveError> {
        for candidate in &self.candidates {
            let pattern = format!("{REMOTE_PREFIX}{candidate}");
            if let Some(name) = self.backend.name_rev(hash, &pattern)? {
                debug!(%candidate, %name, "candidate matched");
                return Ok(normalize_branch_name(&name).to_string());
            }
        }
        debug!(%hash, "no candidate names commit");
        Ok(String::new())
    }
}

/// Strip one ref prefix and any `~N`/`^N` suffix from a `name-rev` answer.
///
/// A delimiter at position 0 is left in place.
pub fn normalize_branch_name(name: &str) -> &str {
    let mut name = STRIP_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name);

    for delimiter in SUFFIX_DELIMITERS {
        if let Some(pos) = name.find(*delimiter) {
            if pos > 0 {
                name = &name[..pos];
            }
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedBackend;
    use super::*;

    const HASH: &str = "e94431af0ada74486afd65207f3e0345fe7485fe";

    #[test]
    fn test_normalize_strips_heads_and_suffix() {
        assert_eq!(normalize_branch_name("refs/heads/blead~2"), "blead");
    }

    #[test]
    fn test_normalize_single_prefix() {
        assert_eq!(normalize_branch_name("origin/maint-5.10"), "maint-5.10");
        // only the first matching prefix is removed
        assert_eq!(normalize_branch_name("origin/refs/heads/x"), "refs/heads/x");
    }

    #[test]
    fn test_normalize_refs_remotes_without_slash() {
        assert_eq!(normalize_branch_name("refs/remotes/origin/blead"), "/origin/blead");
    }

    #[test]
    fn test_normalize_suffixes() {
        assert_eq!(normalize_branch_name("tags/v5.10.1^0"), "tags/v5.10.1");
        assert_eq!(normalize_branch_name("blead~3^2"), "blead");
        assert_eq!(normalize_branch_name("~weird"), "~weird");
        assert_eq!(normalize_branch_name("blead"), "blead");
        assert_eq!(normalize_branch_name(""), "");
    }

    #[test]
    fn test_resolve_hash_prefers_remote() {
        let backend = ScriptedBackend::new()
            .with_ref("remotes/origin/blead", HASH)
            .with_ref("blead", "0000000000000000000000000000000000000000");
        let resolver = RefResolver::new(&backend);

        assert_eq!(resolver.resolve_hash("blead").unwrap(), HASH);
        assert_eq!(backend.calls(), vec!["verify remotes/origin/blead"]);
    }

    #[test]
    fn test_resolve_hash_falls_back_to_bare_id() {
        let backend = ScriptedBackend::new().with_ref("v5.10.1", HASH);
        let resolver = RefResolver::new(&backend);

        assert_eq!(resolver.resolve_hash("v5.10.1").unwrap(), HASH);
    }

    #[test]
    fn test_resolve_hash_unresolved() {
        let backend = ScriptedBackend::new();
        let resolver = RefResolver::new(&backend);

        match resolver.resolve_hash("no-such-branch") {
            Err(ResolveError::UnresolvedReference { id }) => assert_eq!(id, "no-such-branch"),
            other => panic!("expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_hash_rejects_option_like_id() {
        let backend = ScriptedBackend::new().with_ref("--all", HASH);
        let resolver = RefResolver::new(&backend);

        for id in ["--all", "-h", ""] {
            match resolver.resolve_hash(id) {
                Err(ResolveError::UnresolvedReference { id: got }) => assert_eq!(got, id),
                other => panic!("expected UnresolvedReference, got {:?}", other),
            }
        }
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_resolve_hash_spawn_failure_is_backend_error() {
        let backend = ScriptedBackend::new().unavailable();
        let resolver = RefResolver::new(&backend);

        assert!(matches!(
            resolver.resolve_hash("blead"),
            Err(ResolveError::Backend(BackendError::Spawn { .. }))
        ));
    }

    #[test]
    fn test_resolve_branch_priority() {
        let backend = ScriptedBackend::new()
            .with_name("remotes/origin/maint-5.10", "maint-5.10")
            .with_name("remotes/origin/tags/*", "tags/v5.10.1");
        let resolver = RefResolver::new(&backend);

        assert_eq!(resolver.resolve_branch(HASH).unwrap(), "maint-5.10");
        // blead is asked first, then maint-5.10 wins and nothing later is asked
        assert_eq!(
            backend.calls(),
            vec![
                format!("name-rev {HASH} remotes/origin/blead"),
                format!("name-rev {HASH} remotes/origin/maint-5.10"),
            ]
        );
    }

    #[test]
    fn test_resolve_branch_none_matched() {
        let backend = ScriptedBackend::new();
        let resolver = RefResolver::new(&backend);

        assert_eq!(resolver.resolve_branch(HASH).unwrap(), "");
        assert_eq!(backend.calls().len(), DEFAULT_BRANCH_CANDIDATES.len());
    }

    #[test]
    fn test_custom_candidates() {
        let backend = ScriptedBackend::new().with_name("remotes/origin/release-*", "release-2~1");
        let resolver = RefResolver::with_candidates(&backend, ["release-*"]);

        assert_eq!(resolver.resolve_branch(HASH).unwrap(), "release-2");
    }
}
