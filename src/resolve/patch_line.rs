//! Provenance line written to `.patch`

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;

use super::{RefBackend, RefResolver, ResolveError};

/// Committer time layout, always rendered in UTC
pub const PATCH_TIME_FORMAT: &str = "%Y-%m-%d.%H:%M:%S";

/// `<branch> <committer time> <hash> <describe>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLine {
    /// Empty when no candidate named the commit
    pub branch: String,
    pub committer_time: DateTime<Utc>,
    pub hash: String,
    pub describe: String,
}

impl fmt::Display for PatchLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.branch,
            self.committer_time.format(PATCH_TIME_FORMAT),
            self.hash,
            self.describe
        )
    }
}

impl<B: RefBackend> RefResolver<B> {
    /// Resolve `id` and collect everything the patch line needs.
    pub fn patch_line(&self, id: &str) -> Result<PatchLine, ResolveError> {
        let hash = self.resolve_hash(id)?;
        let branch = self.resolve_branch(&hash)?;
        let describe = self.backend().describe(&hash)?;
        let commit = self.backend().commit_metadata(&hash)?;

        let line = PatchLine {
            branch,
            committer_time: commit.committer_time,
            hash,
            describe,
        };
        info!(patch = %line, "computed patch line");
        Ok(line)
    }
}

/// Patch line for `id` using the given branch candidates.
pub fn patch_line<B, I, S>(backend: B, id: &str, candidates: I) -> Result<PatchLine, ResolveError>
where
    B: RefBackend,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    RefResolver::with_candidates(backend, candidates).patch_line(id)
}

#[cfg(test)]
mod tests {
    use super::super::scripted::ScriptedBackend;
    use super::super::{BackendError, DEFAULT_BRANCH_CANDIDATES};
    use super::*;

    const HASH: &str = "e94431af0ada74486afd65207f3e0345fe7485fe";

    fn maint_backend() -> ScriptedBackend {
        ScriptedBackend::new()
            .with_ref("remotes/origin/maint-5.10", HASH)
            .with_name("remotes/origin/maint-5.10", "maint-5.10")
            .with_describe(HASH, "v5.10.1-6-ge94431af0a")
            .with_commit(
                HASH,
                DateTime::<Utc>::from_timestamp(1_362_696_697, 0).unwrap(),
            )
    }

    #[test]
    fn test_maint_line() {
        let backend = maint_backend();
        let line = patch_line(&backend, "maint-5.10", DEFAULT_BRANCH_CANDIDATES.iter().copied()).unwrap();

        assert_eq!(
            line.to_string(),
            "maint-5.10 2013-03-07.22:51:37 e94431af0ada74486afd65207f3e0345fe7485fe v5.10.1-6-ge94431af0a"
        );
    }

    #[test]
    fn test_blank_branch_keeps_separator() {
        let backend = ScriptedBackend::new()
            .with_ref("deadbeef", HASH)
            .with_describe(HASH, "v5.10.1-6-ge94431af0a")
            .with_commit(HASH, DateTime::<Utc>::from_timestamp(0, 0).unwrap());
        let line = RefResolver::new(&backend).patch_line("deadbeef").unwrap();

        assert_eq!(line.branch, "");
        assert_eq!(
            line.to_string(),
            format!(" 1970-01-01.00:00:00 {HASH} v5.10.1-6-ge94431af0a")
        );
    }

    #[test]
    fn test_branch_suffix_normalized() {
        let backend = maint_backend().with_name("remotes/origin/blead", "refs/heads/blead~2");
        let line = RefResolver::new(&backend).patch_line("maint-5.10").unwrap();

        assert_eq!(line.branch, "blead");
    }

    #[test]
    fn test_describe_failure_propagates() {
        let backend = ScriptedBackend::new()
            .with_ref("remotes/origin/blead", HASH)
            .with_commit(HASH, DateTime::<Utc>::from_timestamp(0, 0).unwrap());

        assert!(matches!(
            RefResolver::new(&backend).patch_line("blead"),
            Err(ResolveError::Backend(BackendError::CommandFailed { .. }))
        ));
    }

    #[test]
    fn test_unresolved_identifier() {
        let backend = maint_backend();

        match RefResolver::new(&backend).patch_line("no-such-ref") {
            Err(ResolveError::UnresolvedReference { id }) => assert_eq!(id, "no-such-ref"),
            other => panic!("expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn test_no_trailing_newline() {
        let line = RefResolver::new(maint_backend()).patch_line("maint-5.10").unwrap();
        assert!(!line.to_string().ends_with('\n'));
    }
}
