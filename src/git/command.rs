//! `git` binary invocations
//!
//! Every call runs with an explicit working directory; the process working
//! directory is never changed.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::resolve::BackendError;

/// Answer `git name-rev` prints when no ref matches
const NAME_REV_UNDEFINED: &str = "undefined";

/// Runs `git` inside one repository directory.
#[derive(Debug, Clone)]
pub struct GitCommand {
    program: PathBuf,
    dir: PathBuf,
}

impl GitCommand {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("git"),
            dir: dir.into(),
        }
    }

    /// Use a different `git` executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `git <args>` and return trimmed stdout.
    pub fn run(&self, args: &[&str]) -> Result<String, BackendError> {
        let joined = args.join(" ");
        debug!(dir = %self.dir.display(), args = %joined, "running git");

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.dir)
            .output()
            .map_err(|e| BackendError::Spawn {
                args: joined.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(BackendError::CommandFailed {
                args: joined,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `git rev-parse --verify <name>^{commit}`
    ///
    /// `name` always follows `--end-of-options`, so it is never read as a flag.
    pub fn rev_parse_commit(&self, name: &str) -> Result<String, BackendError> {
        let target = format!("{name}^{{commit}}");
        let hash = self.run(&["rev-parse", "--verify", "--quiet", "--end-of-options", &target])?;
        if !is_full_hash(&hash) {
            return Err(BackendError::Malformed {
                args: format!("rev-parse --verify {target}"),
                output: hash,
            });
        }
        Ok(hash)
    }

    /// `git name-rev --name-only --refs=<pattern> <hash>`
    pub fn name_rev(&self, hash: &str, pattern: &str) -> Result<Option<String>, BackendError> {
        let refs = format!("--refs={pattern}");
        let name = self.run(&["name-rev", "--name-only", &refs, hash])?;
        Ok(parse_name_rev(&name))
    }

    /// `git describe <hash>`
    pub fn describe(&self, hash: &str) -> Result<String, BackendError> {
        self.run(&["describe", hash])
    }
}

fn parse_name_rev(output: &str) -> Option<String> {
    match output.trim() {
        "" | NAME_REV_UNDEFINED => None,
        name => Some(name.to_string()),
    }
}

fn is_full_hash(s: &str) -> bool {
    matches!(s.len(), 40 | 64) && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_name_rev() {
        assert_eq!(parse_name_rev("undefined"), None);
        assert_eq!(parse_name_rev("\n"), None);
        assert_eq!(
            parse_name_rev("remotes/origin/blead~2\n"),
            Some("remotes/origin/blead~2".to_string())
        );
    }

    #[test]
    fn test_is_full_hash() {
        assert!(is_full_hash("e94431af0ada74486afd65207f3e0345fe7485fe"));
        assert!(!is_full_hash("e94431af0a"));
        assert!(!is_full_hash("z94431af0ada74486afd65207f3e0345fe7485fe"));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let git = GitCommand::new(dir.path()).with_program("/nonexistent/git-binary");

        assert!(matches!(
            git.run(&["status"]),
            Err(BackendError::Spawn { .. })
        ));
    }

    #[test]
    fn test_non_repository_is_command_failure() {
        let dir = TempDir::new().unwrap();
        let git = GitCommand::new(dir.path());

        match git.rev_parse_commit("HEAD") {
            Err(e) => assert!(e.is_command_failure() || matches!(e, BackendError::Spawn { .. })),
            Ok(hash) => panic!("unexpected hash {hash}"),
        }
    }
}
