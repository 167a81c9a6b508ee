//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

use crate::resolve::DEFAULT_BRANCH_CANDIDATES;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Directory every archive entry is placed under (default: "perl")
    pub base_dir: String,

    /// Archive path (default: "perl.tar")
    pub output: String,

    /// Provenance file written at the tree root (default: ".patch")
    pub patch_file: String,

    /// Commit identifier to archive (default: "HEAD")
    pub commit: String,

    /// Fetch before resolving an existing clone (default: true)
    pub fetch: bool,

    pub branch_candidates: Vec<String>,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            base_dir: "perl".to_string(),
            output: "perl.tar".to_string(),
            patch_file: ".patch".to_string(),
            commit: "HEAD".to_string(),
            fetch: true,
            branch_candidates: DEFAULT_BRANCH_CANDIDATES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "repo": {
                "url": "",
                "directory": null
            },
            "archive": {
                "base_dir": self.base_dir,
                "output": self.output,
                "patch_file": self.patch_file,
                "commit": self.commit,
                "fetch": self.fetch
            },
            "resolve": {
                "branch_candidates": self.branch_candidates
            }
        })
    }
}
