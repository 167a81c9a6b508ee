//! Git repository backend
//!
//! - [`GitMirror`]: bare clone management and commit checkout via `git2`
//! - [`GitCommand`]: `git` binary calls for `rev-parse`, `name-rev` and
//!   `describe`, each with an explicit working directory

mod checkout;
mod command;
mod mirror;

pub use checkout::{checkout_commit, CheckoutStats};
pub use command::GitCommand;
pub use mirror::{GitMirror, REMOTE_NAME};
