//! Local git inspection for change detection
//!
//! Opens a repository on disk with `git2`, resolves branch heads and diffs
//! two commits into the same [`ChangeRecord`](crate::types::ChangeRecord)
//! list the remote API produces.

mod repository;

pub use repository::LocalGit;
