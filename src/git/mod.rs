//! Git operations: a thin CLI wrapper (`GitCli`) and the worktree
//! manager built on top of it, used by the `worktree` work-dir mode.
//!
//! - Isolated worktrees per agent for parallel development
//! - Global per-path locking to prevent worktree-creation races
//! - Comprehensive cleanup on agent destroy

pub mod cli;
pub mod worktree;

pub use cli::GitCli;
pub use worktree::{WorktreeInfo, WorktreeManager};
