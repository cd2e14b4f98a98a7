//! tree_state - Tree mutation orchestration and persistence
//!
//! - `orchestrator` - TreeOrchestrator, the only entry point for tree changes
//! - `machine` - per-node activity tracking for in-flight completions
//! - `storage` - TreeRepository and its file/memory implementations
//! - `saver` - debounced, best-effort background saves

pub mod error;
pub mod machine;
pub mod orchestrator;
pub mod saver;
pub mod storage;

pub use error::{Result, StorageError};
pub use machine::{ActivityTracker, NodeActivity};
pub use orchestrator::{ActionOutcome, SkipReason, TreeOrchestrator};
pub use saver::{DebouncedSaver, SaveWarning};
pub use storage::{
    FileTreeRepository, MemoryTreeRepository, TreeRepository, TreeSummary, DEFAULT_TREE_NAME,
};
