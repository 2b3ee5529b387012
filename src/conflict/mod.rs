//! Two-stage conflict resolution.
//!
//! Stage 1 picks a repository-level strategy (smart merge, keep local, keep
//! remote). Files a smart merge cannot settle go to Stage 2, which resolves
//! them one at a time. Both stages back up before they write and mark their
//! commits so later runs can recognize them.

mod analysis;
mod markers;
mod stage1;
mod stage2;

pub use analysis::{analyze, ConflictAnalysis, ConflictType};
pub use markers::{
    contains_conflict_markers, is_binary, is_resolution_message, last_commit_is_resolution,
    FILE_RESOLUTION_MARKER, KEEP_LOCAL_MARKER, KEEP_REMOTE_MARKER, RESOLUTION_MARKERS,
    SMART_MERGE_MARKER,
};
pub use stage1::{RepositoryResolver, ResolutionResult, Strategy};
pub use stage2::{FileResolutionEngine, FileResolutionState, FileStatus, FileStrategy, Stage2Outcome};
