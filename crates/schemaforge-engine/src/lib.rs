//! SchemaForge engine - schema evolution logic
//!
//! This crate handles:
//! - JSON Patch documents: applying them atomically and generating them
//! - Entity-scoped diffs between two schema snapshots
//! - Layered override documents merged onto a base schema

pub mod diff;
pub mod overrides;
pub mod patch;

pub use diff::{
    build_schema_diff, build_schema_diff_with_operations, change_status, ChangeStatus, DiffItem,
};
pub use overrides::{
    apply_overrides, ImplementationRequest, MergeOutcome, OverrideError, RequestStatus,
    SchemaOverride,
};
pub use patch::{apply_patch, compare, operations_from_value, parse_patch, Operation, PatchError};
