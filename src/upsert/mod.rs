//! Batched insert-or-update with declared conflict handling.

pub mod batch;
pub mod engine;
pub mod policy;
mod statement;

pub use batch::Batch;
pub use engine::UpsertEngine;
pub use policy::{Assignment, ConflictAction, ConflictPolicy, UpdateExpr};
