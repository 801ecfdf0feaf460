//! Optimistic sync core: per-field state, reconciliation and mutations

pub mod engine;
pub mod field;
pub mod mutations;
