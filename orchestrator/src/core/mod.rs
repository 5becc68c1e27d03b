//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod branch;
pub mod diff;
pub mod events;
pub mod lifecycle;
pub mod merge_policy;
pub mod selector;
pub mod state;
pub mod work_order;
