//! Step-wise orchestration of autonomous code-change runs.
//!
//! A run owns an ordered list of steps. Each call to
//! [`Orchestrator::advance`](engine::Orchestrator::advance) picks the earliest
//! unsettled step and drives it through planning, coding, validation,
//! commit and pull-request publication, emitting a lifecycle event per phase.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state machine, merge policy,
//!   work-order normalization, diff summaries). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, repositories, event sinks,
//!   git). Behind traits so tests can swap them.
//! - **[`agents`]**: Collaborator traits and reference implementations.
//!
//! [`engine`] and [`looping`] coordinate them; [`demo`] wires a complete
//! in-memory setup for the CLI.

pub mod agents;
pub mod core;
pub mod demo;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod model;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
