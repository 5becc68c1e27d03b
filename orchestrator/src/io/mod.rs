//! Side-effecting adapters: configuration, persistence, events and VCS.

pub mod config;
pub mod events;
pub mod git;
pub mod memory;
pub mod pr_body;
pub mod store;
pub mod vcs;
