//! Side-effecting adapters: processes, git, files, HTTP, configuration.

pub mod artifact;
pub mod command;
pub mod config;
pub mod git;
pub mod handoff;
pub mod provider;
pub mod templates;
