//! Deterministic, pure logic shared by the pipeline phases.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod branch_name;
pub mod comment;
pub mod noise;
pub mod state;
pub mod submission;
pub mod transcript;
pub mod types;
