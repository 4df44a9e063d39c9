//! CI coding-assistant pipeline.
//!
//! One job runs three phases in order: Prepare (trigger detection and the
//! tracking comment), Execute (branch, assistant run, then either submit a
//! patch or reply with a comment) and Update (rewrite the tracking comment
//! with the outcome). The crate keeps the usual split:
//!
//! - **[`core`]**: Pure, deterministic logic (transcripts, noise rules,
//!   branch names, comment bodies, the state machine). No I/O.
//! - **[`io`]**: Side-effecting adapters (processes, git, files, SCM REST
//!   APIs, configuration). Isolated behind traits so tests can fake them.
//!
//! Phase modules ([`prepare`], [`branch`], [`classify`], [`submit`],
//! [`respond`], [`update`], [`execute`]) combine the two, and
//! [`orchestrator`] sequences them.

pub mod branch;
pub mod classify;
pub mod core;
pub mod error;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod prepare;
pub mod respond;
pub mod submit;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod update;
