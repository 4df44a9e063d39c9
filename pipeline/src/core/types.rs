//! Shared deterministic types for the pipeline core.
//!
//! These types carry state between phases. They hold no handles to external
//! resources and never touch the filesystem.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PipelineError, Severity};

/// Record produced by every phase.
///
/// Later phases start from the previous record so the tracking comment id is
/// forwarded unchanged, even through failures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhaseResult {
    pub success: bool,
    pub error: Option<String>,
    /// Opaque id of the tracking comment/note.
    pub comment_id: Option<u64>,
    /// Transcript written by the assistant, when one was found.
    pub output_file: Option<PathBuf>,
}

impl PhaseResult {
    pub fn succeeded(comment_id: Option<u64>) -> Self {
        Self {
            success: true,
            error: None,
            comment_id,
            output_file: None,
        }
    }

    pub fn failed(comment_id: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            comment_id,
            output_file: None,
        }
    }

    /// Start the next phase's record, forwarding the comment id and transcript path.
    pub fn carry_forward(&self) -> Self {
        Self {
            success: true,
            error: None,
            comment_id: self.comment_id,
            output_file: self.output_file.clone(),
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.error = Some(error.into());
    }

    /// Fold an error into this record.
    ///
    /// Only fatal errors mark the phase failed; the rest are logged.
    pub fn record(&mut self, err: &PipelineError) {
        match err.severity() {
            Severity::Fatal => self.fail(err.chain_message()),
            Severity::Recoverable | Severity::Informational => {
                warn!(err = %err.chain_message(), "continuing after non-fatal error");
            }
        }
    }
}

/// Cost and timing reported by the assistant's final `result` record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<f64>,
}

impl ExecutionDetails {
    pub fn is_empty(&self) -> bool {
        self.cost_usd.is_none() && self.duration_ms.is_none()
    }
}

/// Kind of resource that triggered the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Issue,
    MergeRequest,
}

impl ResourceKind {
    /// Short slug used in generated branch names.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::MergeRequest => "mr",
        }
    }
}

/// The issue or merge/patch request the job is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub iid: u64,
}

impl ResourceRef {
    /// Prefer the merge request id, fall back to the issue id.
    pub fn resolve(mr_iid: Option<u64>, issue_iid: Option<u64>) -> Option<Self> {
        match (mr_iid, issue_iid) {
            (Some(iid), _) => Some(Self {
                kind: ResourceKind::MergeRequest,
                iid,
            }),
            (None, Some(iid)) => Some(Self {
                kind: ResourceKind::Issue,
                iid,
            }),
            (None, None) => None,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::Issue => write!(f, "#{}", self.iid),
            ResourceKind::MergeRequest => write!(f, "!{}", self.iid),
        }
    }
}

/// Final outcome reported on the tracking comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }
}
