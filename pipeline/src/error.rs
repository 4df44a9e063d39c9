//! Typed error taxonomy for the pipeline.
//!
//! Every failure the pipeline can observe falls into one of five kinds. The
//! kind decides its [`Severity`], and severity alone decides whether a phase
//! aborts:
//!
//! - `Configuration` and `ContextMismatch` abort eagerly and escape the phase.
//! - `Submission` is caught at the submitter boundary and fails the phase.
//! - `TransientArtifact` and `NonCritical` are logged and folded away.

use thiserror::Error;

/// How an error affects the phase that observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the current phase.
    Fatal,
    /// Degrades output (e.g. no execution details) but the phase continues.
    Recoverable,
    /// Logged only; the caller sees a successful no-op.
    Informational,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required identifier, token or setting is absent or malformed.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The working tree is not the repository or branch we expected.
    #[error("context mismatch: expected {expected}, found {actual}")]
    ContextMismatch { expected: String, actual: String },

    /// The assistant transcript is missing or unreadable.
    #[error("output artifact unavailable: {message}")]
    TransientArtifact { message: String },

    /// git or push failure while proposing a change.
    #[error("submission failed: {message}")]
    Submission {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Comment update or response posting failure.
    #[error("non-critical failure: {message}")]
    NonCritical {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn context_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ContextMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientArtifact {
            message: message.into(),
        }
    }

    /// Wrap an adapter error as a submission failure, keeping the chain.
    pub fn submission(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Submission {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn non_critical(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::NonCritical {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Configuration { .. } | Self::ContextMismatch { .. } | Self::Submission { .. } => {
                Severity::Fatal
            }
            Self::TransientArtifact { .. } => Severity::Recoverable,
            Self::NonCritical { .. } => Severity::Informational,
        }
    }

    /// True for the kinds that must escape a phase instead of being folded
    /// into its [`PhaseResult`](crate::core::types::PhaseResult).
    pub fn aborts_eagerly(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::ContextMismatch { .. }
        )
    }

    /// Render the error with its full source chain on one line.
    pub fn chain_message(&self) -> String {
        let mut msg = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            msg.push_str(": ");
            msg.push_str(&cause.to_string());
            source = std::error::Error::source(cause);
        }
        msg
    }
}
