//! Conversational reply for runs that changed nothing.

use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::error::PipelineError;
use crate::io::artifact::load_transcript;
use crate::io::provider::ScmProvider;
use crate::io::templates::Templates;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Posted,
    /// The transcript was missing or held nothing worth posting.
    NoMessage,
    /// Rendering or posting failed; already logged.
    Failed,
}

/// Post the assistant's message as a comment. Never fails the job.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub fn post_response(
    provider: &dyn ScmProvider,
    templates: &Templates,
    candidates: &[PathBuf],
) -> ResponseOutcome {
    let Some(loaded) = load_transcript(candidates) else {
        warn!(
            err = %PipelineError::transient("no transcript to respond from"),
            "skipping response"
        );
        return ResponseOutcome::NoMessage;
    };
    let Some(message) = loaded.message() else {
        info!(path = %loaded.path.display(), "no message found in transcript");
        return ResponseOutcome::NoMessage;
    };
    info!(rule = ?message.rule, chars = message.text.len(), "extracted response");

    let posted = templates
        .response_comment(&message.text, loaded.execution_details())
        .and_then(|body| provider.create_comment(&body));
    match posted {
        Ok(()) => {
            info!("posted response comment");
            ResponseOutcome::Posted
        }
        Err(err) => {
            let err = PipelineError::non_critical("post response comment", err);
            warn!(err = %err.chain_message(), "response not posted");
            ResponseOutcome::Failed
        }
    }
}
