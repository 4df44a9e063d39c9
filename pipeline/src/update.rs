//! Tracking comment updater.

use tracing::{info, instrument, warn};

use crate::core::comment::{FinalStatus, render_final_body};
use crate::core::types::Outcome;
use crate::error::PipelineError;
use crate::io::artifact::read_execution_details;
use crate::io::config::PipelineConfig;
use crate::io::provider::ScmProvider;

/// Final status to write into the tracking comment.
#[derive(Debug, Clone, Copy)]
pub struct CommentUpdate<'a> {
    pub comment_id: Option<u64>,
    pub outcome: Outcome,
    pub error: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No tracking comment exists; nothing to edit.
    Skipped,
    Updated,
    /// The API call failed; already logged.
    Failed,
}

/// Rewrite the tracking comment with the final status.
///
/// Without a comment id this is a successful no-op. Without a merge request
/// or issue iid there is nothing to address the edit to, which is a
/// configuration error. API failures are logged and reported as
/// [`UpdateOutcome::Failed`], never as `Err`.
#[instrument(skip_all, fields(comment_id = ?update.comment_id, outcome = ?update.outcome))]
pub fn update_tracking_comment(
    config: &PipelineConfig,
    provider: &dyn ScmProvider,
    update: &CommentUpdate<'_>,
) -> Result<UpdateOutcome, PipelineError> {
    let Some(comment_id) = update.comment_id else {
        info!("no tracking comment, skipping update");
        return Ok(UpdateOutcome::Skipped);
    };
    if config.resource().is_none() {
        return Err(PipelineError::configuration(
            "tracking comment update needs a merge request or issue iid",
        ));
    }

    let details = read_execution_details(&config.transcript_candidates());
    let status = FinalStatus {
        outcome: Some(update.outcome),
        job_url: config.job_url.as_deref(),
        error: update.error,
        details,
    };

    let edited = provider.get_comment(comment_id).and_then(|current| {
        let body = render_final_body(&current, &status);
        provider.update_comment(comment_id, &body)
    });
    match edited {
        Ok(()) => {
            info!("updated tracking comment");
            Ok(UpdateOutcome::Updated)
        }
        Err(err) => {
            let err = PipelineError::non_critical("update tracking comment", err);
            warn!(err = %err.chain_message(), "tracking comment not updated");
            Ok(UpdateOutcome::Failed)
        }
    }
}
