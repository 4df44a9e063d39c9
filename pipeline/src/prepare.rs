//! Prepare phase: trigger detection and tracking-comment creation.
//!
//! The heavy lifting (checking the trigger phrase, posting the in-progress
//! comment, writing the prompt) belongs to an external command. This module
//! runs it and reads back what it left behind.

use tracing::{debug, info, instrument, warn};

use crate::core::types::PhaseResult;
use crate::error::PipelineError;
use crate::io::command::{CommandRequest, CommandRunner};
use crate::io::config::PipelineConfig;
use crate::io::handoff::read_comment_id;

/// Stdout line a prepare command prints when the job was not triggered.
pub const NOT_TRIGGERED_LINE: &str = "contains_trigger=false";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// No trigger; the pipeline stops cleanly.
    NotTriggered,
    Ready(PhaseResult),
}

pub trait Preparer {
    fn prepare(&self, config: &PipelineConfig) -> Result<PrepareOutcome, PipelineError>;
}

/// Runs the configured prepare command, if any.
///
/// Without a command the job is taken as triggered upstream and the comment
/// id comes from the handoff file or the configuration.
pub struct CommandPreparer<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> CommandPreparer<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl Preparer for CommandPreparer<'_> {
    #[instrument(skip_all)]
    fn prepare(&self, config: &PipelineConfig) -> Result<PrepareOutcome, PipelineError> {
        let handoff = config.comment_id_path();
        let comment_id = || read_comment_id(&handoff).or(config.comment_id);

        if config.prepare_command.is_empty() {
            debug!("no prepare command configured");
            return Ok(PrepareOutcome::Ready(PhaseResult::succeeded(comment_id())));
        }

        let request = CommandRequest::from_argv(&config.prepare_command, &config.project_dir)
            .map_err(|err| PipelineError::configuration(format!("{err:#}")))?
            .env("PIPELINE_COMMENT_ID_FILE", handoff.display().to_string())
            .env("PIPELINE_PROMPT_FILE", config.prompt_file.display().to_string());
        info!(command = %request.display(), "running prepare command");

        let output = match self.runner.run(&request) {
            Ok(output) => output,
            Err(err) => {
                return Ok(PrepareOutcome::Ready(PhaseResult::failed(
                    comment_id(),
                    format!("prepare command could not start: {err:#}"),
                )));
            }
        };

        if output
            .stdout
            .lines()
            .any(|line| line.trim() == NOT_TRIGGERED_LINE)
        {
            info!("no trigger detected");
            return Ok(PrepareOutcome::NotTriggered);
        }

        let comment_id = comment_id();
        if !output.success() {
            warn!(exit_code = ?output.exit_code, "prepare command failed");
            return Ok(PrepareOutcome::Ready(PhaseResult::failed(
                comment_id,
                format!(
                    "prepare command exited with {}: {}",
                    describe_exit(output.exit_code),
                    output.stderr.trim()
                ),
            )));
        }

        info!(comment_id = ?comment_id, "prepare complete");
        Ok(PrepareOutcome::Ready(PhaseResult::succeeded(comment_id)))
    }
}

pub(crate) fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}
