//! Phase orchestrator: Prepare, Execute, then always Update.
//!
//! The orchestrator owns the [`PipelineState`] machine and the single
//! emergency update attempt made when an eager error escapes a phase.

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::core::state::PipelineState;
use crate::core::types::{Outcome, PhaseResult};
use crate::error::PipelineError;
use crate::execute::{Assistant, ExecutePhase, ExecuteReport};
use crate::exit_codes;
use crate::io::command::CommandRunner;
use crate::io::config::PipelineConfig;
use crate::io::handoff::read_comment_id;
use crate::io::provider::ScmProvider;
use crate::io::templates::Templates;
use crate::prepare::{PrepareOutcome, Preparer};
use crate::update::{CommentUpdate, UpdateOutcome, update_tracking_comment};

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub state: PipelineState,
    pub prepare: Option<PhaseResult>,
    pub execute: Option<ExecuteReport>,
    pub update: Option<UpdateOutcome>,
    /// Message of an eager error that escaped a phase.
    pub fatal: Option<String>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            state: PipelineState::Init,
            prepare: None,
            execute: None,
            update: None,
            fatal: None,
        }
    }

    /// Exit code for the job: only prepare and execute health count.
    pub fn exit_code(&self) -> i32 {
        if self.state == PipelineState::Aborted {
            return exit_codes::OK;
        }
        let prepare_ok = self.prepare.as_ref().is_some_and(|p| p.success);
        let execute_ok = self.execute.as_ref().is_some_and(|e| e.result.success);
        if self.fatal.is_none() && prepare_ok && execute_ok {
            exit_codes::OK
        } else {
            exit_codes::EXECUTION_FAILED
        }
    }

    fn advance(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(next) {
            error!(from = %self.state, to = %next, "illegal pipeline state transition");
        }
        info!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }
}

/// Everything one run needs, borrowed from `main` (or a test).
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    runner: &'a dyn CommandRunner,
    preparer: &'a dyn Preparer,
    assistant: &'a dyn Assistant,
    provider: &'a dyn ScmProvider,
    templates: Templates,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        runner: &'a dyn CommandRunner,
        preparer: &'a dyn Preparer,
        assistant: &'a dyn Assistant,
        provider: &'a dyn ScmProvider,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            runner,
            preparer,
            assistant,
            provider,
            templates: Templates::new()?,
            clock: Utc::now,
        })
    }

    /// Replace the clock used for branch timestamps.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    #[instrument(skip_all)]
    pub fn run(&self) -> RunReport {
        let mut report = RunReport::new();

        let prepared = match self.preparer.prepare(self.config) {
            Ok(PrepareOutcome::NotTriggered) => {
                report.advance(PipelineState::Aborted);
                return report;
            }
            Ok(PrepareOutcome::Ready(result)) => result,
            Err(err) => {
                let comment_id =
                    read_comment_id(&self.config.comment_id_path()).or(self.config.comment_id);
                self.emergency_update(&mut report, comment_id, &err);
                return report;
            }
        };
        report.prepare = Some(prepared.clone());

        if !prepared.success {
            warn!(
                err = prepared.error.as_deref().unwrap_or_default(),
                "prepare failed, skipping execute"
            );
            self.update(
                &mut report,
                &CommentUpdate {
                    comment_id: prepared.comment_id,
                    outcome: Outcome::Failure,
                    error: prepared.error.as_deref(),
                },
            );
            return report;
        }
        report.advance(PipelineState::Prepared);

        let phase = ExecutePhase {
            config: self.config,
            runner: self.runner,
            assistant: self.assistant,
            provider: self.provider,
            templates: &self.templates,
            now: (self.clock)(),
        };
        let executed = match phase.run(&prepared) {
            Ok(executed) => executed,
            Err(err) => {
                self.emergency_update(&mut report, prepared.comment_id, &err);
                return report;
            }
        };
        report.advance(PipelineState::Executed);
        report.execute = Some(executed.clone());

        let result = &executed.result;
        self.update(
            &mut report,
            &CommentUpdate {
                comment_id: result.comment_id,
                outcome: Outcome::from_success(result.success),
                error: result.error.as_deref(),
            },
        );
        report
    }

    /// Update phase. Its failures never change the exit code.
    fn update(&self, report: &mut RunReport, update: &CommentUpdate<'_>) {
        match update_tracking_comment(self.config, self.provider, update) {
            Ok(outcome) => report.update = Some(outcome),
            Err(err) => {
                error!(err = %err.chain_message(), "tracking comment update failed");
                report.update = Some(UpdateOutcome::Failed);
            }
        }
        report.advance(PipelineState::Updated);
        report.advance(PipelineState::Done);
    }

    /// One best-effort update after an eager error; a second failure is swallowed.
    fn emergency_update(&self, report: &mut RunReport, comment_id: Option<u64>, err: &PipelineError) {
        let message = err.chain_message();
        error!(err = %message, "fatal pipeline error");
        report.fatal = Some(message.clone());
        self.update(
            report,
            &CommentUpdate {
                comment_id,
                outcome: Outcome::Failure,
                error: Some(&message),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::ExecutionPath;
    use crate::respond::ResponseOutcome;
    use crate::test_support::{
        RecordingProvider, ScriptedAssistant, ScriptedRunner, StaticPreparer, config_for,
    };

    #[test]
    fn not_triggered_exits_cleanly_without_update() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_for(temp.path(), temp.path());
        let runner = ScriptedRunner::default();
        let preparer = StaticPreparer::not_triggered();
        let assistant = ScriptedAssistant::succeeding();
        let provider = RecordingProvider::default();

        let report = Pipeline::new(&config, &runner, &preparer, &assistant, &provider)
            .expect("pipeline")
            .run();
        assert_eq!(report.state, PipelineState::Aborted);
        assert_eq!(report.exit_code(), exit_codes::OK);
        assert_eq!(assistant.runs(), 0);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn failed_prepare_skips_execute_but_updates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_for(temp.path(), temp.path());
        let runner = ScriptedRunner::default();
        let preparer = StaticPreparer::ready(PhaseResult::failed(Some(9), "no token"));
        let assistant = ScriptedAssistant::succeeding();
        let provider = RecordingProvider::default().with_comment(9, "🔄 Working on it…");

        let report = Pipeline::new(&config, &runner, &preparer, &assistant, &provider)
            .expect("pipeline")
            .run();
        assert_eq!(report.state, PipelineState::Done);
        assert_eq!(report.update, Some(UpdateOutcome::Updated));
        assert_eq!(report.exit_code(), exit_codes::EXECUTION_FAILED);
        assert_eq!(assistant.runs(), 0);
        assert!(provider.comment_body(9).expect("body").contains("no token"));
    }

    #[test]
    fn eager_error_triggers_single_emergency_update() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("does-not-exist");
        let config = config_for(&missing, temp.path());
        let runner = ScriptedRunner::default();
        let preparer = StaticPreparer::ready(PhaseResult::succeeded(Some(4)));
        let assistant = ScriptedAssistant::succeeding();
        let provider = RecordingProvider::default().with_comment(4, "🔄 Working on it…");

        let report = Pipeline::new(&config, &runner, &preparer, &assistant, &provider)
            .expect("pipeline")
            .run();
        assert_eq!(report.state, PipelineState::Done);
        assert!(report.fatal.as_deref().unwrap_or_default().contains("does not exist"));
        assert_eq!(report.exit_code(), exit_codes::EXECUTION_FAILED);
        assert_eq!(provider.updates(), 1);
        assert!(provider.comment_body(4).expect("body").starts_with("❌ Failed"));
        assert!(report.execute.is_none());
        assert_eq!(assistant.runs(), 0);
    }

    #[test]
    fn eager_error_without_comment_skips_update() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_for(&temp.path().join("gone"), temp.path());
        let runner = ScriptedRunner::default();
        let preparer = StaticPreparer::ready(PhaseResult::succeeded(None));
        let assistant = ScriptedAssistant::succeeding();
        let provider = RecordingProvider::default();

        let report = Pipeline::new(&config, &runner, &preparer, &assistant, &provider)
            .expect("pipeline")
            .run();
        assert_eq!(report.state, PipelineState::Done);
        assert_eq!(report.update, Some(UpdateOutcome::Skipped));
        assert_eq!(report.exit_code(), exit_codes::EXECUTION_FAILED);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn exit_code_ignores_update_health() {
        let mut report = RunReport::new();
        report.state = PipelineState::Done;
        report.prepare = Some(PhaseResult::succeeded(Some(1)));
        report.execute = Some(ExecuteReport {
            result: PhaseResult::succeeded(Some(1)),
            path: ExecutionPath::Responded(ResponseOutcome::Posted),
        });
        report.update = Some(UpdateOutcome::Failed);
        assert_eq!(report.exit_code(), exit_codes::OK);
    }
}
