//! Execute phase: branch, assistant run, then submit or respond.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::branch::reconcile_branch;
use crate::classify::classify;
use crate::core::types::PhaseResult;
use crate::error::PipelineError;
use crate::io::artifact::{ArtifactLookup, locate};
use crate::io::command::{CommandOutput, CommandRequest, CommandRunner};
use crate::io::config::PipelineConfig;
use crate::io::git::Git;
use crate::io::provider::ScmProvider;
use crate::io::templates::Templates;
use crate::prepare::describe_exit;
use crate::respond::{ResponseOutcome, post_response};
use crate::submit::{SubmitOutcome, Submitter};

/// Stderr kept in the phase error when the assistant fails.
const STDERR_TAIL_LINES: usize = 20;

/// Parameters for one assistant invocation.
#[derive(Debug, Clone)]
pub struct AssistantRequest {
    /// argv; `command[0]` is the program.
    pub command: Vec<String>,
    pub workdir: PathBuf,
    /// Prompt fed on stdin when the file exists.
    pub prompt_file: PathBuf,
    /// Where the stream-json transcript should end up.
    pub transcript_path: PathBuf,
}

/// Abstraction over the coding assistant backend.
pub trait Assistant {
    /// Run to completion. A non-zero exit is reported in the output, not as `Err`.
    fn run(&self, request: &AssistantRequest) -> Result<CommandOutput>;
}

/// Assistant spawned as a child process through a [`CommandRunner`].
pub struct ProcessAssistant<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ProcessAssistant<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl Assistant for ProcessAssistant<'_> {
    #[instrument(skip_all, fields(program = request.command.first().map(String::as_str)))]
    fn run(&self, request: &AssistantRequest) -> Result<CommandOutput> {
        let mut command = CommandRequest::from_argv(&request.command, &request.workdir)?.env(
            "PIPELINE_OUTPUT_FILE",
            request.transcript_path.display().to_string(),
        );
        match fs::read_to_string(&request.prompt_file) {
            Ok(prompt) => command = command.stdin(prompt),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(path = %request.prompt_file.display(), "prompt file missing, running without stdin");
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read prompt {}", request.prompt_file.display()));
            }
        }

        info!(command = %command.display(), "starting assistant");
        let output = self.runner.run(&command)?;
        info!(exit_code = ?output.exit_code, "assistant finished");

        if !output.stdout.trim().is_empty() && !has_content(&request.transcript_path) {
            if let Some(parent) = request.transcript_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&request.transcript_path, &output.stdout).with_context(|| {
                format!("write transcript {}", request.transcript_path.display())
            })?;
            debug!(path = %request.transcript_path.display(), "captured assistant stdout");
        }
        Ok(output)
    }
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.len() > 0)
}

/// Which branch the execute phase took after the assistant succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPath {
    /// The assistant failed; nothing was classified.
    AssistantFailed,
    Submitted(SubmitOutcome),
    Responded(ResponseOutcome),
    /// Classification or submission failed; see the phase error.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteReport {
    pub result: PhaseResult,
    pub path: ExecutionPath,
}

/// Collaborators for the execute phase.
pub struct ExecutePhase<'a> {
    pub config: &'a PipelineConfig,
    pub runner: &'a dyn CommandRunner,
    pub assistant: &'a dyn Assistant,
    pub provider: &'a dyn ScmProvider,
    pub templates: &'a Templates,
    pub now: DateTime<Utc>,
}

impl ExecutePhase<'_> {
    /// Run the phase starting from the prepare record.
    ///
    /// Configuration and context errors escape as `Err`; every other failure
    /// is recorded in the returned [`PhaseResult`].
    #[instrument(skip_all, fields(branch = %self.config.branches.working))]
    pub fn run(&self, prepared: &PhaseResult) -> Result<ExecuteReport, PipelineError> {
        let config = self.config;
        let mut result = prepared.carry_forward();
        let rules = config.noise_rules()?;
        let git = Git::new(&config.project_dir, self.runner);

        let context = reconcile_branch(
            &git,
            &config.branches.working,
            config.provider.project_path.as_deref(),
        )?;
        info!(branch = %context.current_branch, "working branch ready");

        let request = AssistantRequest {
            command: config.assistant_command.clone(),
            workdir: config.project_dir.clone(),
            prompt_file: config.prompt_file.clone(),
            transcript_path: config.jsonl_transcript_path(),
        };
        let output = match self.assistant.run(&request) {
            Ok(output) => output,
            Err(err) => {
                result.fail(format!("assistant could not run: {err:#}"));
                return Ok(ExecuteReport {
                    result,
                    path: ExecutionPath::AssistantFailed,
                });
            }
        };

        if let ArtifactLookup::Found { path, .. } = locate(&config.transcript_candidates()) {
            result.output_file = Some(path);
        }

        if !output.success() {
            warn!(exit_code = ?output.exit_code, "assistant failed");
            result.fail(format!(
                "assistant exited with {}{}",
                describe_exit(output.exit_code),
                stderr_tail(&output.stderr)
            ));
            return Ok(ExecuteReport {
                result,
                path: ExecutionPath::AssistantFailed,
            });
        }

        let classification = match classify(&git, &rules) {
            Ok(classification) => classification,
            Err(err) => return fold(result, err),
        };

        if !classification.has_substantive_change() {
            info!("no substantive change, responding instead of submitting");
            let outcome = post_response(
                self.provider,
                self.templates,
                &config.transcript_candidates(),
            );
            return Ok(ExecuteReport {
                result,
                path: ExecutionPath::Responded(outcome),
            });
        }

        let submitter = Submitter::new(config, git, self.provider, &rules, self.templates);
        match submitter.submit(result.comment_id, self.now) {
            Ok(outcome) => Ok(ExecuteReport {
                result,
                path: ExecutionPath::Submitted(outcome),
            }),
            Err(err) => fold(result, err),
        }
    }
}

/// Eager errors escape; the rest are recorded in the phase result.
fn fold(mut result: PhaseResult, err: PipelineError) -> Result<ExecuteReport, PipelineError> {
    if err.aborts_eagerly() {
        return Err(err);
    }
    result.record(&err);
    Ok(ExecuteReport {
        result,
        path: ExecutionPath::Failed,
    })
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    format!(": {}", lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    fn request(temp: &Path) -> AssistantRequest {
        AssistantRequest {
            command: vec!["claude".to_string(), "-p".to_string()],
            workdir: temp.to_path_buf(),
            prompt_file: temp.join("prompt.txt"),
            transcript_path: temp.join("out/claude-output.jsonl"),
        }
    }

    #[test]
    fn feeds_prompt_and_captures_stdout_transcript() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("prompt.txt"), "Fix the bug").expect("write prompt");
        let runner = ScriptedRunner::default().on(
            "claude -p",
            CommandOutput::ok("{\"type\":\"result\",\"result\":\"ok\"}\n"),
        );
        let request = request(temp.path());

        let output = ProcessAssistant::new(&runner).run(&request).expect("run");
        assert!(output.success());

        let sent = &runner.requests()[0];
        assert_eq!(sent.stdin.as_deref(), Some("Fix the bug"));
        assert!(
            sent.env
                .iter()
                .any(|(key, value)| key == "PIPELINE_OUTPUT_FILE"
                    && value.ends_with("claude-output.jsonl"))
        );
        let written = fs::read_to_string(&request.transcript_path).expect("transcript");
        assert!(written.contains("\"result\":\"ok\""));
    }

    #[test]
    fn existing_transcript_is_not_overwritten() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request(temp.path());
        fs::create_dir_all(temp.path().join("out")).expect("mkdir");
        fs::write(&request.transcript_path, "written by tool\n").expect("write");
        let runner = ScriptedRunner::default().on("claude -p", CommandOutput::ok("stdout copy\n"));

        ProcessAssistant::new(&runner).run(&request).expect("run");
        assert_eq!(
            fs::read_to_string(&request.transcript_path).expect("read"),
            "written by tool\n"
        );
        assert_eq!(runner.requests()[0].stdin, None);
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        assert_eq!(stderr_tail("  \n"), "");
        let long: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&long);
        assert!(tail.starts_with(": line 10\n"));
        assert!(tail.ends_with("line 29"));
    }
}
