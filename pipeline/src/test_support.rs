//! Test-only fakes and fixtures.
//!
//! Fakes record what they were asked to do so tests can assert on side
//! effects without a network or an assistant binary. [`TestRepo`] is a real
//! git repository with a bare `origin`, since branch and submission logic is
//! only meaningful against real git.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::types::PhaseResult;
use crate::error::PipelineError;
use crate::execute::{Assistant, AssistantRequest};
use crate::io::command::{CommandOutput, CommandRequest, CommandRunner};
use crate::io::config::{
    BotIdentity, BranchConfig, NoiseConfig, PipelineConfig, Platform, ProviderConfig,
};
use crate::io::provider::{PatchRequest, ScmProvider};
use crate::prepare::{PrepareOutcome, Preparer};

/// Project path the [`TestRepo`] remote is created under.
pub const TEST_PROJECT_PATH: &str = "group/proj";
pub const TEST_JOB_URL: &str = "https://ci.example.com/jobs/1";

/// Deterministic configuration rooted at the given directories.
///
/// Targets merge request `!5`, has no tracking comment and no expected remote.
pub fn config_for(project_dir: &Path, temp_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        project_dir: project_dir.to_path_buf(),
        temp_dir: temp_dir.to_path_buf(),
        provider: ProviderConfig {
            platform: Platform::Gitlab,
            token: Some("test-token".to_string()),
            server_url: "https://gitlab.example.com".to_string(),
            api_url: "https://gitlab.example.com/api/v4".to_string(),
            project_path: None,
            project_id: None,
        },
        mr_iid: Some(5),
        issue_iid: None,
        comment_id: None,
        job_url: Some(TEST_JOB_URL.to_string()),
        branches: BranchConfig {
            working: "main".to_string(),
            base: "main".to_string(),
            source_override: None,
            prefix: "claude".to_string(),
        },
        output_file: None,
        prompt_file: temp_dir.join("prompt.txt"),
        bot: BotIdentity::default(),
        assistant_command: vec!["assistant".to_string()],
        prepare_command: Vec::new(),
        noise: NoiseConfig::default(),
    }
}

/// [`CommandRunner`] answering from a script keyed by command-line prefix.
///
/// Unscripted commands fail to "spawn".
#[derive(Default)]
pub struct ScriptedRunner {
    script: Vec<(String, CommandOutput)>,
    requests: RefCell<Vec<CommandRequest>>,
}

impl ScriptedRunner {
    /// Answer commands whose `display()` starts with `prefix`.
    pub fn on(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.script.push((prefix.to_string(), output));
        self
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput> {
        self.requests.borrow_mut().push(request.clone());
        let line = request.display();
        self.script
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .ok_or_else(|| anyhow!("unscripted command: {line}"))
    }
}

/// One call made against a [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CreateComment(String),
    GetComment(u64),
    UpdateComment(u64, String),
    OpenPatchRequest(PatchRequest),
}

/// In-memory [`ScmProvider`] that records every call.
pub struct RecordingProvider {
    platform: Platform,
    comments: RefCell<BTreeMap<u64, String>>,
    calls: RefCell<Vec<ProviderCall>>,
    failing: bool,
    remote_url: Option<String>,
    patch_url: Option<String>,
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self {
            platform: Platform::Gitlab,
            comments: RefCell::new(BTreeMap::new()),
            calls: RefCell::new(Vec::new()),
            failing: false,
            remote_url: None,
            patch_url: None,
        }
    }
}

impl RecordingProvider {
    /// Seed an existing comment.
    pub fn with_comment(self, id: u64, body: &str) -> Self {
        self.comments.borrow_mut().insert(id, body.to_string());
        self
    }

    /// Every API call fails (calls are still recorded).
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Remote URL returned as the "authenticated" push target.
    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    /// Act like GitHub: open patch requests through the API and return `url`.
    pub fn with_patch_url(mut self, url: impl Into<String>) -> Self {
        self.platform = Platform::Github;
        self.patch_url = Some(url.into());
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.borrow().clone()
    }

    pub fn comment_body(&self, id: u64) -> Option<String> {
        self.comments.borrow().get(&id).cloned()
    }

    /// Bodies of comments created (not edited) during the test.
    pub fn created_comments(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                ProviderCall::CreateComment(body) => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of comment edits attempted.
    pub fn updates(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, ProviderCall::UpdateComment(..)))
            .count()
    }

    fn record(&self, call: ProviderCall) -> Result<()> {
        self.calls.borrow_mut().push(call);
        if self.failing {
            bail!("HTTP 500: scripted failure");
        }
        Ok(())
    }
}

impl ScmProvider for RecordingProvider {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn create_comment(&self, body: &str) -> Result<()> {
        self.record(ProviderCall::CreateComment(body.to_string()))
    }

    fn get_comment(&self, comment_id: u64) -> Result<String> {
        self.record(ProviderCall::GetComment(comment_id))?;
        self.comment_body(comment_id)
            .ok_or_else(|| anyhow!("HTTP 404: comment {comment_id} not found"))
    }

    fn update_comment(&self, comment_id: u64, body: &str) -> Result<()> {
        self.record(ProviderCall::UpdateComment(comment_id, body.to_string()))?;
        self.comments
            .borrow_mut()
            .insert(comment_id, body.to_string());
        Ok(())
    }

    fn push_options(&self, _request: &PatchRequest) -> Vec<String> {
        Vec::new()
    }

    fn open_patch_request(&self, request: &PatchRequest) -> Result<Option<String>> {
        if self.platform == Platform::Gitlab {
            return Ok(None);
        }
        self.record(ProviderCall::OpenPatchRequest(request.clone()))?;
        Ok(self.patch_url.clone())
    }

    fn authenticated_remote_url(&self) -> Result<String> {
        self.remote_url
            .clone()
            .ok_or_else(|| anyhow!("no remote url scripted"))
    }
}

/// [`Assistant`] that edits the working tree and writes a transcript.
pub struct ScriptedAssistant {
    exit_code: i32,
    transcript: Option<String>,
    files: Vec<(String, String)>,
    runs: Cell<usize>,
}

impl ScriptedAssistant {
    pub fn succeeding() -> Self {
        Self {
            exit_code: 0,
            transcript: None,
            files: Vec::new(),
            runs: Cell::new(0),
        }
    }

    pub fn failing(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::succeeding()
        }
    }

    /// Transcript content written to the request's transcript path.
    pub fn with_transcript(mut self, content: &str) -> Self {
        self.transcript = Some(content.to_string());
        self
    }

    /// File written relative to the working directory.
    pub fn writes_file(mut self, path: &str, contents: &str) -> Self {
        self.files.push((path.to_string(), contents.to_string()));
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.get()
    }
}

impl Assistant for ScriptedAssistant {
    fn run(&self, request: &AssistantRequest) -> Result<CommandOutput> {
        self.runs.set(self.runs.get() + 1);
        for (path, contents) in &self.files {
            write_file(&request.workdir.join(path), contents)?;
        }
        if let Some(transcript) = &self.transcript {
            write_file(&request.transcript_path, transcript)?;
        }
        if self.exit_code == 0 {
            Ok(CommandOutput::ok(""))
        } else {
            Ok(CommandOutput::failed(self.exit_code, "assistant crashed"))
        }
    }
}

/// [`Preparer`] returning a fixed outcome.
pub struct StaticPreparer {
    outcome: std::result::Result<PrepareOutcome, String>,
}

impl StaticPreparer {
    pub fn ready(result: PhaseResult) -> Self {
        Self {
            outcome: Ok(PrepareOutcome::Ready(result)),
        }
    }

    pub fn not_triggered() -> Self {
        Self {
            outcome: Ok(PrepareOutcome::NotTriggered),
        }
    }

    /// Fails with a configuration error.
    pub fn misconfigured(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
        }
    }
}

impl Preparer for StaticPreparer {
    fn prepare(&self, _config: &PipelineConfig) -> std::result::Result<PrepareOutcome, PipelineError> {
        self.outcome
            .clone()
            .map_err(PipelineError::configuration)
    }
}

/// A git working copy on `main` with a bare `origin` and a scratch temp dir.
pub struct TestRepo {
    _root: TempDir,
    work: PathBuf,
    remote: PathBuf,
    temp: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir().context("create tempdir")?;
        let work = root.path().join("work");
        let remote = root
            .path()
            .join("remote")
            .join(format!("{TEST_PROJECT_PATH}.git"));
        let temp = root.path().join("tmp");
        for dir in [&work, &remote, &temp] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }

        run_git(&remote, &["init", "--bare", "--quiet"])?;
        run_git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"])?;

        run_git(&work, &["init", "--quiet"])?;
        run_git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        run_git(&work, &["config", "user.email", "test@example.com"])?;
        run_git(&work, &["config", "user.name", "test"])?;
        run_git(&work, &["config", "commit.gpgsign", "false"])?;
        write_file(&work.join("README.md"), "hi\n")?;
        run_git(&work, &["add", "README.md"])?;
        run_git(&work, &["commit", "--quiet", "-m", "chore: init"])?;
        let remote_url = remote.display().to_string();
        run_git(&work, &["remote", "add", "origin", &remote_url])?;
        run_git(&work, &["push", "--quiet", "-u", "origin", "main"])?;

        Ok(Self {
            _root: root,
            work,
            remote,
            temp,
        })
    }

    /// Working copy root.
    pub fn path(&self) -> &Path {
        &self.work
    }

    pub fn remote_path(&self) -> &Path {
        &self.remote
    }

    /// Scratch directory standing in for the CI temp root.
    pub fn temp_dir(&self) -> &Path {
        &self.temp
    }

    /// Configuration for this repo, expecting the `origin` remote identity.
    pub fn config(&self) -> PipelineConfig {
        let mut config = config_for(&self.work, &self.temp);
        config.provider.project_path = Some(TEST_PROJECT_PATH.to_string());
        config
    }

    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        write_file(&self.work.join(relative), contents)
    }

    /// Run git in the working copy and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        run_git(&self.work, args)
    }

    pub fn current_branch(&self) -> Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Branch names present on the bare remote.
    pub fn remote_branches(&self) -> Result<Vec<String>> {
        let out = run_git(
            &self.remote,
            &["for-each-ref", "--format=%(refname:short)", "refs/heads"],
        )?;
        Ok(out.lines().map(ToString::to_string).collect())
    }

    /// Files changed by the tip commit of `branch` on the remote.
    pub fn remote_tip_files(&self, branch: &str) -> Result<Vec<String>> {
        let out = run_git(
            &self.remote,
            &["show", "--name-only", "--format=", branch],
        )?;
        Ok(out
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ToString::to_string)
            .collect())
    }

    pub fn commit_count(&self) -> Result<usize> {
        let out = self.git(&["rev-list", "--count", "HEAD"])?;
        out.parse::<usize>().context("parse commit count")
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
