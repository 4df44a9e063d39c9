//! Pipeline configuration.
//!
//! Two layers are merged once at the process boundary:
//!
//! 1. an optional TOML file ([`FileConfig`]) for settings that rarely change
//!    (bot identity, commands, noise rules);
//! 2. a snapshot of the CI environment, which wins over the file.
//!
//! The result is a [`PipelineConfig`] passed by reference to every phase.
//! Nothing below `main` reads the process environment.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::noise::NoiseRules;
use crate::core::types::ResourceRef;
use crate::error::PipelineError;
use crate::io::artifact::{TRANSCRIPT_JSONL_FILE, candidate_paths};
use crate::io::handoff::comment_id_path;

/// Environment snapshot captured in `main`.
pub type EnvSnapshot = BTreeMap<String, String>;

const DEFAULT_TEMP_DIR: &str = "/tmp";
const DEFAULT_BASE_BRANCH: &str = "main";
const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
const DEFAULT_GITHUB_URL: &str = "https://github.com";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const PROMPT_FILE: &str = "claude-prompts/claude-prompt.txt";

/// Settings read from the optional TOML file.
///
/// Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    /// Prefix for generated submission branches.
    pub branch_prefix: String,
    pub bot: BotIdentity,
    pub assistant: CommandConfig,
    pub prepare: CommandConfig,
    pub noise: NoiseConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            branch_prefix: "claude".to_string(),
            bot: BotIdentity::default(),
            assistant: CommandConfig {
                command: vec![
                    "claude".to_string(),
                    "-p".to_string(),
                    "--output-format".to_string(),
                    "stream-json".to_string(),
                    "--verbose".to_string(),
                ],
            },
            prepare: CommandConfig::default(),
            noise: NoiseConfig::default(),
        }
    }
}

/// Author identity for commits made by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BotIdentity {
    pub name: String,
    pub email: String,
}

impl Default for BotIdentity {
    fn default() -> Self {
        Self {
            name: "claude-bot".to_string(),
            email: "claude-bot@noreply.invalid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CommandConfig {
    /// argv; empty means "not configured".
    pub command: Vec<String>,
}

/// Extra noise rules on top of the built-in ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct NoiseConfig {
    /// Regular expressions matched against repository-relative paths.
    pub extra_patterns: Vec<String>,
    /// Directory prefixes (e.g. `.idea/`) whose contents are noise.
    pub extra_hidden_prefixes: Vec<String>,
}

/// Load the TOML layer. A missing file yields defaults.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FileConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// SCM platform hosting the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Gitlab,
    Github,
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gitlab" => Ok(Self::Gitlab),
            "github" => Ok(Self::Github),
            other => Err(anyhow!("unknown platform '{other}' (expected gitlab or github)")),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gitlab => f.write_str("gitlab"),
            Self::Github => f.write_str("github"),
        }
    }
}

/// Everything the provider factory needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub platform: Platform,
    pub token: Option<String>,
    /// Web URL of the SCM host, e.g. `https://gitlab.com`.
    pub server_url: String,
    /// REST API root, e.g. `https://gitlab.com/api/v4`.
    pub api_url: String,
    /// `group/project` or `owner/repo`; also the expected remote identity.
    pub project_path: Option<String>,
    /// Numeric GitLab project id, when known.
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchConfig {
    /// Branch the assistant runs on.
    pub working: String,
    /// Branch patch requests target.
    pub base: String,
    /// Externally supplied branch for submission.
    pub source_override: Option<String>,
    pub prefix: String,
}

/// Resolved configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub project_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub provider: ProviderConfig,
    pub mr_iid: Option<u64>,
    pub issue_iid: Option<u64>,
    pub comment_id: Option<u64>,
    pub job_url: Option<String>,
    pub branches: BranchConfig,
    pub output_file: Option<PathBuf>,
    pub prompt_file: PathBuf,
    pub bot: BotIdentity,
    pub assistant_command: Vec<String>,
    pub prepare_command: Vec<String>,
    pub noise: NoiseConfig,
}

impl PipelineConfig {
    /// Merge the file layer with the environment snapshot.
    pub fn resolve(file: FileConfig, env: &EnvSnapshot) -> Result<Self, PipelineError> {
        let platform = match lookup(env, &["PIPELINE_PLATFORM"]) {
            Some(raw) => raw
                .parse::<Platform>()
                .map_err(|err| PipelineError::configuration(err.to_string()))?,
            None if lookup(env, &["GITHUB_ACTIONS"]).as_deref() == Some("true") => {
                Platform::Github
            }
            None => Platform::Gitlab,
        };

        let project_dir = lookup(env, &["CI_PROJECT_DIR", "GITHUB_WORKSPACE"])
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let temp_dir = lookup(env, &["PIPELINE_TEMP_DIR", "RUNNER_TEMP"])
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIR));

        let provider = resolve_provider(platform, env);

        let mr_iid = parse_id(env, &["CI_MERGE_REQUEST_IID", "PIPELINE_MR_IID"])?;
        let issue_iid = parse_id(env, &["PIPELINE_ISSUE_IID"])?;
        let comment_id = parse_id(env, &["PIPELINE_COMMENT_ID"])?;

        let job_url = lookup(env, &["CI_JOB_URL"]).or_else(|| {
            let run_id = lookup(env, &["GITHUB_RUN_ID"])?;
            let repo = provider.project_path.as_deref()?;
            Some(format!(
                "{}/{repo}/actions/runs/{run_id}",
                provider.server_url
            ))
        });

        let mr_source = lookup(env, &["CI_MERGE_REQUEST_SOURCE_BRANCH_NAME", "GITHUB_HEAD_REF"]);
        let base = lookup(
            env,
            &[
                "PIPELINE_BASE_BRANCH",
                "CI_MERGE_REQUEST_TARGET_BRANCH_NAME",
                "GITHUB_BASE_REF",
                "CI_DEFAULT_BRANCH",
            ],
        )
        .unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string());
        let working = lookup(env, &["PIPELINE_BRANCH"])
            .or_else(|| mr_source.clone())
            .unwrap_or_else(|| base.clone());
        let source_override = lookup(env, &["PIPELINE_SOURCE_BRANCH"]).or(mr_source);

        let assistant_command = match lookup(env, &["PIPELINE_ASSISTANT_COMMAND"]) {
            Some(raw) => split_command(&raw),
            None => file.assistant.command,
        };
        let prepare_command = match lookup(env, &["PIPELINE_PREPARE_COMMAND"]) {
            Some(raw) => split_command(&raw),
            None => file.prepare.command,
        };

        let output_file = lookup(env, &["PIPELINE_OUTPUT_FILE"]).map(PathBuf::from);
        let prompt_file = lookup(env, &["PIPELINE_PROMPT_FILE"])
            .map(PathBuf::from)
            .unwrap_or_else(|| temp_dir.join(PROMPT_FILE));

        let cfg = Self {
            project_dir,
            temp_dir,
            provider,
            mr_iid,
            issue_iid,
            comment_id,
            job_url,
            branches: BranchConfig {
                working,
                base,
                source_override,
                prefix: file.branch_prefix,
            },
            output_file,
            prompt_file,
            bot: file.bot,
            assistant_command,
            prepare_command,
            noise: file.noise,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.assistant_command.is_empty() || self.assistant_command[0].trim().is_empty() {
            return Err(PipelineError::configuration(
                "assistant command must be a non-empty array",
            ));
        }
        if self.branches.prefix.trim().is_empty() {
            return Err(PipelineError::configuration("branch_prefix must not be empty"));
        }
        if self.bot.name.trim().is_empty() || self.bot.email.trim().is_empty() {
            return Err(PipelineError::configuration(
                "bot name and email must not be empty",
            ));
        }
        Ok(())
    }

    /// The resource the tracking comment lives on (merge request first).
    pub fn resource(&self) -> Option<ResourceRef> {
        ResourceRef::resolve(self.mr_iid, self.issue_iid)
    }

    pub fn comment_id_path(&self) -> PathBuf {
        comment_id_path(&self.temp_dir)
    }

    pub fn transcript_candidates(&self) -> Vec<PathBuf> {
        candidate_paths(self.output_file.as_deref(), &self.temp_dir)
    }

    /// Where captured stream-json output is written.
    pub fn jsonl_transcript_path(&self) -> PathBuf {
        self.temp_dir.join(TRANSCRIPT_JSONL_FILE)
    }

    pub fn noise_rules(&self) -> Result<NoiseRules, PipelineError> {
        let mut rules =
            NoiseRules::with_extras(&self.noise.extra_patterns, &self.noise.extra_hidden_prefixes)
                .map_err(|err| PipelineError::configuration(format!("{err:#}")))?;
        rules.add_temp_prefix(&self.temp_dir.to_string_lossy());
        Ok(rules)
    }
}

fn resolve_provider(platform: Platform, env: &EnvSnapshot) -> ProviderConfig {
    match platform {
        Platform::Gitlab => {
            let server_url = lookup(env, &["CI_SERVER_URL"])
                .unwrap_or_else(|| DEFAULT_GITLAB_URL.to_string())
                .trim_end_matches('/')
                .to_string();
            let api_url = lookup(env, &["CI_API_V4_URL"])
                .unwrap_or_else(|| format!("{server_url}/api/v4"))
                .trim_end_matches('/')
                .to_string();
            ProviderConfig {
                platform,
                token: lookup(env, &["PIPELINE_TOKEN", "GITLAB_TOKEN", "CI_JOB_TOKEN"]),
                server_url,
                api_url,
                project_path: lookup(env, &["CI_PROJECT_PATH"]),
                project_id: lookup(env, &["CI_PROJECT_ID"]),
            }
        }
        Platform::Github => {
            let server_url = lookup(env, &["GITHUB_SERVER_URL"])
                .unwrap_or_else(|| DEFAULT_GITHUB_URL.to_string())
                .trim_end_matches('/')
                .to_string();
            let api_url = lookup(env, &["GITHUB_API_URL"])
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string())
                .trim_end_matches('/')
                .to_string();
            ProviderConfig {
                platform,
                token: lookup(env, &["PIPELINE_TOKEN", "GITHUB_TOKEN"]),
                server_url,
                api_url,
                project_path: lookup(env, &["GITHUB_REPOSITORY"]),
                project_id: None,
            }
        }
    }
}

/// First non-empty value among `keys`.
fn lookup(env: &EnvSnapshot, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn parse_id(env: &EnvSnapshot, keys: &[&str]) -> Result<Option<u64>, PipelineError> {
    let Some(key) = keys
        .iter()
        .find(|key| env.get(**key).is_some_and(|v| !v.trim().is_empty()))
    else {
        return Ok(None);
    };
    let raw = env.get(*key).map(|v| v.trim()).unwrap_or_default();
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| PipelineError::configuration(format!("{key} must be a positive integer, got '{raw}'")))
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(ToString::to_string).collect()
}
