//! CI entry point for the coding-assistant pipeline.
//!
//! The process environment is read exactly once, here, into an
//! [`EnvSnapshot`]; everything below works from the resolved
//! [`PipelineConfig`].

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use pipeline::classify::classify;
use pipeline::core::comment::render_details_footer;
use pipeline::core::types::Outcome;
use pipeline::execute::ProcessAssistant;
use pipeline::exit_codes;
use pipeline::io::artifact::load_transcript;
use pipeline::io::command::ProcessRunner;
use pipeline::io::config::{EnvSnapshot, PipelineConfig, load_file_config};
use pipeline::io::git::Git;
use pipeline::io::handoff::read_comment_id;
use pipeline::io::provider::provider_from_config;
use pipeline::logging;
use pipeline::orchestrator::Pipeline;
use pipeline::prepare::CommandPreparer;
use pipeline::update::{CommentUpdate, update_tracking_comment};

const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";

#[derive(Parser)]
#[command(
    name = "pipeline",
    version,
    about = "Run a coding assistant inside a CI job and report back"
)]
struct Cli {
    /// TOML settings file (falls back to `PIPELINE_CONFIG`, then `pipeline.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run prepare, execute and update.
    Run,
    /// Rewrite the tracking comment with a final status.
    UpdateComment {
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        /// Error text to include in the comment.
        #[arg(long)]
        error: Option<String>,
    },
    /// Remove untracked noise and print the remaining change set.
    Classify,
    /// Print the message and execution details found in the transcript.
    Extract {
        /// Read this transcript instead of the default locations.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutcomeArg {
    Success,
    Failure,
}

impl From<OutcomeArg> for Outcome {
    fn from(value: OutcomeArg) -> Self {
        match value {
            OutcomeArg::Success => Outcome::Success,
            OutcomeArg::Failure => Outcome::Failure,
        }
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let env: EnvSnapshot = std::env::vars().collect();
    let config_path = cli
        .config
        .or_else(|| env.get("PIPELINE_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let file = load_file_config(&config_path)?;
    let config = PipelineConfig::resolve(file, &env)?;

    match cli.command {
        Command::Run => cmd_run(&config),
        Command::UpdateComment { outcome, error } => {
            cmd_update_comment(&config, outcome.into(), error.as_deref())
        }
        Command::Classify => cmd_classify(&config),
        Command::Extract { file } => cmd_extract(&config, file),
    }
}

fn cmd_run(config: &PipelineConfig) -> Result<i32> {
    let runner = ProcessRunner;
    let provider = provider_from_config(&config.provider, config.resource())?;
    let preparer = CommandPreparer::new(&runner);
    let assistant = ProcessAssistant::new(&runner);
    let report = Pipeline::new(config, &runner, &preparer, &assistant, provider.as_ref())?.run();
    info!(state = %report.state, exit_code = report.exit_code(), "pipeline finished");
    Ok(report.exit_code())
}

fn cmd_update_comment(config: &PipelineConfig, outcome: Outcome, error: Option<&str>) -> Result<i32> {
    let comment_id = read_comment_id(&config.comment_id_path()).or(config.comment_id);
    if comment_id.is_none() {
        info!("no tracking comment, nothing to update");
        return Ok(exit_codes::OK);
    }
    let provider = provider_from_config(&config.provider, config.resource())?;
    update_tracking_comment(
        config,
        provider.as_ref(),
        &CommentUpdate {
            comment_id,
            outcome,
            error,
        },
    )?;
    Ok(exit_codes::OK)
}

fn cmd_classify(config: &PipelineConfig) -> Result<i32> {
    let runner = ProcessRunner;
    let git = Git::new(&config.project_dir, &runner);
    let classification = classify(&git, &config.noise_rules()?)?;
    for path in &classification.removed {
        println!("removed\t{path}");
    }
    for entry in &classification.changes.noise {
        println!("noise\t{}\t{}", entry.code, entry.path);
    }
    for entry in &classification.changes.substantive {
        println!("substantive\t{}\t{}", entry.code, entry.path);
    }
    println!(
        "has_substantive_change={}",
        classification.has_substantive_change()
    );
    Ok(exit_codes::OK)
}

fn cmd_extract(config: &PipelineConfig, file: Option<PathBuf>) -> Result<i32> {
    let candidates = match file {
        Some(path) => vec![path],
        None => config.transcript_candidates(),
    };
    let Some(loaded) = load_transcript(&candidates) else {
        println!("no transcript found");
        return Ok(exit_codes::OK);
    };
    match loaded.message() {
        Some(message) => println!("{}", message.text),
        None => println!("no message found"),
    }
    if let Some(footer) = loaded
        .execution_details()
        .as_ref()
        .and_then(render_details_footer)
    {
        println!("{footer}");
    }
    Ok(exit_codes::OK)
}
