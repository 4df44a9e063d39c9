//! Git adapter for the pipeline.
//!
//! The pipeline mutates a working tree it does not own, so every git call goes
//! through a small, explicit wrapper over the [`CommandRunner`] capability.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::noise::StatusEntry;
use crate::core::submission::redact_token;
use crate::io::command::{CommandOutput, CommandRequest, CommandRunner};

pub const DEFAULT_REMOTE: &str = "origin";

/// Wrapper for executing git commands in a working directory.
#[derive(Clone, Copy)]
pub struct Git<'a> {
    workdir: &'a Path,
    runner: &'a dyn CommandRunner,
}

impl<'a> Git<'a> {
    pub fn new(workdir: &'a Path, runner: &'a dyn CommandRunner) -> Self {
        Self { workdir, runner }
    }

    pub fn workdir(&self) -> &Path {
        self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// URL of a remote, as configured (may contain credentials).
    pub fn remote_url(&self, remote: &str) -> Result<String> {
        let out = self.run_capture(&["remote", "get-url", remote])?;
        Ok(out.trim().to_string())
    }

    pub fn set_remote_url(&self, remote: &str, url: &str) -> Result<()> {
        self.run_checked(&["remote", "set-url", remote, url])?;
        Ok(())
    }

    /// Get status entries (including untracked) in porcelain format.
    ///
    /// Uses `-z` so paths arrive verbatim, without git's C-style quoting.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-z", "-uall"])?;
        parse_status_z(&out)
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let out = self.run(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])?;
        Ok(out.success())
    }

    /// Fetch a single branch from a remote.
    #[instrument(skip_all, fields(branch))]
    pub fn fetch_branch(&self, remote: &str, branch: &str) -> Result<()> {
        debug!(remote, branch, "fetching branch");
        self.run_checked(&["fetch", remote, branch])?;
        Ok(())
    }

    /// Checkout an existing branch (creates a tracking branch when only the
    /// remote one exists).
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Create and checkout a new branch at current HEAD.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    pub fn set_identity(&self, name: &str, email: &str) -> Result<()> {
        self.run_checked(&["config", "user.name", name])?;
        self.run_checked(&["config", "user.email", email])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Remove paths from the index, leaving the working tree alone.
    pub fn unstage(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["--literal-pathspecs", "reset", "-q", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_checked(&args)?;
        Ok(())
    }

    /// Paths currently staged for commit.
    pub fn staged_paths(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--cached", "--name-only", "-z"])?;
        Ok(out
            .split('\0')
            .filter(|path| !path.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if self.staged_paths()?.is_empty() {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Push `branch` to `remote` with `-o` push options.
    ///
    /// Returns stdout and stderr combined; the remote reports created
    /// patch-request URLs there.
    #[instrument(skip_all, fields(branch, options = push_options.len()))]
    pub fn push_with_options(
        &self,
        remote: &str,
        branch: &str,
        push_options: &[String],
    ) -> Result<String> {
        let mut args: Vec<String> = vec![
            "push".to_string(),
            "-u".to_string(),
            remote.to_string(),
            format!("HEAD:refs/heads/{branch}"),
        ];
        for option in push_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_checked(&refs)?;
        Ok(output.combined())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(output.stdout)
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(args)?;
        if !output.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                redact_token(&args.join(" "), None),
                redact_token(output.stderr.trim(), None)
            ));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let request = CommandRequest::new("git", PathBuf::from(self.workdir)).args(args.iter().copied());
        self.runner
            .run(&request)
            .with_context(|| format!("spawn git {}", redact_token(&args.join(" "), None)))
    }
}

/// Parse NUL-separated `status --porcelain=v1 -z` output.
///
/// Renames and copies carry the original path as an extra record, which is
/// skipped; the entry keeps the new path.
fn parse_status_z(out: &str) -> Result<Vec<StatusEntry>> {
    let mut entries = Vec::new();
    let mut records = out.split('\0').filter(|record| !record.is_empty());
    while let Some(record) = records.next() {
        let entry = parse_status_record(record)?;
        if entry.code.contains(['R', 'C']) {
            records.next();
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_status_record(record: &str) -> Result<StatusEntry> {
    let (code, path) = record
        .split_at_checked(2)
        .and_then(|(code, rest)| rest.strip_prefix(' ').map(|path| (code, path)))
        .filter(|(_, path)| !path.is_empty())
        .ok_or_else(|| anyhow!("unexpected porcelain record: '{record}'"))?;
    Ok(StatusEntry::new(code, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_record() {
        let entries = parse_status_z("?? foo.txt\0").expect("parse");
        assert_eq!(entries, vec![StatusEntry::new("??", "foo.txt")]);
    }

    #[test]
    fn parses_modified_record() {
        let entries = parse_status_z(" M src/main.rs\0").expect("parse");
        assert_eq!(entries, vec![StatusEntry::new(" M", "src/main.rs")]);
    }

    #[test]
    fn rename_keeps_new_path_and_skips_original() {
        let entries = parse_status_z("R  new.txt\0old.txt\0?? other.txt\0").expect("parse");
        assert_eq!(
            entries,
            vec![
                StatusEntry::new("R ", "new.txt"),
                StatusEntry::new("??", "other.txt"),
            ]
        );
    }

    #[test]
    fn parses_absolute_untracked_path() {
        let entries = parse_status_z("?? /tmp/claude-output/x.json\0").expect("parse");
        assert_eq!(entries[0].path, "/tmp/claude-output/x.json");
    }

    #[test]
    fn keeps_spaces_and_non_ascii_verbatim() {
        let entries = parse_status_z("?? my file.txt\0?? café.log\0").expect("parse");
        assert_eq!(entries[0].path, "my file.txt");
        assert_eq!(entries[1].path, "café.log");
    }

    #[test]
    fn rejects_short_record() {
        assert!(parse_status_z("M\0").is_err());
    }
}
