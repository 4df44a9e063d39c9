//! Change classification: delete known noise, then partition what is left.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::core::noise::{ChangeSet, NoiseRules};
use crate::error::PipelineError;
use crate::io::git::Git;

/// Result of a classify pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classification {
    /// Untracked noise paths deleted before the final status read.
    pub removed: Vec<String>,
    pub changes: ChangeSet,
}

impl Classification {
    pub fn has_substantive_change(&self) -> bool {
        self.changes.has_substantive_change()
    }
}

/// Classify the working tree under `git`.
///
/// Only noise that git reports as untracked is deleted; tracked files are
/// never touched. Status is read again after cleanup and filtered a second
/// time, so noise that survives deletion is still not substantive.
#[instrument(skip_all, fields(workdir = %git.workdir().display()))]
pub fn classify(git: &Git<'_>, rules: &NoiseRules) -> Result<Classification, PipelineError> {
    let before = git
        .status_porcelain()
        .map_err(|err| PipelineError::submission("read working tree status", err))?;

    let mut removed = Vec::new();
    for entry in before
        .iter()
        .filter(|entry| entry.is_untracked() && rules.is_noise(&entry.path))
    {
        let Some(target) = cleanup_target(git.workdir(), &entry.path) else {
            debug!(path = %entry.path, "noise outside project directory left in place");
            continue;
        };
        match remove_path(&target) {
            Ok(true) => removed.push(entry.path.clone()),
            Ok(false) => debug!(path = %entry.path, "noise already gone"),
            Err(err) => {
                let err = PipelineError::non_critical(format!("remove {}", entry.path), err);
                warn!(err = %err.chain_message(), "noise cleanup failed");
            }
        }
    }
    if !removed.is_empty() {
        info!(count = removed.len(), "removed untracked noise");
    }

    let after = git
        .status_porcelain()
        .map_err(|err| PipelineError::submission("read working tree status", err))?;
    let changes = rules.partition(after);
    info!(
        entries = changes.entries.len(),
        noise = changes.noise.len(),
        substantive = changes.substantive.len(),
        "classified working tree"
    );
    Ok(Classification { removed, changes })
}

/// Resolve a status path to a deletable location inside `workdir`.
fn cleanup_target(workdir: &Path, path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return candidate.starts_with(workdir).then(|| candidate.to_path_buf());
    }
    if candidate
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return None;
    }
    Some(workdir.join(candidate))
}

/// Delete a file or directory. Returns whether anything was deleted.
fn remove_path(path: &Path) -> anyhow::Result<bool> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("delete {}", path.display())),
    }
}
