//! Output artifact reader: locate and parse the assistant transcript.
//!
//! Candidates are tried in preference order (explicit override, then the
//! JSON-array file, then the JSONL file under the temp root). A missing or
//! unreadable file is never an error for the caller; it degrades to
//! [`ArtifactLookup::NotFound`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::core::transcript::{ExtractedMessage, Transcript};
use crate::core::types::ExecutionDetails;
use crate::error::PipelineError;

/// JSON-array transcript written by the assistant action.
pub const TRANSCRIPT_JSON_FILE: &str = "claude-execution-output.json";
/// Stream-json (one record per line) transcript.
pub const TRANSCRIPT_JSONL_FILE: &str = "claude-output.jsonl";

/// Ordered candidate locations for the transcript.
pub fn candidate_paths(override_path: Option<&Path>, temp_dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(3);
    if let Some(path) = override_path {
        paths.push(path.to_path_buf());
    }
    paths.push(temp_dir.join(TRANSCRIPT_JSON_FILE));
    paths.push(temp_dir.join(TRANSCRIPT_JSONL_FILE));
    paths
}

/// Outcome of searching the candidate locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLookup {
    Found { path: PathBuf, content: String },
    NotFound { searched: Vec<PathBuf> },
}

/// Return the first candidate with non-empty, decodable content.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub fn locate(candidates: &[PathBuf]) -> ArtifactLookup {
    for path in candidates {
        match read_candidate(path) {
            Ok(Some(content)) => {
                debug!(path = %path.display(), bytes = content.len(), "found transcript");
                return ArtifactLookup::Found {
                    path: path.clone(),
                    content,
                };
            }
            Ok(None) => {}
            Err(err) => warn!(err = %err, "skipping transcript candidate"),
        }
    }
    info!("no transcript found");
    ArtifactLookup::NotFound {
        searched: candidates.to_vec(),
    }
}

fn read_candidate(path: &Path) -> Result<Option<String>, PipelineError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(PipelineError::transient(format!(
                "read {}: {err}",
                path.display()
            )));
        }
    };
    let content = String::from_utf8(bytes).map_err(|err| {
        PipelineError::transient(format!("{} is not utf-8: {err}", path.display()))
    })?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(content))
}

/// A located and parsed transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTranscript {
    pub path: PathBuf,
    pub transcript: Transcript,
}

impl LoadedTranscript {
    pub fn execution_details(&self) -> Option<ExecutionDetails> {
        self.transcript.execution_details()
    }

    pub fn message(&self) -> Option<ExtractedMessage> {
        self.transcript.extract_message()
    }
}

/// Locate and parse the transcript; `None` when no candidate has content.
pub fn load_transcript(candidates: &[PathBuf]) -> Option<LoadedTranscript> {
    match locate(candidates) {
        ArtifactLookup::Found { path, content } => {
            let transcript = Transcript::parse(&content);
            if transcript.malformed > 0 {
                warn!(
                    path = %path.display(),
                    malformed = transcript.malformed,
                    "skipped malformed transcript records"
                );
            }
            Some(LoadedTranscript { path, transcript })
        }
        ArtifactLookup::NotFound { .. } => None,
    }
}

/// Execution details from whichever transcript is found; absence is fine.
pub fn read_execution_details(candidates: &[PathBuf]) -> Option<ExecutionDetails> {
    load_transcript(candidates).and_then(|loaded| loaded.execution_details())
}
