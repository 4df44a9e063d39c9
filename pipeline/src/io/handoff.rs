//! Comment-id handoff file written by the prepare step.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub const COMMENT_ID_FILE: &str = "claude-comment-id";

pub fn comment_id_path(temp_dir: &Path) -> PathBuf {
    temp_dir.join(COMMENT_ID_FILE)
}

pub fn write_comment_id(path: &Path, comment_id: u64) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, format!("{comment_id}\n"))
        .with_context(|| format!("write comment id {}", path.display()))
}

/// Read the persisted comment id.
///
/// A missing file or unparseable content yields `None`; the latter is logged.
pub fn read_comment_id(path: &Path) -> Option<u64> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no comment id handoff file");
            return None;
        }
        Err(err) => {
            warn!(path = %path.display(), err = %err, "failed to read comment id");
            return None;
        }
    };
    match contents.trim().parse::<u64>() {
        Ok(id) => Some(id),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "ignoring malformed comment id");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_id_is_read_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = comment_id_path(temp.path());
        write_comment_id(&path, 123_456).expect("write");
        assert_eq!(read_comment_id(&path), Some(123_456));
    }

    #[test]
    fn missing_or_garbage_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = comment_id_path(temp.path());
        assert_eq!(read_comment_id(&path), None);
        fs::write(&path, "not-a-number").expect("write");
        assert_eq!(read_comment_id(&path), None);
    }
}
