//! Noise-path rules and change partitioning.
//!
//! A noise path is something tooling leaves behind (logs, temp files,
//! transcripts, tool-scoped hidden directories) that must never be committed.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

/// File-name patterns that are always noise, wherever they appear.
const DEFAULT_NOISE_PATTERNS: &[&str] = &[
    r"(^|/)output\.txt$",
    r"(^|/)claude-output\.jsonl?$",
    r"(^|/)claude-execution-output\.json$",
    r"(^|/)claude-comment-id$",
    r"(^|/)nohup\.out$",
    r"\.(log|tmp|temp|swp|swo|bak)$",
    r"~$",
];

/// Tool-scoped hidden directories whose contents are noise.
const DEFAULT_HIDDEN_PREFIXES: &[&str] = &[".claude/", ".claude-pipeline/", ".cache/"];

/// System temp locations; anything under them is noise.
const DEFAULT_TEMP_PREFIXES: &[&str] = &["/tmp/", "/var/tmp/", "tmp/"];

static DEFAULT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DEFAULT_NOISE_PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).expect("default noise pattern should compile"))
        .collect()
});

/// One `(status, path)` pair from working-tree inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    pub path: String,
}

impl StatusEntry {
    pub fn new(code: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            path: path.into(),
        }
    }

    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// Working-tree changes partitioned into noise and substantive entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    /// All entries in status order.
    pub entries: Vec<StatusEntry>,
    pub noise: Vec<StatusEntry>,
    pub substantive: Vec<StatusEntry>,
}

impl ChangeSet {
    /// A non-empty change list with nothing substantive counts as no change.
    pub fn has_substantive_change(&self) -> bool {
        !self.substantive.is_empty()
    }
}

/// Compiled rules deciding which paths are noise.
#[derive(Debug, Clone)]
pub struct NoiseRules {
    patterns: Vec<Regex>,
    hidden_prefixes: Vec<String>,
    temp_prefixes: Vec<String>,
}

impl Default for NoiseRules {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.clone(),
            hidden_prefixes: DEFAULT_HIDDEN_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            temp_prefixes: DEFAULT_TEMP_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl NoiseRules {
    /// Default rules extended with extra regex patterns and hidden prefixes.
    pub fn with_extras(extra_patterns: &[String], extra_hidden_prefixes: &[String]) -> Result<Self> {
        let mut rules = Self::default();
        for pattern in extra_patterns {
            let re = Regex::new(pattern)
                .with_context(|| format!("compile noise pattern '{pattern}'"))?;
            rules.patterns.push(re);
        }
        for prefix in extra_hidden_prefixes {
            let mut prefix = prefix.trim().trim_start_matches("./").to_string();
            if prefix.is_empty() {
                continue;
            }
            if !prefix.ends_with('/') {
                prefix.push('/');
            }
            rules.hidden_prefixes.push(prefix);
        }
        Ok(rules)
    }

    /// Also treat paths under `dir` (e.g. the configured temp root) as noise.
    pub fn add_temp_prefix(&mut self, dir: &str) {
        let mut prefix = dir.trim().to_string();
        if prefix.is_empty() {
            return;
        }
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        if !self.temp_prefixes.contains(&prefix) {
            self.temp_prefixes.push(prefix);
        }
    }

    pub fn is_noise(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./");
        if self.temp_prefixes.iter().any(|prefix| path.starts_with(prefix)) {
            return true;
        }
        if self
            .hidden_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix) || path == prefix.trim_end_matches('/'))
        {
            return true;
        }
        self.patterns.iter().any(|re| re.is_match(path))
    }

    /// Partition status entries, preserving their order.
    pub fn partition(&self, entries: Vec<StatusEntry>) -> ChangeSet {
        let (noise, substantive): (Vec<_>, Vec<_>) = entries
            .iter()
            .cloned()
            .partition(|entry| self.is_noise(&entry.path));
        ChangeSet {
            entries,
            noise,
            substantive,
        }
    }
}
