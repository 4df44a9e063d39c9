//! Tracking-comment body rewriting.
//!
//! The prepare step posts a comment containing [`IN_PROGRESS_MARKER`] and a
//! task checklist. When the job ends the body is rewritten in place: the
//! marker becomes a final status, every checklist item is ticked, and the job
//! link, error text and cost footer are appended.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{ExecutionDetails, Outcome};

pub const IN_PROGRESS_MARKER: &str = "🔄 Working on it…";
pub const SUCCESS_MARKER: &str = "✅ Finished";
pub const FAILURE_MARKER: &str = "❌ Failed";

static UNCHECKED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\s*[-*+]) \[ \]").expect("checklist pattern should compile")
});

/// Inputs for the final tracking-comment rewrite.
#[derive(Debug, Clone, Default)]
pub struct FinalStatus<'a> {
    pub outcome: Option<Outcome>,
    pub job_url: Option<&'a str>,
    pub error: Option<&'a str>,
    pub details: Option<ExecutionDetails>,
}

pub fn status_marker(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => SUCCESS_MARKER,
        Outcome::Failure => FAILURE_MARKER,
    }
}

pub fn render_final_body(current: &str, status: &FinalStatus<'_>) -> String {
    let outcome = status.outcome.unwrap_or(Outcome::Failure);
    let marker = status_marker(outcome);

    let mut body = if current.contains(IN_PROGRESS_MARKER) {
        current.replacen(IN_PROGRESS_MARKER, marker, 1)
    } else if current.contains(SUCCESS_MARKER) || current.contains(FAILURE_MARKER) {
        current
            .replacen(SUCCESS_MARKER, marker, 1)
            .replacen(FAILURE_MARKER, marker, 1)
    } else if current.trim().is_empty() {
        marker.to_string()
    } else {
        format!("{marker}\n\n{current}")
    };

    body = UNCHECKED_ITEM.replace_all(&body, "$1 [x]").into_owned();
    let mut body = body.trim_end().to_string();

    if let Some(url) = status.job_url.map(str::trim).filter(|url| !url.is_empty())
        && !body.contains(url)
    {
        body.push_str(&format!("\n\n[View job run]({url})"));
    }

    if let Some(error) = status.error.map(str::trim).filter(|e| !e.is_empty()) {
        let block = format!("\n\n**Error:**\n\n```\n{error}\n```");
        if !body.contains(&block) {
            body.push_str(&block);
        }
    }

    if let Some(footer) = status.details.as_ref().and_then(render_details_footer)
        && !body.contains(&footer)
    {
        body.push_str("\n\n---\n");
        body.push_str(&footer);
    }

    body.push('\n');
    body
}

/// `_Cost: $0.0200 | Duration: 1.50s_`, or `None` when nothing is known.
pub fn render_details_footer(details: &ExecutionDetails) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(cost) = details.cost_usd {
        parts.push(format!("Cost: {}", format_cost(cost)));
    }
    if let Some(ms) = details.duration_ms {
        parts.push(format!("Duration: {}", format_duration_ms(ms)));
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!("_{}_", parts.join(" | ")))
}

pub fn format_cost(cost_usd: f64) -> String {
    format!("${cost_usd:.4}")
}

pub fn format_duration_ms(ms: f64) -> String {
    format!("{:.2}s", ms / 1000.0)
}
