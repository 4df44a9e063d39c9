//! Deterministic branch naming for submitted changes.

use chrono::{DateTime, Utc};

use crate::core::types::ResourceRef;

/// Pick the branch a change is submitted on.
///
/// An externally supplied source branch wins. Otherwise the name is derived
/// from the resource and a second-resolution timestamp:
/// `<prefix>/<kind>-<iid>-<YYYYMMDD-HHMMSS>`. Without either there is no name.
pub fn submission_branch(
    prefix: &str,
    source_override: Option<&str>,
    resource: Option<ResourceRef>,
    now: DateTime<Utc>,
) -> Option<String> {
    if let Some(name) = source_override.map(str::trim).filter(|name| !name.is_empty()) {
        return Some(name.to_string());
    }
    let resource = resource?;
    let prefix = sanitize_component(prefix.trim_end_matches('/'));
    Some(format!(
        "{prefix}/{}-{}-{}",
        resource.kind.slug(),
        resource.iid,
        now.format("%Y%m%d-%H%M%S")
    ))
}

/// Keep only characters git accepts comfortably in a ref component.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '-' || c == '/' || c == '.');
    if cleaned.is_empty() {
        "claude".to_string()
    } else {
        cleaned.replace("..", "-")
    }
}
