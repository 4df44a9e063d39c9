//! Pure helpers for change submission: push-output parsing and redaction.

use std::sync::LazyLock;

use regex::Regex;

static PATCH_REQUEST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[^\s]+?/(?:-/merge_requests|pull)/\d+")
        .expect("patch request url pattern should compile")
});

static URL_CREDENTIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?://)[^/@\s]+@").expect("credential pattern should compile")
});

/// Find the created (or existing) patch-request URL in `git push` output.
///
/// GitLab prints it in `remote:` lines when `merge_request.create` is honoured.
pub fn extract_patch_request_url(push_output: &str) -> Option<String> {
    PATCH_REQUEST_URL
        .find(push_output)
        .map(|m| m.as_str().to_string())
}

/// Strip userinfo from URLs and blank out the raw token, for logs and errors.
pub fn redact_token(text: &str, token: Option<&str>) -> String {
    let mut redacted = URL_CREDENTIALS.replace_all(text, "${1}***@").into_owned();
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        redacted = redacted.replace(token, "***");
    }
    redacted
}
