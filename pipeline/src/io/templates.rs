//! Bundled templates for comments, commit messages and patch requests.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::comment::render_details_footer;
use crate::core::types::{ExecutionDetails, ResourceKind, ResourceRef};

const RESPONSE_COMMENT_TEMPLATE: &str = include_str!("templates/response_comment.md");
const FOLLOW_UP_COMMENT_TEMPLATE: &str = include_str!("templates/follow_up_comment.md");
const COMMIT_MESSAGE_TEMPLATE: &str = include_str!("templates/commit_message.txt");
const PATCH_DESCRIPTION_TEMPLATE: &str = include_str!("templates/patch_description.md");

/// Human label for a resource, e.g. `issue #4` or `merge request !5`.
pub fn resource_label(resource: ResourceRef) -> String {
    match resource.kind {
        ResourceKind::Issue => format!("issue {resource}"),
        ResourceKind::MergeRequest => format!("merge request {resource}"),
    }
}

/// Subject line shared by the commit and the patch request title.
pub fn change_subject(resource: Option<ResourceRef>) -> String {
    match resource {
        Some(resource) => format!("Apply assistant changes for {}", resource_label(resource)),
        None => "Apply assistant changes".to_string(),
    }
}

/// Inputs describing a submitted change.
#[derive(Debug, Clone, Copy)]
pub struct ChangeContext<'a> {
    pub resource: Option<ResourceRef>,
    pub job_url: Option<&'a str>,
    pub files: &'a [String],
}

/// Template engine wrapper around minijinja.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("response_comment", RESPONSE_COMMENT_TEMPLATE)
            .context("response comment template")?;
        env.add_template("follow_up_comment", FOLLOW_UP_COMMENT_TEMPLATE)
            .context("follow-up comment template")?;
        env.add_template("commit_message", COMMIT_MESSAGE_TEMPLATE)
            .context("commit message template")?;
        env.add_template("patch_description", PATCH_DESCRIPTION_TEMPLATE)
            .context("patch description template")?;
        Ok(Self { env })
    }

    /// Conversational reply posted when the assistant changed nothing.
    pub fn response_comment(
        &self,
        message: &str,
        details: Option<ExecutionDetails>,
    ) -> Result<String> {
        let footer = details.as_ref().and_then(render_details_footer);
        let rendered = self.env.get_template("response_comment")?.render(context! {
            message => message.trim(),
            footer => footer,
        })?;
        Ok(rendered)
    }

    pub fn follow_up_comment(
        &self,
        url: &str,
        branch: &str,
        base: Option<&str>,
        job_url: Option<&str>,
    ) -> Result<String> {
        let rendered = self.env.get_template("follow_up_comment")?.render(context! {
            url => url,
            branch => branch,
            base => base,
            job_url => job_url,
        })?;
        Ok(rendered)
    }

    pub fn commit_message(&self, change: &ChangeContext<'_>) -> Result<String> {
        let rendered = self.env.get_template("commit_message")?.render(context! {
            subject => change_subject(change.resource),
            resource => change.resource.map(resource_label),
            job_url => change.job_url,
            files => change.files,
        })?;
        Ok(rendered.trim_end().to_string())
    }

    pub fn patch_description(&self, change: &ChangeContext<'_>) -> Result<String> {
        let rendered = self.env.get_template("patch_description")?.render(context! {
            resource => change.resource.map(resource_label),
            job_url => change.job_url,
            files => change.files,
        })?;
        Ok(rendered.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(iid: u64) -> Option<ResourceRef> {
        Some(ResourceRef {
            kind: ResourceKind::Issue,
            iid,
        })
    }

    #[test]
    fn response_comment_carries_message_and_footer() {
        let templates = Templates::new().expect("templates");
        let body = templates
            .response_comment(
                "  Done.\n",
                Some(ExecutionDetails {
                    cost_usd: Some(0.02),
                    duration_ms: Some(1500.0),
                }),
            )
            .expect("render");
        assert!(body.starts_with("Done.\n"));
        assert!(body.contains("No code changes"));
        assert!(body.contains("$0.0200"));
        assert!(body.contains("1.50s"));
    }

    #[test]
    fn response_comment_without_details_has_no_footer() {
        let templates = Templates::new().expect("templates");
        let body = templates.response_comment("Hello", None).expect("render");
        assert!(!body.contains("Cost"));
        assert!(body.trim_end().ends_with("_No code changes were made in response to this request._"));
    }

    #[test]
    fn commit_message_links_resource_and_files() {
        let templates = Templates::new().expect("templates");
        let files = vec!["src/lib.rs".to_string(), "README.md".to_string()];
        let message = templates
            .commit_message(&ChangeContext {
                resource: issue(4),
                job_url: Some("https://ci/jobs/1"),
                files: &files,
            })
            .expect("render");
        let mut lines = message.lines();
        assert_eq!(lines.next(), Some("Apply assistant changes for issue #4"));
        assert_eq!(lines.next(), Some(""));
        assert!(message.contains("Requested in issue #4."));
        assert!(message.contains("Job: https://ci/jobs/1"));
        assert!(message.contains("- src/lib.rs\n- README.md"));
    }

    #[test]
    fn commit_message_without_context_is_subject_only() {
        let templates = Templates::new().expect("templates");
        let message = templates
            .commit_message(&ChangeContext {
                resource: None,
                job_url: None,
                files: &[],
            })
            .expect("render");
        assert_eq!(message, "Apply assistant changes");
    }

    #[test]
    fn follow_up_and_description_mention_their_links() {
        let templates = Templates::new().expect("templates");
        let follow_up = templates
            .follow_up_comment(
                "https://gitlab.example.com/g/p/-/merge_requests/12",
                "claude/issue-4-20250101-000000",
                Some("main"),
                None,
            )
            .expect("render");
        assert!(follow_up.contains("merge_requests/12"));
        assert!(follow_up.contains("`claude/issue-4-20250101-000000` into `main`"));
        assert!(!follow_up.contains("View job run"));

        let files = vec!["a.rs".to_string()];
        let description = templates
            .patch_description(&ChangeContext {
                resource: Some(ResourceRef {
                    kind: ResourceKind::MergeRequest,
                    iid: 5,
                }),
                job_url: Some("https://ci/jobs/2"),
                files: &files,
            })
            .expect("render");
        assert!(description.starts_with("Automated changes for merge request !5."));
        assert!(description.contains("- `a.rs`"));
        assert!(description.ends_with("[View job run](https://ci/jobs/2)"));
    }
}
