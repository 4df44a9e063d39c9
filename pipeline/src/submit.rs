//! Change submission: commit substantive changes and push them as a new branch.
//!
//! Each step has its own failure boundary. Git and push failures become
//! [`PipelineError::Submission`]; a wrong repository or missing identifiers
//! escape as eager errors. Posting the follow-up comment is best-effort.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::branch::verify_context;
use crate::core::branch_name::submission_branch;
use crate::core::noise::NoiseRules;
use crate::core::submission::{extract_patch_request_url, redact_token};
use crate::error::PipelineError;
use crate::io::config::PipelineConfig;
use crate::io::git::{DEFAULT_REMOTE, Git};
use crate::io::provider::{PatchRequest, ScmProvider};
use crate::io::templates::{ChangeContext, Templates, change_subject};

/// What the submitter did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted {
        branch: String,
        /// Patch-request URL, when the host reported one.
        url: Option<String>,
    },
    /// Everything staged turned out to be noise; nothing was committed.
    NothingToCommit,
}

pub struct Submitter<'a> {
    config: &'a PipelineConfig,
    git: Git<'a>,
    provider: &'a dyn ScmProvider,
    rules: &'a NoiseRules,
    templates: &'a Templates,
}

impl<'a> Submitter<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        git: Git<'a>,
        provider: &'a dyn ScmProvider,
        rules: &'a NoiseRules,
        templates: &'a Templates,
    ) -> Self {
        Self {
            config,
            git,
            provider,
            rules,
            templates,
        }
    }

    /// Commit and push the working tree.
    ///
    /// `comment_id` is the tracking comment; when set, a follow-up comment
    /// linking the patch request is posted.
    #[instrument(skip_all)]
    pub fn submit(
        &self,
        comment_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, PipelineError> {
        let expected_remote = self.config.provider.project_path.as_deref();
        let context = verify_context(&self.git, expected_remote, None)?;

        let branch = self.branch_name(now)?;
        // Re-entry on the submission branch is fine; anything else must still
        // be the working branch the assistant ran on.
        if context.current_branch != branch {
            verify_context(&self.git, None, Some(&self.config.branches.working))?;
        }
        info!(branch = %branch, "submitting changes");

        self.git
            .set_identity(&self.config.bot.name, &self.config.bot.email)
            .map_err(|err| PipelineError::submission("configure bot identity", err))?;
        self.switch_to(&branch)?;
        verify_context(&self.git, expected_remote, Some(&branch))?;

        let files = self.stage_substantive()?;
        if files.is_empty() {
            info!("nothing staged after noise filtering, skipping commit");
            return Ok(SubmitOutcome::NothingToCommit);
        }

        let change = ChangeContext {
            resource: self.config.resource(),
            job_url: self.config.job_url.as_deref(),
            files: &files,
        };
        let message = self
            .templates
            .commit_message(&change)
            .map_err(|err| PipelineError::submission("render commit message", err))?;
        let committed = self
            .git
            .commit_staged(&message)
            .map_err(|err| PipelineError::submission("commit changes", err))?;
        if !committed {
            return Ok(SubmitOutcome::NothingToCommit);
        }

        let description = self
            .templates
            .patch_description(&change)
            .map_err(|err| PipelineError::submission("render patch description", err))?;
        let request = PatchRequest {
            source_branch: branch.clone(),
            target_branch: self.config.branches.base.clone(),
            title: change_subject(change.resource),
            description,
        };
        let push_output = self.push(&request)?;

        let url = match extract_patch_request_url(&push_output) {
            Some(url) => Some(url),
            None => self.open_patch_request(&request),
        };
        match &url {
            Some(url) => info!(url = %url, "patch request available"),
            None => info!("push succeeded without a patch request url"),
        }

        if let (Some(url), Some(_)) = (&url, comment_id) {
            self.post_follow_up(url, &branch);
        }

        Ok(SubmitOutcome::Submitted { branch, url })
    }

    fn branch_name(&self, now: DateTime<Utc>) -> Result<String, PipelineError> {
        let branches = &self.config.branches;
        submission_branch(
            &branches.prefix,
            branches.source_override.as_deref(),
            self.config.resource(),
            now,
        )
        .ok_or_else(|| {
            PipelineError::configuration(
                "cannot name a submission branch without a merge request or issue iid",
            )
        })
    }

    /// Checkout `branch` unless already on it.
    fn switch_to(&self, branch: &str) -> Result<(), PipelineError> {
        let current = self
            .git
            .current_branch()
            .map_err(|err| PipelineError::submission("read current branch", err))?;
        if current == branch {
            debug!("already on submission branch");
            return Ok(());
        }
        let exists = self
            .git
            .branch_exists(branch)
            .map_err(|err| PipelineError::submission("look up submission branch", err))?;
        let switched = if exists {
            self.git.checkout_branch(branch)
        } else {
            self.git.checkout_new_branch(branch)
        };
        switched.map_err(|err| PipelineError::submission("checkout submission branch", err))
    }

    /// Stage everything, then take noise back out of the index.
    fn stage_substantive(&self) -> Result<Vec<String>, PipelineError> {
        self.git
            .add_all()
            .map_err(|err| PipelineError::submission("stage changes", err))?;
        let staged = self
            .git
            .staged_paths()
            .map_err(|err| PipelineError::submission("list staged changes", err))?;
        let noise: Vec<String> = staged
            .iter()
            .filter(|path| self.rules.is_noise(path))
            .cloned()
            .collect();
        if !noise.is_empty() {
            debug!(count = noise.len(), "unstaging noise");
            self.git
                .unstage(&noise)
                .map_err(|err| PipelineError::submission("unstage noise", err))?;
        }
        self.git
            .staged_paths()
            .map_err(|err| PipelineError::submission("list staged changes", err))
    }

    /// Push through a token-bearing remote URL, restoring the original after.
    fn push(&self, request: &PatchRequest) -> Result<String, PipelineError> {
        let token = self.config.provider.token.as_deref();
        let original = self
            .git
            .remote_url(DEFAULT_REMOTE)
            .map_err(|err| PipelineError::submission("read remote url", err))?;
        let authenticated = self
            .provider
            .authenticated_remote_url()
            .map_err(|err| PipelineError::submission("build authenticated remote url", err))?;
        self.git
            .set_remote_url(DEFAULT_REMOTE, &authenticated)
            .map_err(|err| PipelineError::submission("rewrite remote url", err))?;

        let options = self.provider.push_options(request);
        let pushed = self
            .git
            .push_with_options(DEFAULT_REMOTE, &request.source_branch, &options);

        if let Err(err) = self.git.set_remote_url(DEFAULT_REMOTE, &original) {
            warn!(
                err = %redact_token(&format!("{err:#}"), token),
                "failed to restore remote url"
            );
        }

        let output = pushed.map_err(|err| {
            PipelineError::submission(
                "push submission branch",
                anyhow::anyhow!(redact_token(&format!("{err:#}"), token)),
            )
        })?;
        let output = redact_token(&output, token);
        debug!(output = %output, "push output");
        Ok(output)
    }

    fn open_patch_request(&self, request: &PatchRequest) -> Option<String> {
        match self.provider.open_patch_request(request) {
            Ok(url) => url,
            Err(err) => {
                let err = PipelineError::non_critical("open patch request", err);
                warn!(err = %err.chain_message(), "patch request not opened");
                None
            }
        }
    }

    fn post_follow_up(&self, url: &str, branch: &str) {
        let posted = self
            .templates
            .follow_up_comment(
                url,
                branch,
                Some(self.config.branches.base.as_str()),
                self.config.job_url.as_deref(),
            )
            .and_then(|body| self.provider.create_comment(&body));
        if let Err(err) = posted {
            let err = PipelineError::non_critical("post follow-up comment", err);
            warn!(err = %err.chain_message(), "follow-up comment not posted");
        }
    }
}
