//! Branch reconciler, change classifier and submitter against real git.

use chrono::{TimeZone, Utc};

use pipeline::branch::reconcile_branch;
use pipeline::classify::classify;
use pipeline::error::PipelineError;
use pipeline::io::command::{CommandOutput, ProcessRunner};
use pipeline::io::git::Git;
use pipeline::io::templates::Templates;
use pipeline::submit::{SubmitOutcome, Submitter};
use pipeline::test_support::{
    RecordingProvider, ScriptedRunner, TEST_PROJECT_PATH, TestRepo, config_for,
};

#[test]
fn reconcile_is_idempotent_on_checked_out_branch() {
    let repo = TestRepo::new().expect("repo");
    let runner = ProcessRunner;
    let git = Git::new(repo.path(), &runner);

    let first = reconcile_branch(&git, "main", Some(TEST_PROJECT_PATH)).expect("first");
    let second = reconcile_branch(&git, "main", Some(TEST_PROJECT_PATH)).expect("second");
    assert_eq!(first, second);
    assert_eq!(second.current_branch, "main");
    assert_eq!(second.project_dir, repo.path());
}

#[test]
fn reconcile_creates_branch_missing_on_remote() {
    let repo = TestRepo::new().expect("repo");
    let runner = ProcessRunner;
    let git = Git::new(repo.path(), &runner);

    let context = reconcile_branch(&git, "claude/new-work", None).expect("reconcile");
    assert_eq!(context.current_branch, "claude/new-work");
    assert_eq!(repo.current_branch().expect("branch"), "claude/new-work");

    reconcile_branch(&git, "claude/new-work", None).expect("second call is a no-op");
    assert_eq!(repo.remote_branches().expect("branches"), vec!["main"]);
}

#[test]
fn reconcile_checks_out_remote_only_branch() {
    let repo = TestRepo::new().expect("repo");
    repo.git(&["checkout", "-q", "-b", "feature/remote"]).expect("branch");
    repo.write("feature.txt", "from remote\n").expect("write");
    repo.git(&["add", "feature.txt"]).expect("add");
    repo.git(&["commit", "-q", "-m", "feature"]).expect("commit");
    repo.git(&["push", "-q", "origin", "feature/remote"]).expect("push");
    repo.git(&["checkout", "-q", "main"]).expect("checkout main");
    repo.git(&["branch", "-q", "-D", "feature/remote"]).expect("delete local");
    assert!(!repo.path().join("feature.txt").exists());

    let runner = ProcessRunner;
    let git = Git::new(repo.path(), &runner);
    let context = reconcile_branch(&git, "feature/remote", Some(TEST_PROJECT_PATH)).expect("reconcile");
    assert_eq!(context.current_branch, "feature/remote");
    assert!(repo.path().join("feature.txt").exists());
}

#[test]
fn reconcile_rejects_unexpected_remote() {
    let repo = TestRepo::new().expect("repo");
    let runner = ProcessRunner;
    let git = Git::new(repo.path(), &runner);

    let err = reconcile_branch(&git, "main", Some("other/project")).unwrap_err();
    assert!(matches!(err, PipelineError::ContextMismatch { .. }));
    assert!(err.aborts_eagerly());
}

#[test]
fn reconcile_reports_missing_project_dir() {
    let repo = TestRepo::new().expect("repo");
    let missing = repo.temp_dir().join("nope");
    let runner = ProcessRunner;
    let git = Git::new(&missing, &runner);

    let err = reconcile_branch(&git, "main", None).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration { .. }));
}

#[test]
fn noise_only_tree_has_no_substantive_change() {
    let repo = TestRepo::new().expect("repo");
    repo.write("notes.log", "tracked log\n").expect("write");
    repo.git(&["add", "notes.log"]).expect("add");
    repo.git(&["commit", "-q", "-m", "track a log"]).expect("commit");

    repo.write("notes.log", "changed\n").expect("modify tracked noise");
    repo.write("output.txt", "x\n").expect("write");
    repo.write(".claude/cache/state.json", "{}\n").expect("write");
    repo.write("draft.md~", "backup\n").expect("write");

    let config = repo.config();
    let rules = config.noise_rules().expect("rules");
    let runner = ProcessRunner;
    let git = Git::new(repo.path(), &runner);

    let classification = classify(&git, &rules).expect("classify");
    assert!(!classification.has_substantive_change());
    let mut removed = classification.removed.clone();
    removed.sort();
    assert_eq!(
        removed,
        vec![".claude/cache/state.json", "draft.md~", "output.txt"]
    );
    // Tracked noise is reported but never deleted.
    assert!(repo.path().join("notes.log").exists());
    assert_eq!(classification.changes.noise.len(), 1);

    repo.write("src/lib.rs", "pub fn f() {}\n").expect("write");
    let classification = classify(&git, &rules).expect("classify");
    assert!(classification.has_substantive_change());
    assert_eq!(classification.changes.substantive[0].path, "src/lib.rs");
}

#[test]
fn scripted_status_with_temp_paths_is_not_substantive() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("output.txt"), "x\n").expect("write");
    let config = config_for(temp.path(), temp.path());
    let rules = config.noise_rules().expect("rules");
    let runner = ScriptedRunner::default().on(
        "git status",
        CommandOutput::ok("?? output.txt\0?? /tmp/claude-output/x.json\0"),
    );
    let git = Git::new(temp.path(), &runner);

    let classification = classify(&git, &rules).expect("classify");
    assert!(!classification.has_substantive_change());
    assert_eq!(classification.changes.entries.len(), 2);
    assert_eq!(classification.changes.noise.len(), 2);
    assert_eq!(classification.removed, vec!["output.txt"]);
    assert!(!temp.path().join("output.txt").exists());
}

#[test]
fn non_ascii_noise_is_removed_and_never_committed() {
    let repo = TestRepo::new().expect("repo");
    repo.write("café.log", "noise\n").expect("write");
    repo.write("naïve/ü.tmp", "noise\n").expect("write");

    let config = repo.config();
    let rules = config.noise_rules().expect("rules");
    let runner = ProcessRunner;
    let git = Git::new(repo.path(), &runner);
    let classification = classify(&git, &rules).expect("classify");
    let mut removed = classification.removed.clone();
    removed.sort();
    assert_eq!(removed, vec!["café.log", "naïve/ü.tmp"]);
    assert!(!repo.path().join("café.log").exists());
    assert!(!classification.has_substantive_change());

    // Noise that reappears after cleanup must still stay out of the commit.
    repo.write("café.log", "again\n").expect("write");
    repo.write("src/ok.rs", "pub fn ok() {}\n").expect("write");
    let templates = Templates::new().expect("templates");
    let provider = RecordingProvider::default()
        .with_remote_url(repo.remote_path().display().to_string());
    let submitter = Submitter::new(&config, git, &provider, &rules, &templates);
    let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single().expect("time");
    submitter.submit(None, now).expect("submit");

    let branch = "claude/mr-5-20250102-030405";
    assert_eq!(repo.remote_tip_files(branch).expect("files"), vec!["src/ok.rs"]);
}

#[test]
fn submitter_never_commits_noise_only_changes() {
    let repo = TestRepo::new().expect("repo");
    repo.write("build.log", "noise\n").expect("write");
    repo.write(".cache/tool/index", "noise\n").expect("write");

    let config = repo.config();
    let rules = config.noise_rules().expect("rules");
    let templates = Templates::new().expect("templates");
    let provider = RecordingProvider::default()
        .with_remote_url(repo.remote_path().display().to_string());
    let runner = ProcessRunner;
    let submitter = Submitter::new(
        &config,
        Git::new(repo.path(), &runner),
        &provider,
        &rules,
        &templates,
    );

    let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single().expect("time");
    let outcome = submitter.submit(Some(7), now).expect("submit");
    assert_eq!(outcome, SubmitOutcome::NothingToCommit);
    assert_eq!(repo.commit_count().expect("count"), 1);
    assert_eq!(repo.remote_branches().expect("branches"), vec!["main"]);
    assert!(provider.calls().is_empty());
    assert_eq!(repo.git(&["diff", "--cached", "--name-only"]).expect("diff"), "");
}

#[test]
fn submitter_reuses_supplied_branch_across_runs() {
    let repo = TestRepo::new().expect("repo");
    let mut config = repo.config();
    config.branches.source_override = Some("feature/assist".to_string());
    let rules = config.noise_rules().expect("rules");
    let templates = Templates::new().expect("templates");
    let provider = RecordingProvider::default()
        .with_remote_url(repo.remote_path().display().to_string());
    let runner = ProcessRunner;
    let submitter = Submitter::new(
        &config,
        Git::new(repo.path(), &runner),
        &provider,
        &rules,
        &templates,
    );
    let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single().expect("time");

    repo.write("a.txt", "one\n").expect("write");
    let first = submitter.submit(None, now).expect("first submit");
    repo.write("b.txt", "two\n").expect("write");
    let second = submitter.submit(None, now).expect("second submit");

    for outcome in [first, second] {
        assert_eq!(
            outcome,
            SubmitOutcome::Submitted {
                branch: "feature/assist".to_string(),
                url: None,
            }
        );
    }
    assert_eq!(repo.current_branch().expect("branch"), "feature/assist");
    assert_eq!(repo.commit_count().expect("count"), 3);
    assert_eq!(
        repo.remote_tip_files("feature/assist").expect("files"),
        vec!["b.txt"]
    );
}

#[test]
fn submitter_refuses_foreign_repository() {
    let repo = TestRepo::new().expect("repo");
    repo.write("a.txt", "one\n").expect("write");
    let mut config = repo.config();
    config.provider.project_path = Some("other/project".to_string());
    let rules = config.noise_rules().expect("rules");
    let templates = Templates::new().expect("templates");
    let provider = RecordingProvider::default();
    let runner = ProcessRunner;
    let submitter = Submitter::new(
        &config,
        Git::new(repo.path(), &runner),
        &provider,
        &rules,
        &templates,
    );

    let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single().expect("time");
    let err = submitter.submit(None, now).unwrap_err();
    assert!(matches!(err, PipelineError::ContextMismatch { .. }));
    assert_eq!(repo.commit_count().expect("count"), 1);
    assert_eq!(repo.current_branch().expect("branch"), "main");
}

#[test]
fn submitter_refuses_to_branch_off_unexpected_head() {
    let repo = TestRepo::new().expect("repo");
    repo.git(&["checkout", "-q", "-b", "unrelated"]).expect("checkout");
    repo.write("src/fix.rs", "pub fn fixed() {}\n").expect("write");

    let config = repo.config();
    assert_eq!(config.branches.working, "main");
    let rules = config.noise_rules().expect("rules");
    let templates = Templates::new().expect("templates");
    let provider = RecordingProvider::default()
        .with_remote_url(repo.remote_path().display().to_string());
    let runner = ProcessRunner;
    let submitter = Submitter::new(
        &config,
        Git::new(repo.path(), &runner),
        &provider,
        &rules,
        &templates,
    );

    let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single().expect("time");
    let err = submitter.submit(None, now).unwrap_err();
    assert!(matches!(err, PipelineError::ContextMismatch { .. }));
    assert!(err.to_string().contains("unrelated"));
    assert_eq!(repo.current_branch().expect("branch"), "unrelated");
    assert_eq!(repo.remote_branches().expect("branches"), vec!["main"]);
    assert_eq!(repo.commit_count().expect("count"), 1);
}
