//! CLI tests for `loopguard guard`, `select`, and `status`.
//!
//! Spawns the loopguard binary against scratch git repositories and checks
//! that each violation maps to its fixed exit code.

use std::fs;
use std::process::{Command, Output};

use loopguard::core::stories::StoryStatus;
use loopguard::exit_codes;
use loopguard::test_support::{TestRepo, story};

fn loopguard(repo: &TestRepo, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_loopguard"))
        .current_dir(repo.path())
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run loopguard")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

#[test]
fn clean_worktree_passes() {
    let repo = TestRepo::new().expect("repo");
    let out = loopguard(&repo, &["guard"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&out), "policy passed: 0 files, 0 lines changed");
}

#[test]
fn small_change_passes() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("src/lib.rs", "pub fn a() {}\n").expect("write");
    repo.write_file("README.md", "scratch repo\nmore\n").expect("write");
    let out = loopguard(&repo, &["guard"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&out), "policy passed: 2 files, 2 lines changed");
}

#[test]
fn thirteen_files_exceed_the_limit_of_twelve() {
    let repo = TestRepo::new().expect("repo");
    for i in 0..13 {
        repo.write_file(&format!("src/f{i}.rs"), "x\n").expect("write");
    }
    let out = loopguard(&repo, &["guard"]);
    assert_eq!(out.status.code(), Some(exit_codes::TOO_MANY_FILES));
    assert!(stdout(&out).contains("13 > 12"), "{}", stdout(&out));
}

#[test]
fn denied_path_is_reported() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file(".github/workflows/ci.yml", "on: push\n")
        .expect("write");
    let out = loopguard(&repo, &["guard"]);
    assert_eq!(out.status.code(), Some(exit_codes::DENIED_PATH_MODIFIED));
    assert!(stdout(&out).contains(".github/workflows/ci.yml"));
}

#[test]
fn path_outside_allowlist_uses_custom_policy() {
    let repo = TestRepo::new().expect("repo");
    let policy_dir = tempfile::tempdir().expect("tempdir");
    let policy_path = policy_dir.path().join("policy.json");
    fs::write(
        &policy_path,
        r#"{
  "iteration": {"maxFilesChanged": 5, "maxLinesChanged": 100},
  "scope": {"allowPaths": ["src/"], "denyPaths": []},
  "dependencies": {"allowDependencyChanges": false}
}"#,
    )
    .expect("write policy");
    repo.write_file("src/ok.rs", "ok\n").expect("write");
    repo.write_file("docs/guide.md", "guide\n").expect("write");

    let out = loopguard(
        &repo,
        &["guard", "--policy", policy_path.to_str().expect("utf-8 path")],
    );
    assert_eq!(out.status.code(), Some(exit_codes::PATH_OUTSIDE_ALLOWLIST));
    assert!(stdout(&out).contains("docs/guide.md"));
    assert!(!stdout(&out).contains("src/ok.rs"));
}

#[test]
fn dependency_manifest_change_is_forbidden() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("Cargo.toml", "[package]\nname = \"x\"\n")
        .expect("write");
    let out = loopguard(&repo, &["guard"]);
    assert_eq!(
        out.status.code(),
        Some(exit_codes::DEPENDENCY_CHANGE_FORBIDDEN)
    );
}

#[test]
fn too_many_lines_is_last_and_verbose_logs_suppressed_checks() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("src/big.rs", &"line\n".repeat(401))
        .expect("write");

    let out = loopguard(&repo, &["guard"]);
    assert_eq!(out.status.code(), Some(exit_codes::TOO_MANY_LINES_CHANGED));
    assert!(stdout(&out).contains("401 > 400"));

    repo.write_file("package.json", "{}\n").expect("write");
    let quiet = loopguard(&repo, &["guard"]);
    let verbose = loopguard(&repo, &["guard", "--verbose"]);
    assert_eq!(
        quiet.status.code(),
        Some(exit_codes::DEPENDENCY_CHANGE_FORBIDDEN)
    );
    assert_eq!(verbose.status.code(), quiet.status.code());
    assert_eq!(stdout(&verbose), stdout(&quiet));
    let stderr = String::from_utf8_lossy(&verbose.stderr);
    assert!(stderr.contains("TooManyLinesChanged"), "{stderr}");
}

#[test]
fn relative_policy_is_read_from_root_not_cwd() {
    let repo = TestRepo::new().expect("repo");
    let elsewhere = tempfile::tempdir().expect("tempdir");
    repo.write_file(".github/workflows/ci.yml", "on: push\n")
        .expect("write");

    let out = Command::new(env!("CARGO_BIN_EXE_loopguard"))
        .current_dir(elsewhere.path())
        .env_remove("RUST_LOG")
        .arg("--root")
        .arg(repo.path())
        .args(["guard", "--policy", ".loop/constraints.toml"])
        .output()
        .expect("run loopguard");
    assert_eq!(out.status.code(), Some(exit_codes::DENIED_PATH_MODIFIED));
}

#[test]
fn missing_policy_is_a_config_error() {
    let repo = TestRepo::new().expect("repo");
    fs::remove_file(repo.paths().policy_path).expect("remove");
    let out = loopguard(&repo, &["guard"]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&out.stderr).contains("config error"));
}

#[test]
fn select_prints_next_story_then_reports_complete() {
    let repo = TestRepo::new().expect("repo");
    repo.write_stories(&[story("a", StoryStatus::Done), story("b", StoryStatus::Todo)])
        .expect("stories");
    let out = loopguard(&repo, &["select"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&out), "b");

    repo.write_stories(&[story("a", StoryStatus::Done)])
        .expect("stories");
    let out = loopguard(&repo, &["select"]);
    assert_eq!(out.status.code(), Some(exit_codes::COMPLETE));
}

#[test]
fn status_and_resume_round_trip_the_pause_flag() {
    let repo = TestRepo::new().expect("repo");
    let contract = repo.paths().contract_path;
    let text = fs::read_to_string(&contract).expect("read");
    fs::write(&contract, text.replace("PAUSED=false", "PAUSED=true")).expect("write");

    let out = loopguard(&repo, &["status"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(stdout(&out).contains("paused: true"));

    let out = loopguard(&repo, &["run", "--run-ref", "ci-1"]);
    assert_eq!(out.status.code(), Some(exit_codes::PAUSED));

    let out = loopguard(&repo, &["resume"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(fs::read_to_string(&contract).expect("read").contains("PAUSED=false"));
}
