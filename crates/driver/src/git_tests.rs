// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::object::MemObjectStore;
use sluice_core::input::FileRef;
use tempfile::TempDir;

fn payload_input(store: &MemObjectStore, payload: &str) -> Input {
    store.seed_repo_file("hooks", "c1", "/push.json", payload.as_bytes(), vec![]);
    Input {
        name: "src".into(),
        file: FileRef::new("hooks", "c1", "/push.json"),
        lazy: false,
        empty_files: false,
        git_url: Some("ignored-marker".into()),
    }
}

async fn stage(store: &MemObjectStore, scratch: &Path, input: &Input) -> Result<(), DriverError> {
    let store: Arc<dyn ObjectStore> = Arc::new(store.clone());
    download_git_data(&store, scratch, input).await
}

/// Create a local upstream repo with one commit; returns (dir, head sha).
fn upstream() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path();
    let run = |args: &[&str]| {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(path)
            .env("GIT_AUTHOR_NAME", "t")
            .env("GIT_AUTHOR_EMAIL", "t@t")
            .env("GIT_COMMITTER_NAME", "t")
            .env("GIT_COMMITTER_EMAIL", "t@t")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {args:?}: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    };
    run(&["init", "-b", "master", "."]);
    std::fs::write(path.join("hello.txt"), "hello\n").unwrap();
    run(&["add", "."]);
    run(&["commit", "-m", "initial"]);
    let sha = run(&["rev-parse", "HEAD"]);
    (dir, sha)
}

#[test]
fn branch_from_ref_strips_known_prefixes() {
    assert_eq!(branch_from_ref("refs/heads/master"), "master");
    assert_eq!(branch_from_ref("refs/tags/v1.0"), "v1.0");
    assert_eq!(branch_from_ref("feature"), "feature");
}

#[tokio::test]
async fn missing_payload_fields_are_hard_errors() {
    let store = MemObjectStore::new();
    let scratch = TempDir::new().unwrap();

    let cases = [
        (r#"{"ref": "refs/heads/m", "after": "abc"}"#, "upstream URL"),
        (
            r#"{"repository": {"clone_url": "u"}, "after": "abc"}"#,
            "updated ref",
        ),
        (
            r#"{"repository": {"clone_url": "u"}, "ref": "refs/heads/m"}"#,
            "commit SHA",
        ),
    ];
    for (payload, field) in cases {
        let input = payload_input(&store, payload);
        let err = stage(&store, scratch.path(), &input).await.unwrap_err();
        match err {
            DriverError::GitPayloadField { field: actual } => assert_eq!(actual, field),
            other => panic!("expected GitPayloadField, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn clones_and_pins_the_pushed_sha() {
    let (remote, sha) = upstream();
    let store = MemObjectStore::new();
    let payload = format!(
        r#"{{"repository": {{"clone_url": "{}"}}, "ref": "refs/heads/master", "after": "{sha}"}}"#,
        remote.path().display()
    );
    let input = payload_input(&store, &payload);
    let scratch = TempDir::new().unwrap();

    stage(&store, scratch.path(), &input).await.unwrap();
    let staged = scratch.path().join("src/hello.txt");
    assert_eq!(std::fs::read_to_string(staged).unwrap(), "hello\n");
}

#[tokio::test]
async fn unknown_sha_is_rejected_and_names_the_sha() {
    let (remote, _) = upstream();
    let bogus = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
    let store = MemObjectStore::new();
    let payload = format!(
        r#"{{"repository": {{"clone_url": "{}"}}, "ref": "refs/heads/master", "after": "{bogus}"}}"#,
        remote.path().display()
    );
    let input = payload_input(&store, &payload);
    let scratch = TempDir::new().unwrap();

    let err = stage(&store, scratch.path(), &input).await.unwrap_err();
    assert!(err.to_string().contains(bogus), "error was: {err}");
}

#[tokio::test]
async fn unknown_ref_is_a_fetch_error() {
    let (remote, sha) = upstream();
    let store = MemObjectStore::new();
    let payload = format!(
        r#"{{"repository": {{"clone_url": "{}"}}, "ref": "refs/heads/nope", "after": "{sha}"}}"#,
        remote.path().display()
    );
    let input = payload_input(&store, &payload);
    let scratch = TempDir::new().unwrap();

    let err = stage(&store, scratch.path(), &input).await.unwrap_err();
    assert!(matches!(err, DriverError::GitFetch { .. }));
}
