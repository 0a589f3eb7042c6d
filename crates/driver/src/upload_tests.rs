// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::object::MemObjectStore;
use sluice_core::input::FileRef;
use sluice_core::hashtree::Node;
use tempfile::TempDir;

#[test]
fn rebase_from_input_dir() {
    let rebased = rebase_link_target(
        Path::new("/pfs/in/x"),
        Path::new("/pfs"),
        Path::new("y"),
    )
    .unwrap();
    assert_eq!(rebased, Path::new("in/x"));
}

#[test]
fn rebase_prefers_output_relative_prefix() {
    // A relative target that happens to begin with the link's own
    // output-relative path rebases from that path, not the input dir.
    let rebased = rebase_link_target(
        Path::new("y/in/x"),
        Path::new("/pfs"),
        Path::new("y"),
    )
    .unwrap();
    assert_eq!(rebased, Path::new("in/x"));
}

#[test]
fn rebase_outside_both_roots_is_none() {
    let rebased = rebase_link_target(
        Path::new("/etc/passwd"),
        Path::new("/pfs"),
        Path::new("y"),
    );
    assert!(rebased.is_none());
}

#[test]
fn pfs_path_strips_input_name() {
    assert_eq!(pfs_path_of(Path::new("in/x")), "/x");
    assert_eq!(pfs_path_of(Path::new("in/a/b")), "/a/b");
    assert_eq!(pfs_path_of(Path::new("in")), "/");
}

proptest::proptest! {
    #[test]
    fn rebase_inverts_input_dir_join(segments in proptest::collection::vec("[a-z]{1,6}", 1..5)) {
        let rel: std::path::PathBuf = segments.iter().collect();
        let target = Path::new("/pfs").join(&rel);
        let rebased = rebase_link_target(&target, Path::new("/pfs"), Path::new("y")).unwrap();
        proptest::prop_assert_eq!(rebased, rel);
    }
}

/// A fabricated staging layout: `<root>/out` plus `<root>/in -> scratch/in`.
struct Staged {
    _dir: TempDir,
    input_dir: std::path::PathBuf,
    out_dir: std::path::PathBuf,
    scratch_in: std::path::PathBuf,
}

fn staged() -> Staged {
    let dir = TempDir::new().unwrap();
    let input_dir = dir.path().join("pfs");
    let scratch = input_dir.join(crate::SCRATCH_SPACE).join("d1");
    let scratch_in = scratch.join("in");
    let out_dir = input_dir.join("out");
    std::fs::create_dir_all(&scratch_in).unwrap();
    std::fs::create_dir_all(scratch.join("out")).unwrap();
    std::os::unix::fs::symlink(&scratch_in, input_dir.join("in")).unwrap();
    std::os::unix::fs::symlink(scratch.join("out"), &out_dir).unwrap();
    Staged {
        _dir: dir,
        input_dir,
        out_dir,
        scratch_in,
    }
}

fn test_inputs() -> Vec<Input> {
    vec![Input::new("in", FileRef::new("repo", "commit-1", "/x"))]
}

async fn run_upload(
    store: &MemObjectStore,
    staged: &Staged,
    inputs: &[Input],
) -> Result<(Vec<u8>, ProcessStats), DriverError> {
    let store: Arc<dyn ObjectStore> = Arc::new(store.clone());
    let stats = ProcessStats::default();
    let bytes = upload_output(&store, &staged.input_dir, "datum-tag", inputs, &stats, None).await?;
    Ok((bytes, stats))
}

#[tokio::test]
async fn regular_files_stream_into_one_block() {
    let store = MemObjectStore::new();
    let staged = staged();
    std::fs::write(staged.out_dir.join("a.txt"), b"alpha").unwrap();
    std::fs::write(staged.out_dir.join("b.txt"), b"bravo!").unwrap();

    let (bytes, stats) = run_upload(&store, &staged, &test_inputs()).await.unwrap();
    let tree = OrderedTree::deserialize(&bytes).unwrap();

    let a = tree.file("a.txt").unwrap();
    let b = tree.file("b.txt").unwrap();
    assert_eq!(a.size, 5);
    assert_eq!(b.size, 6);
    assert_eq!(a.hash, format!("{:x}", Sha256::digest(b"alpha")));

    // Lexical walk order: a.txt then b.txt, contiguous in one block.
    assert_eq!(a.block_refs.len(), 1);
    assert_eq!(b.block_refs.len(), 1);
    assert_eq!(a.block_refs[0].range.lower, 0);
    assert_eq!(a.block_refs[0].range.upper, 5);
    assert_eq!(b.block_refs[0].range.lower, 5);
    assert_eq!(b.block_refs[0].range.upper, 11);
    assert_eq!(a.block_refs[0].block, b.block_refs[0].block);

    let block_bytes = store.block_bytes(&a.block_refs[0].block).unwrap();
    assert_eq!(block_bytes, b"alphabravo!");
    assert_eq!(stats.upload_bytes(), 11);

    // The tree object is tagged with the datum tag.
    assert_eq!(store.tagged("datum-tag").unwrap(), bytes);
}

#[tokio::test]
async fn empty_directories_are_preserved() {
    let store = MemObjectStore::new();
    let staged = staged();
    std::fs::create_dir(staged.out_dir.join("logs")).unwrap();

    let (bytes, _) = run_upload(&store, &staged, &test_inputs()).await.unwrap();
    let tree = OrderedTree::deserialize(&bytes).unwrap();
    assert_eq!(tree.get("logs"), Some(&Node::Dir));
}

#[tokio::test]
async fn symlink_to_input_inherits_block_refs_without_upload() {
    let store = MemObjectStore::new();
    let staged = staged();

    // Staged input file /pfs/in/x, previously uploaded as B1[0..4).
    std::fs::write(staged.scratch_in.join("x"), b"data").unwrap();
    let seeded_hash = store.seed_repo_file(
        "repo",
        "commit-1",
        "/x",
        b"data",
        vec![BlockRef::new("B1", 0, 4)],
    );

    std::os::unix::fs::symlink(staged.input_dir.join("in/x"), staged.out_dir.join("y")).unwrap();

    let (bytes, stats) = run_upload(&store, &staged, &test_inputs()).await.unwrap();
    let tree = OrderedTree::deserialize(&bytes).unwrap();

    let y = tree.file("y").unwrap();
    assert_eq!(y.block_refs, vec![BlockRef::new("B1", 0, 4)]);
    assert_eq!(y.hash, seeded_hash);
    assert_eq!(y.size, 4);

    // Zero bytes were transmitted through the put-objects session.
    for block in store.block_ids() {
        assert_eq!(store.block_bytes(&block).unwrap().len(), 0, "block {block}");
    }
    assert_eq!(stats.upload_bytes(), 0);
}

#[tokio::test]
async fn symlinked_input_directory_folds_in_recursively() {
    let store = MemObjectStore::new();
    let staged = staged();

    let dir_input = vec![Input::new("in", FileRef::new("repo", "commit-1", "/d"))];
    std::fs::create_dir_all(staged.scratch_in.join("d/sub")).unwrap();
    std::fs::write(staged.scratch_in.join("d/one"), b"1").unwrap();
    std::fs::write(staged.scratch_in.join("d/sub/two"), b"22").unwrap();
    store.seed_repo_file("repo", "commit-1", "/d/one", b"1", vec![BlockRef::new("B1", 0, 1)]);
    store.seed_repo_file(
        "repo",
        "commit-1",
        "/d/sub/two",
        b"22",
        vec![BlockRef::new("B1", 1, 3)],
    );

    std::os::unix::fs::symlink(staged.input_dir.join("in/d"), staged.out_dir.join("linked"))
        .unwrap();

    let (bytes, stats) = run_upload(&store, &staged, &dir_input).await.unwrap();
    let tree = OrderedTree::deserialize(&bytes).unwrap();

    assert_eq!(tree.get("linked"), Some(&Node::Dir));
    assert_eq!(tree.get("linked/sub"), Some(&Node::Dir));
    assert_eq!(
        tree.file("linked/one").unwrap().block_refs,
        vec![BlockRef::new("B1", 0, 1)]
    );
    assert_eq!(
        tree.file("linked/sub/two").unwrap().block_refs,
        vec![BlockRef::new("B1", 1, 3)]
    );
    assert_eq!(stats.upload_bytes(), 0);
}

#[tokio::test]
async fn inline_object_refs_resolve_before_file_refs() {
    let store = MemObjectStore::new();
    let staged = staged();

    std::fs::write(staged.scratch_in.join("x"), b"data").unwrap();
    store.seed_object("obj-a", BlockRef::new("B9", 0, 4));
    store.seed_repo_file_with_objects(
        "repo",
        "commit-1",
        "/x",
        b"data",
        vec!["obj-a".into()],
        vec![BlockRef::new("B2", 8, 12)],
    );
    std::os::unix::fs::symlink(staged.input_dir.join("in/x"), staged.out_dir.join("y")).unwrap();

    let (bytes, _) = run_upload(&store, &staged, &test_inputs()).await.unwrap();
    let tree = OrderedTree::deserialize(&bytes).unwrap();
    assert_eq!(
        tree.file("y").unwrap().block_refs,
        vec![BlockRef::new("B9", 0, 4), BlockRef::new("B2", 8, 12)]
    );
}

#[tokio::test]
async fn symlink_outside_input_dir_uploads_dereferenced_bytes() {
    let store = MemObjectStore::new();
    let staged = staged();

    let outside = TempDir::new().unwrap();
    std::fs::write(outside.path().join("ext.txt"), b"external").unwrap();
    std::os::unix::fs::symlink(outside.path().join("ext.txt"), staged.out_dir.join("copy"))
        .unwrap();

    let (bytes, stats) = run_upload(&store, &staged, &test_inputs()).await.unwrap();
    let tree = OrderedTree::deserialize(&bytes).unwrap();

    let copy = tree.file("copy").unwrap();
    assert_eq!(copy.size, 8);
    assert_eq!(stats.upload_bytes(), 8);
    let block_bytes = store.block_bytes(&copy.block_refs[0].block).unwrap();
    assert_eq!(block_bytes, b"external");
}

#[tokio::test]
async fn fifo_in_output_is_rejected_and_nothing_is_tagged() {
    let store = MemObjectStore::new();
    let staged = staged();
    nix::unistd::mkfifo(
        &staged.out_dir.join("p"),
        nix::sys::stat::Mode::from_bits_truncate(0o666),
    )
    .unwrap();

    let err = run_upload(&store, &staged, &test_inputs()).await.unwrap_err();
    assert!(matches!(err, DriverError::SpecialFile { path } if path == "p"));
    assert!(store.tagged("datum-tag").is_none());
}

#[tokio::test]
async fn non_utf8_path_is_rejected() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let store = MemObjectStore::new();
    let staged = staged();
    let weird = staged.out_dir.join(OsStr::from_bytes(b"bad-\xff-name"));
    std::fs::write(&weird, b"x").unwrap();

    let err = run_upload(&store, &staged, &test_inputs()).await.unwrap_err();
    assert!(matches!(err, DriverError::InvalidUtf8Path { .. }));
}
