//! Filesystem utility tests
//!
//! Cache purging, artifact relocation and stub discovery over real trees.

use std::fs;
use std::path::Path;

use compact_wheel::fsutil::{
    list_stub_files, purge_bytecode_cache, relocate_compiled_artifacts, remove_tree,
    ArtifactRelocator, CollisionPolicy, ExcludeRules, FsError,
};
use compact_wheel::record::{digest, DigestEncoding};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_remove_tree() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("stage");
    write(&root.join("a/b/c.txt"), "c");
    write(&root.join("d.txt"), "d");

    remove_tree(&root).unwrap();
    assert!(!root.exists());
    assert!(dir.path().exists());
}

#[test]
fn test_purge_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("pkg");
    write(&root.join("__pycache__/a.cpython-311.pyc"), "x");
    write(&root.join("sub/__pycache__/b.cpython-311.pyc"), "y");
    write(&root.join("sub/b.py"), "");

    assert_eq!(purge_bytecode_cache(&root).unwrap(), 2);
    assert!(!root.join("__pycache__").exists());
    assert!(!root.join("sub/__pycache__").exists());
    assert!(root.join("sub/b.py").exists());

    assert_eq!(purge_bytecode_cache(&root).unwrap(), 0);
}

#[test]
fn test_purge_missing_directory() {
    let dir = TempDir::new().unwrap();
    let err = purge_bytecode_cache(&dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, FsError::MissingSource(_)));
}

#[test]
fn test_relocation_strips_tags() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("src/pkg");
    write(&source.join("__init__.py"), "");
    write(&source.join("__pycache__/__init__.cpython-311.opt-2.pyc"), "init");
    write(&source.join("__pycache__/mod.cpython-311.opt-2.pyc"), "mod");
    write(&source.join("sub/__pycache__/deep.cpython-311.pyc"), "deep");

    let stage = dir.path().join("stage");
    let records =
        relocate_compiled_artifacts(&source, &stage.join("pkg"), &stage).unwrap();

    let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["pkg/__init__.pyc", "pkg/mod.pyc", "pkg/sub/deep.pyc"]);
    assert_eq!(fs::read_to_string(stage.join("pkg/sub/deep.pyc")).unwrap(), "deep");
    assert!(!stage.join("pkg/__init__.py").exists());
    assert!(!stage.join("pkg/__pycache__").exists());

    let mod_record = &records[1];
    assert_eq!(mod_record.size, Some(3));
    assert_eq!(
        mod_record.digest.as_deref(),
        Some(digest(b"mod", DigestEncoding::Hex).as_str())
    );
}

#[test]
fn test_relocation_missing_source() {
    let dir = TempDir::new().unwrap();
    let result = relocate_compiled_artifacts(
        &dir.path().join("nope"),
        &dir.path().join("out/pkg"),
        &dir.path().join("out"),
    );
    assert!(matches!(result, Err(FsError::MissingSource(_))));
}

#[test]
fn test_collision_is_an_error_by_default() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("pkg");
    write(&source.join("__pycache__/m.cpython-311.opt-2.pyc"), "optimized");
    write(&source.join("__pycache__/m.cpython-311.pyc"), "plain");

    let err = ArtifactRelocator::new(&source, dir.path().join("out/pkg"))
        .relocate()
        .unwrap_err();
    assert!(matches!(err, FsError::NameCollision { .. }));
}

#[test]
fn test_collision_last_wins() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("pkg");
    write(&source.join("__pycache__/m.cpython-311.opt-2.pyc"), "optimized");
    write(&source.join("__pycache__/m.cpython-311.pyc"), "plain");

    let dest = dir.path().join("out/pkg");
    let records = ArtifactRelocator::new(&source, &dest)
        .with_collision_policy(CollisionPolicy::LastWins)
        .relocate()
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, "pkg/m.pyc");
    assert_eq!(fs::read_to_string(dest.join("m.pyc")).unwrap(), "plain");
    assert_eq!(records[0].size, Some(5));
}

#[test]
fn test_relocation_excludes() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("pkg");
    write(&source.join("__pycache__/keep.cpython-311.pyc"), "k");
    write(&source.join("tests/__pycache__/test_x.cpython-311.pyc"), "t");
    write(&source.join("__pycache__/conftest.cpython-311.pyc"), "c");

    let excludes = ExcludeRules::with_patterns(&["tests", "conftest.pyc"]).unwrap();
    let dest = dir.path().join("out/pkg");
    let records = ArtifactRelocator::new(&source, &dest)
        .with_excludes(excludes)
        .relocate()
        .unwrap();

    let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["pkg/keep.pyc"]);
    assert!(!dest.join("tests").exists());
}

#[test]
fn test_list_stub_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("stubs");
    write(&root.join("pkg-stubs/__init__.pyi"), "");
    write(&root.join("pkg-stubs/mod.pyi"), "def f() -> int: ...\n");
    write(&root.join("pkg-stubs/notes.txt"), "ignored");

    let records =
        list_stub_files(&root.join("pkg-stubs"), &root, DigestEncoding::Base64).unwrap();
    let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["pkg-stubs/__init__.pyi", "pkg-stubs/mod.pyi"]);
    assert_eq!(
        records[0].digest.as_deref(),
        Some(digest(b"", DigestEncoding::Base64).as_str())
    );
}
