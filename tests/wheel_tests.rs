//! Wheel assembly tests
//!
//! Compile with a fake compiler, assemble, and read the archive back.

mod fixtures;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use compact_wheel::compiler::{compile_package, CompileError, CompileOptions};
use compact_wheel::fsutil::FsError;
use compact_wheel::python::PythonVersion;
use compact_wheel::record::{DigestEncoding, IntegrityRecord};
use compact_wheel::stubs::compile_stubs;
use compact_wheel::tool::ToolError;
use compact_wheel::wheel::{
    verify_wheel, write_archive, WheelAssembler, WheelError, WheelKind, WheelPackage,
};
use fixtures::{
    create_project, wheel_entries, wheel_text, FakeCompiler, FakeStubgen, StaticMetadata,
};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const PY311: PythonVersion = PythonVersion::new(3, 11);

fn compact_package() -> WheelPackage {
    WheelPackage::new(
        "pkg",
        "1.0.0",
        WheelKind::Compact {
            suffix: "-compact".to_string(),
        },
    )
}

fn build_compact_wheel(dir: &Path, encoding: DigestEncoding) -> PathBuf {
    let project = create_project(dir);
    let stage = dir.join("stage");
    let options = CompileOptions {
        encoding,
        ..CompileOptions::default()
    };
    let records = compile_package(
        &FakeCompiler::default(),
        &project.join("pkg"),
        &stage.join("pkg"),
        &options,
    )
    .unwrap();

    WheelAssembler::new(&stage, dir.join("dist"), PY311)
        .with_encoding(encoding)
        .assemble(&compact_package(), &StaticMetadata::sample().0, records)
        .unwrap()
}

#[test]
fn test_compact_wheel_layout() {
    let dir = TempDir::new().unwrap();
    let wheel = build_compact_wheel(dir.path(), DigestEncoding::Hex);

    assert_eq!(
        wheel.file_name().unwrap().to_string_lossy(),
        "pkg_compact-1.0.0-py311-none-any.whl"
    );
    assert!(wheel.is_absolute());
    assert!(!dir.path().join("dist/pkg_compact-1.0.0-py311-none-any.zip").exists());

    assert_eq!(
        wheel_entries(&wheel),
        vec![
            "pkg/__init__.pyc",
            "pkg/mod.pyc",
            "pkg_compact-1.0.0.dist-info/METADATA",
            "pkg_compact-1.0.0.dist-info/WHEEL",
            "pkg_compact-1.0.0.dist-info/RECORD",
        ]
    );

    let record = wheel_text(&wheel, "pkg_compact-1.0.0.dist-info/RECORD");
    let lines: Vec<&str> = record.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("pkg/__init__.pyc,sha256="));
    assert!(lines[1].starts_with("pkg/mod.pyc,sha256="));
    assert!(lines[1].ends_with(",12"));
    assert_eq!(lines[4], "pkg_compact-1.0.0.dist-info/RECORD,,");
    assert!(record.ends_with('\n'));
}

#[test]
fn test_compact_wheel_metadata_and_tag() {
    let dir = TempDir::new().unwrap();
    let wheel = build_compact_wheel(dir.path(), DigestEncoding::Hex);

    let metadata = wheel_text(&wheel, "pkg_compact-1.0.0.dist-info/METADATA");
    assert_eq!(
        metadata,
        "Metadata-Version: 2.1\nName: pkg\nVersion: 1.0.0\nSummary: Sample package\n\
         Requires-Dist: foo (>=1.0,<2.0)\nRequires-Dist: bar[fast] (>=2.1,<2.2)\n"
    );

    let descriptor = wheel_text(&wheel, "pkg_compact-1.0.0.dist-info/WHEEL");
    assert!(descriptor.contains("Wheel-Version: 1.0\n"));
    assert!(descriptor.contains("Root-Is-Purelib: true\n"));
    assert!(descriptor.ends_with("Tag: py311-none-any\n"));
}

#[test]
fn test_built_wheel_verifies() {
    let dir = TempDir::new().unwrap();
    let wheel = build_compact_wheel(dir.path(), DigestEncoding::Hex);

    let report = verify_wheel(&wheel).unwrap();
    assert_eq!(report.record_path, "pkg_compact-1.0.0.dist-info/RECORD");
    assert_eq!(report.verified, 4);
}

#[test]
fn test_base64_wheel_verifies() {
    let dir = TempDir::new().unwrap();
    let wheel = build_compact_wheel(dir.path(), DigestEncoding::Base64);

    let record = wheel_text(&wheel, "pkg_compact-1.0.0.dist-info/RECORD");
    let first = IntegrityRecord::parse(record.lines().next().unwrap()).unwrap();
    assert_eq!(
        DigestEncoding::detect(first.digest.as_deref().unwrap()),
        DigestEncoding::Base64
    );
    assert_eq!(verify_wheel(&wheel).unwrap().verified, 4);
}

/// Rewrite a wheel, replacing or adding entries
fn rewrite_wheel(source: &Path, dest: &Path, replace: &[(&str, &str)]) {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(fs::File::open(source).unwrap()).unwrap();
    let mut writer = zip::ZipWriter::new(fs::File::create(dest).unwrap());
    let options = SimpleFileOptions::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let name = entry.name().to_string();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        if let Some((_, new)) = replace.iter().find(|(n, _)| *n == name) {
            content = new.as_bytes().to_vec();
        }
        writer.start_file(name, options).unwrap();
        writer.write_all(&content).unwrap();
    }
    for (name, content) in replace {
        if archive.by_name(name).is_err() {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap();
}

#[test]
fn test_tampered_wheel_rejected() {
    let dir = TempDir::new().unwrap();
    let wheel = build_compact_wheel(dir.path(), DigestEncoding::Hex);

    let tampered = dir.path().join("tampered.whl");
    rewrite_wheel(&wheel, &tampered, &[("pkg/mod.pyc", "bytecode:evil")]);

    let err = verify_wheel(&tampered).unwrap_err();
    assert!(matches!(err, WheelError::RecordMismatch(path) if path == "pkg/mod.pyc"));
}

#[test]
fn test_unrecorded_file_rejected() {
    let dir = TempDir::new().unwrap();
    let wheel = build_compact_wheel(dir.path(), DigestEncoding::Hex);

    let extended = dir.path().join("extended.whl");
    rewrite_wheel(&wheel, &extended, &[("pkg/extra.py", "print('hi')")]);

    let err = verify_wheel(&extended).unwrap_err();
    assert!(matches!(err, WheelError::Unrecorded(path) if path == "pkg/extra.py"));
}

#[test]
fn test_stub_wheel_scenario() {
    let dir = TempDir::new().unwrap();
    let project = create_project(dir.path());
    let stage = dir.path().join("stubs");

    let records = compile_stubs(
        &FakeStubgen::new(&project),
        "pkg",
        &stage,
        true,
        DigestEncoding::Hex,
    )
    .unwrap();

    assert!(stage.join("pkg-stubs/mod.pyi").exists());
    assert!(!stage.join("pkg").exists());
    let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["pkg-stubs/__init__.pyi", "pkg-stubs/mod.pyi"]);

    let package = WheelPackage::new(
        "pkg",
        "1.0.0",
        WheelKind::Stubs {
            importable_name: "pkg".to_string(),
        },
    );
    let wheel = WheelAssembler::new(&stage, dir.path().join("dist"), PY311)
        .assemble(&package, &StaticMetadata::sample().0, records)
        .unwrap();

    assert_eq!(
        wheel.file_name().unwrap().to_string_lossy(),
        "pkg_stubs-1.0.0-py311-none-any.whl"
    );
    let metadata = wheel_text(&wheel, "pkg_stubs-1.0.0.dist-info/METADATA");
    assert!(metadata.contains("Name: pkg-stubs\n"));
    assert!(metadata.contains("Summary: Sample package typing stubs\n"));
    assert!(!metadata.contains("Name: pkg\n"));
    assert_eq!(verify_wheel(&wheel).unwrap().verified, 4);
}

#[test]
fn test_missing_stub_output() {
    let dir = TempDir::new().unwrap();
    let project = create_project(dir.path());
    let generator = FakeStubgen {
        source_root: project,
        silent: true,
    };

    let err = compile_stubs(&generator, "pkg", &dir.path().join("stubs"), true, DigestEncoding::Hex)
        .unwrap_err();
    assert!(matches!(err, CompileError::Fs(FsError::MissingStubOutput(_))));
}

#[test]
fn test_stub_target_must_not_exist() {
    let dir = TempDir::new().unwrap();
    let project = create_project(dir.path());
    let stage = dir.path().join("stubs");
    fs::create_dir_all(&stage).unwrap();

    let err = compile_stubs(&FakeStubgen::new(&project), "pkg", &stage, true, DigestEncoding::Hex)
        .unwrap_err();
    assert!(matches!(err, CompileError::Fs(FsError::DestinationExists(_))));
}

#[test]
fn test_compile_target_must_not_exist() {
    let dir = TempDir::new().unwrap();
    let project = create_project(dir.path());
    let target = dir.path().join("stage/pkg");
    fs::create_dir_all(&target).unwrap();

    let err = compile_package(
        &FakeCompiler::default(),
        &project.join("pkg"),
        &target,
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Fs(FsError::DestinationExists(_))));
}

#[test]
fn test_compiler_failure_policy() {
    let dir = TempDir::new().unwrap();
    let project = create_project(dir.path());
    let failing = FakeCompiler { fail: true };

    let err = compile_package(
        &failing,
        &project.join("pkg"),
        &dir.path().join("stage/pkg"),
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Tool(ToolError::ExternalToolFailed { .. })
    ));

    let options = CompileOptions {
        ignore_compile_errors: true,
        ..CompileOptions::default()
    };
    let records = compile_package(
        &failing,
        &project.join("pkg"),
        &dir.path().join("stage2/pkg"),
        &options,
    )
    .unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn test_archive_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("stage");
    fs::create_dir_all(root.join("pkg")).unwrap();
    fs::write(root.join("pkg/a.pyc"), b"aaaa").unwrap();

    let first = dir.path().join("first.zip");
    let second = dir.path().join("second.zip");
    let when = zip::DateTime::from_date_and_time(2024, 1, 2, 3, 4, 6).unwrap();
    write_archive(&root, &["pkg/a.pyc"], &first, when).unwrap();
    write_archive(&root, &["pkg/a.pyc"], &second, when).unwrap();

    assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
}
