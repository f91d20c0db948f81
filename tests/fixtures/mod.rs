//! Test fixtures shared by the integration tests
//!
//! Fake collaborators stand in for the interpreter, stub generator and
//! installer so builds run without Python installed.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use compact_wheel::compiler::{BytecodeCompiler, OptimizationLevel};
use compact_wheel::metadata::{CoreMetadata, MetadataError, MetadataProvider};
use compact_wheel::project::Installer;
use compact_wheel::stubs::StubGenerator;
use compact_wheel::tool::ToolError;
use walkdir::WalkDir;

pub const PYPROJECT: &str = r#"[tool.poetry]
name = "pkg"
version = "1.0.0"
description = "Sample package"
authors = ["Jane Doe <jane@example.com>"]

[tool.poetry.dependencies]
python = "^3.10"
foo = "^1.0"
bar = { version = "~2.1", extras = ["fast"] }
"#;

/// Project with `pkg/__init__.py`, `pkg/mod.py`, a manifest and a lock file
pub fn create_project(dir: &Path) -> PathBuf {
    let project = dir.join("project");
    fs::create_dir_all(project.join("pkg")).unwrap();
    fs::write(project.join("pkg/__init__.py"), "").unwrap();
    fs::write(project.join("pkg/mod.py"), "def f():\n    return 1\n").unwrap();
    fs::write(project.join("pyproject.toml"), PYPROJECT).unwrap();
    fs::write(project.join("poetry.lock"), "# lock\n").unwrap();
    project
}

fn python_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "py"))
        .collect()
}

/// Writes `__pycache__/{stem}.cpython-311[.opt-2].pyc` beside every source
#[derive(Debug, Default)]
pub struct FakeCompiler {
    /// Report failure after compiling
    pub fail: bool,
}

impl BytecodeCompiler for FakeCompiler {
    fn compile(
        &self,
        source_dir: &Path,
        optimization: OptimizationLevel,
        _quiet: bool,
    ) -> Result<(), ToolError> {
        for source in python_files(source_dir) {
            let cache = source.parent().unwrap().join("__pycache__");
            fs::create_dir_all(&cache).unwrap();
            let stem = source.file_stem().unwrap().to_string_lossy();
            let name = match optimization {
                OptimizationLevel::Optimized => format!("{}.cpython-311.opt-2.pyc", stem),
                OptimizationLevel::Debug => format!("{}.cpython-311.pyc", stem),
            };
            fs::write(cache.join(name), format!("bytecode:{}", stem)).unwrap();
        }

        if self.fail {
            return Err(ToolError::ExternalToolFailed {
                tool: "python".to_string(),
                code: Some(1),
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

/// Writes a `.pyi` for every `.py` of the package found under `source_root`
#[derive(Debug)]
pub struct FakeStubgen {
    pub source_root: PathBuf,
    /// Succeed without writing anything
    pub silent: bool,
}

impl FakeStubgen {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            silent: false,
        }
    }
}

impl StubGenerator for FakeStubgen {
    fn generate(
        &self,
        importable_name: &str,
        output_dir: &Path,
        _quiet: bool,
    ) -> Result<(), ToolError> {
        if self.silent {
            return Ok(());
        }
        let package = self.source_root.join(importable_name);
        for source in python_files(&package) {
            let relative = source.strip_prefix(&package).unwrap().with_extension("pyi");
            let target = output_dir.join(importable_name).join(relative);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, "def f() -> int: ...\n").unwrap();
        }
        Ok(())
    }
}

/// Returns the same metadata for any distribution
#[derive(Debug, Clone)]
pub struct StaticMetadata(pub CoreMetadata);

impl StaticMetadata {
    pub fn sample() -> Self {
        Self(
            CoreMetadata::new()
                .with("Metadata-Version", "2.1")
                .with("Name", "pkg")
                .with("Version", "1.0.0")
                .with("Summary", "Sample package")
                .with("Requires-Dist", "foo (>=1.0,<2.0)")
                .with("Requires-Dist", "bar[fast] (>=2.1,<2.2)"),
        )
    }
}

impl MetadataProvider for StaticMetadata {
    fn metadata(&self, _distribution_name: &str) -> Result<CoreMetadata, MetadataError> {
        Ok(self.0.clone())
    }
}

/// Records installer calls; optionally fails to lock
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    pub calls: RefCell<Vec<String>>,
    pub fail_lock: bool,
}

impl RecordingInstaller {
    pub fn failing() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail_lock: true,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Installer for RecordingInstaller {
    fn lock(&self, _project_dir: &Path) -> Result<(), ToolError> {
        self.calls.borrow_mut().push("lock".to_string());
        if self.fail_lock {
            return Err(ToolError::ExternalToolFailed {
                tool: "poetry".to_string(),
                code: Some(1),
                stderr: "resolution failed".to_string(),
            });
        }
        Ok(())
    }

    fn sync(&self, _project_dir: &Path) -> Result<(), ToolError> {
        self.calls.borrow_mut().push("sync".to_string());
        Ok(())
    }
}

/// Archive entry names of a wheel, in order
pub fn wheel_entries(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Read one entry of a wheel as text
pub fn wheel_text(path: &Path, name: &str) -> String {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut content = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    content
}
