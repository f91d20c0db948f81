//! Typing stub generation driver
//!
//! Runs the stub generator for one importable package and moves its output
//! into a `{name}-stubs` package, the layout type checkers look for.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::compiler::CompileError;
use crate::fsutil::{list_stub_files, FsError};
use crate::record::{DigestEncoding, IntegrityRecord};
use crate::tool::{run_checked, ToolError};

/// Default stub generator executable
pub const DEFAULT_STUBGEN: &str = "stubgen";

/// Name of the stub-only package for an importable package
pub fn stub_package_name(importable_name: &str) -> String {
    format!("{}-stubs", importable_name)
}

/// Something that writes `.pyi` files for a package into `output_dir/{name}/`
pub trait StubGenerator {
    fn generate(&self, importable_name: &str, output_dir: &Path, quiet: bool)
        -> Result<(), ToolError>;
}

/// Generates stubs with mypy's `stubgen`
#[derive(Debug, Clone)]
pub struct Stubgen {
    program: PathBuf,
    working_dir: Option<PathBuf>,
}

impl Default for Stubgen {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_STUBGEN),
            working_dir: None,
        }
    }
}

impl Stubgen {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
        }
    }

    /// Directory the package is importable from
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl StubGenerator for Stubgen {
    fn generate(
        &self,
        importable_name: &str,
        output_dir: &Path,
        quiet: bool,
    ) -> Result<(), ToolError> {
        let mut command = Command::new(&self.program);
        command
            .args(["--package", importable_name, "--output"])
            .arg(output_dir)
            .arg("--export-less");
        if quiet {
            command.arg("--quiet");
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        run_checked(&mut command, quiet)
    }
}

/// Generate stubs into `target_dir/{name}-stubs`, returning their records.
///
/// Records are relative to `target_dir`, the root of the stub wheel tree.
pub fn compile_stubs(
    generator: &dyn StubGenerator,
    importable_name: &str,
    target_dir: &Path,
    quiet: bool,
    encoding: DigestEncoding,
) -> Result<Vec<IntegrityRecord>, CompileError> {
    if target_dir.exists() {
        return Err(FsError::DestinationExists(target_dir.to_path_buf()).into());
    }
    fs::create_dir_all(target_dir).map_err(FsError::io(target_dir))?;

    info!(package = importable_name, "generating typing stubs");
    generator.generate(importable_name, target_dir, quiet)?;

    let generated = target_dir.join(importable_name);
    if !generated.is_dir() {
        return Err(FsError::MissingStubOutput(generated).into());
    }

    let package_dir = target_dir.join(stub_package_name(importable_name));
    if package_dir.exists() {
        return Err(FsError::DestinationExists(package_dir).into());
    }
    fs::rename(&generated, &package_dir).map_err(FsError::io(&generated))?;

    Ok(list_stub_files(&package_dir, target_dir, encoding)?)
}
