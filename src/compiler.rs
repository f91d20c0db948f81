//! Bytecode compilation driver
//!
//! Compiles a source tree with the host interpreter and moves the compiled
//! files out of their cache directories into an importable package layout.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fsutil::{
    purge_bytecode_cache, ArtifactRelocator, CollisionPolicy, ExcludeRules, FsError,
};
use crate::python::Interpreter;
use crate::record::{DigestEncoding, IntegrityRecord};
use crate::tool::{run_checked, ToolError};

/// Errors for compilation
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Bytecode optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Keep assertions and docstrings (level 0)
    Debug,
    /// Strip assertions and docstrings (level 2)
    #[default]
    Optimized,
}

impl OptimizationLevel {
    pub fn from_optimize(optimize: bool) -> Self {
        if optimize {
            OptimizationLevel::Optimized
        } else {
            OptimizationLevel::Debug
        }
    }

    /// Numeric level understood by the interpreter
    pub fn level(self) -> u8 {
        match self {
            OptimizationLevel::Debug => 0,
            OptimizationLevel::Optimized => 2,
        }
    }
}

/// Something that compiles a source tree in place, writing bytecode caches
/// beside each source file
pub trait BytecodeCompiler {
    fn compile(
        &self,
        source_dir: &Path,
        optimization: OptimizationLevel,
        quiet: bool,
    ) -> Result<(), ToolError>;
}

/// Compiles with `python -m compileall`
#[derive(Debug, Clone)]
pub struct PythonCompiler {
    interpreter: Interpreter,
}

impl PythonCompiler {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }
}

impl BytecodeCompiler for PythonCompiler {
    fn compile(
        &self,
        source_dir: &Path,
        optimization: OptimizationLevel,
        quiet: bool,
    ) -> Result<(), ToolError> {
        let mut command = self.interpreter.command();
        command
            .args(["-m", "compileall", "-o"])
            .arg(optimization.level().to_string());
        if quiet {
            command.arg("-q");
        }
        command.arg(source_dir);
        run_checked(&mut command, quiet)
    }
}

/// Options for [`compile_package`]
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub optimization: OptimizationLevel,
    pub quiet: bool,
    /// Continue with whatever compiled when the compiler reports failure
    pub ignore_compile_errors: bool,
    pub collision_policy: CollisionPolicy,
    pub excludes: ExcludeRules,
    pub encoding: DigestEncoding,
}

/// Compile `source_dir` and lay the bytecode out under `target_dir`.
///
/// `target_dir` must not exist. Records are relative to its parent, which
/// is the root of the wheel tree.
pub fn compile_package(
    compiler: &dyn BytecodeCompiler,
    source_dir: &Path,
    target_dir: &Path,
    options: &CompileOptions,
) -> Result<Vec<IntegrityRecord>, CompileError> {
    if !source_dir.is_dir() {
        return Err(FsError::MissingSource(source_dir.to_path_buf()).into());
    }

    let stale = purge_bytecode_cache(source_dir)?;
    if stale > 0 {
        info!(count = stale, "removed stale bytecode caches");
    }

    info!(
        source = %source_dir.display(),
        level = options.optimization.level(),
        "compiling package"
    );
    match compiler.compile(source_dir, options.optimization, options.quiet) {
        Ok(()) => {}
        Err(ToolError::ExternalToolFailed { tool, code, .. }) if options.ignore_compile_errors => {
            warn!(
                %tool,
                ?code,
                "compiler reported failures; files that did not compile are left out"
            );
        }
        Err(e) => return Err(e.into()),
    }

    if target_dir.exists() {
        return Err(FsError::DestinationExists(target_dir.to_path_buf()).into());
    }
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent).map_err(FsError::io(parent))?;
    }
    fs::create_dir(target_dir).map_err(FsError::io(target_dir))?;

    let records = ArtifactRelocator::new(source_dir, target_dir)
        .with_collision_policy(options.collision_policy)
        .with_excludes(options.excludes.clone())
        .with_encoding(options.encoding)
        .relocate()?;
    Ok(records)
}
