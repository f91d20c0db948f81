//! Host interpreter discovery
//!
//! Compiled bytecode is only loadable by the interpreter minor version that
//! produced it, so the wheel tag and the pinned `python` constraint are both
//! derived from the interpreter used for compilation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::tool::{capture, ToolError};

/// Default interpreter executable
pub const DEFAULT_PYTHON: &str = "python3";

/// Interpreter version (major.minor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PythonVersion {
    pub major: u8,
    pub minor: u8,
}

impl PythonVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parse "3.11", "3.11.4" or "3 11"
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(|c: char| c == '.' || c.is_whitespace());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(Self { major, minor })
    }

    /// Wheel python tag, e.g. `py311`
    pub fn tag(&self) -> String {
        format!("py{}{}", self.major, self.minor)
    }

    /// Manifest constraint allowing only this minor version, e.g. `~3.11`
    pub fn pinned_constraint(&self) -> String {
        format!("~{}.{}", self.major, self.minor)
    }

    /// `Requires-Python` specifier for this minor version
    pub fn requires_python(&self) -> String {
        format!(
            ">={}.{},<{}.{}",
            self.major,
            self.minor,
            self.major,
            self.minor + 1
        )
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A host interpreter and its version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    executable: PathBuf,
    version: PythonVersion,
}

impl Interpreter {
    /// Use an interpreter whose version is already known
    pub fn new(executable: impl Into<PathBuf>, version: PythonVersion) -> Self {
        Self {
            executable: executable.into(),
            version,
        }
    }

    /// Query the interpreter for its version
    pub fn detect(executable: impl Into<PathBuf>) -> Result<Self, ToolError> {
        let executable = executable.into();
        let output = capture(Command::new(&executable).args([
            "-c",
            "import sys; print(sys.version_info[0], sys.version_info[1])",
        ]))?;

        let version = PythonVersion::parse(&output).ok_or_else(|| ToolError::InvalidOutput {
            tool: executable.display().to_string(),
            reason: format!("unrecognised version output '{}'", output.trim()),
        })?;

        Ok(Self {
            executable,
            version,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn version(&self) -> PythonVersion {
        self.version
    }

    /// Command running this interpreter
    pub fn command(&self) -> Command {
        Command::new(&self.executable)
    }
}
