//! External tool invocation
//!
//! Every collaborator process (interpreter, stub generator, installer) is run
//! synchronously through these helpers so failures surface as [`ToolError`].

use std::io;
use std::process::{Command, ExitStatus, Stdio};

use tracing::debug;

/// Errors from external tools
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed with exit code {code:?}{}", stderr_suffix(.stderr))]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} produced unusable output: {reason}")]
    InvalidOutput { tool: String, reason: String },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(": {}", stderr.trim())
    }
}

fn describe(command: &Command) -> String {
    command.get_program().to_string_lossy().into_owned()
}

/// Run a command to completion, returning its exit status.
///
/// With `quiet` the tool's stdout is discarded; stderr always reaches the
/// terminal.
pub fn run_status(command: &mut Command, quiet: bool) -> Result<ExitStatus, ToolError> {
    let tool = describe(command);
    debug!(?command, "running external tool");

    if quiet {
        command.stdout(Stdio::null());
    }
    command
        .status()
        .map_err(|source| ToolError::Spawn { tool, source })
}

/// Run a command and fail on a non-zero exit status
pub fn run_checked(command: &mut Command, quiet: bool) -> Result<(), ToolError> {
    let status = run_status(command, quiet)?;
    ensure_success(&describe(command), status)
}

/// Map a non-zero status to [`ToolError::ExternalToolFailed`]
pub fn ensure_success(tool: &str, status: ExitStatus) -> Result<(), ToolError> {
    if status.success() {
        Ok(())
    } else {
        Err(ToolError::ExternalToolFailed {
            tool: tool.to_string(),
            code: status.code(),
            stderr: String::new(),
        })
    }
}

/// Run a command and return its stdout
pub fn capture(command: &mut Command) -> Result<String, ToolError> {
    let tool = describe(command);
    debug!(?command, "capturing external tool output");

    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ToolError::ExternalToolFailed {
            tool,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    String::from_utf8(output.stdout).map_err(|e| ToolError::InvalidOutput {
        tool,
        reason: e.to_string(),
    })
}
