use std::process::{Command, Output, Stdio};

use crate::foundation::error::{ReportError, ReportResult};

/// Run `program args...` with all output discarded and report whether it exited successfully.
/// Used to probe for optional external tools before relying on them.
pub fn command_succeeds(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Turn a finished process into an error naming `what` and carrying its stderr.
pub fn check_output(what: &str, output: &Output) -> ReportResult<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ReportError::collaborator(format!(
        "{what} exited with status {}: {}",
        output.status,
        stderr.trim()
    )))
}
