//! Bounded execution of external renderer processes.
//!
//! Every Marp or browser invocation goes through [`run_bounded`]: stdin is
//! closed, output is captured, and the child is killed if the wait exceeds its
//! limit (the future owning the child is dropped, and `kill_on_drop` does the
//! rest).

use crate::error::ProbeError;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Bytes of stderr kept in a [`ProbeError::Failed`].
const STDERR_TAIL: usize = 2_000;

/// Run `cmd` to completion within `limit`.
///
/// # Errors
/// * [`ProbeError::Unavailable`] if the program cannot be started at all
/// * [`ProbeError::Timeout`] if it runs longer than `limit`
/// * [`ProbeError::Failed`] on a non-zero exit status
pub async fn run_bounded(
    mut cmd: Command,
    program: &str,
    limit: Duration,
) -> Result<Output, ProbeError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {} (limit {}s)", program, limit.as_secs());
    let child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            ProbeError::Unavailable {
                what: program.to_string(),
                hint: format!("could not start it: {e}"),
            }
        }
        _ => ProbeError::Io(format!("spawning {program}: {e}")),
    })?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(ProbeError::Io(format!("waiting for {program}: {e}"))),
        Err(_) => {
            return Err(ProbeError::Timeout {
                program: program.to_string(),
                secs: limit.as_secs(),
            })
        }
    };

    if !output.status.success() {
        return Err(ProbeError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(output)
}

/// Last [`STDERR_TAIL`] bytes of stderr as trimmed text.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}
