//! Run one external converter process under a wall-clock deadline.
//!
//! The converter is spawned from a [`CommandTemplate`] with the artifact
//! paths substituted in. Its stdout and stderr are drained line by line into
//! `debug!` logs so a chatty converter can never block on a full pipe.
//!
//! On unix the converter leads its own process group. Launchers such as
//! `uvx` fork the real converter, so killing only the direct child would
//! leave the worker running and free to write into the temp root after
//! cleanup. The whole group is killed on timeout, and again whenever
//! [`run_converter`] returns or its future is dropped, so no member of the
//! converter's tree outlives the request.

use crate::config::CommandTemplate;
use crate::error::ConvertError;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// What a successful converter run looked like.
#[derive(Debug, Clone, Copy)]
pub struct ConverterRun {
    /// Wall-clock time from spawn to exit.
    pub elapsed: Duration,
    /// OS process id, when the platform reported one.
    pub pid: Option<u32>,
}

/// Invoke `template` on `input`, asking it to write `output`.
///
/// Returns once the process has exited with status 0. A process still
/// running when `timeout` elapses is killed and reaped before
/// [`ConvertError::Timeout`] is returned. Whether `output` actually exists is
/// the caller's concern.
pub async fn run_converter(
    template: &CommandTemplate,
    input: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<ConverterRun, ConvertError> {
    let program = template.program().to_string();
    let mut cmd = Command::new(template.program());
    cmd.args(template.render(input, output))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ConvertError::ConverterStart {
        program: program.clone(),
        source,
    })?;
    let pid = child.id();
    let group = ProcessGroup::new(pid, program.clone());
    debug!(pid, "Spawned converter: {}", template);

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_output(stdout, program.clone(), "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_output(stderr, program.clone(), "stderr"));
    }

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => return Err(ConvertError::io("wait for the converter", e)),
        Err(_) => {
            warn!(pid, "Converter '{}' exceeded {:?}, killing it", program, timeout);
            group.kill();
            if let Err(e) = child.kill().await {
                warn!(pid, "Failed to kill converter '{}': {}", program, e);
                if let Err(e) = child.wait().await {
                    warn!(pid, "Failed to reap converter '{}': {}", program, e);
                }
            }
            return Err(ConvertError::Timeout {
                program,
                secs: timeout.as_secs(),
            });
        }
    };

    let elapsed = started.elapsed();
    if !status.success() {
        return Err(ConvertError::ConverterFailed {
            program,
            detail: describe_status(status),
        });
    }

    debug!(pid, elapsed_ms = elapsed.as_millis() as u64, "Converter '{}' finished", program);
    Ok(ConverterRun { elapsed, pid })
}

/// SIGKILLs the converter's process group when dropped.
///
/// A group with no members left (`ESRCH`) is the normal case after a clean
/// exit and is not logged.
struct ProcessGroup {
    pgid: Option<u32>,
    program: String,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>, program: String) -> Self {
        Self { pgid, program }
    }

    #[cfg(unix)]
    fn kill(&self) {
        let Some(pgid) = self.pgid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
            return;
        };
        // SAFETY: killpg takes plain integers and touches no memory of ours.
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(pgid, "Failed to kill process group of '{}': {}", self.program, err);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn forward_output<R>(stream: R, program: String, channel: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(converter = %program, channel, "{}", line);
    }
}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("termination by signal {signal}");
        }
    }
    "an unknown exit status".to_string()
}
