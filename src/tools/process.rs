//! Time-bounded subprocess execution with defensive output capture.

use super::ToolExecutionResult;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bytes kept per output stream; the rest is drained and dropped.
const MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;

/// How long to wait for pipes to close once the process group is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Output read so far from one stream.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

type SharedCapture = Arc<Mutex<Captured>>;

/// Kills the child's process group when dropped.
///
/// The child leads its own group, so this also reaches anything the
/// interpreter started.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };

        #[cfg(unix)]
        {
            // SAFETY: killpg only sends a signal. An empty group yields ESRCH.
            let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
            if rc != 0 {
                debug!(
                    "killpg({}) returned {}",
                    pgid,
                    std::io::Error::last_os_error()
                );
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Run `program` with `args` and collect its output, killing it on timeout.
///
/// The child runs in its own process group. The group is killed on timeout,
/// after the child exits, and when a cancelled caller drops this future, so
/// no descendant outlives the invocation.
pub(crate) async fn run_process(
    program: &str,
    script: &Path,
    args: &[OsString],
    timeout: Duration,
) -> std::io::Result<ToolExecutionResult> {
    let mut command = Command::new(program);
    command
        .arg(script)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn()?;
    let mut group = ProcessGroup { pgid: child.id() };

    let stdout = SharedCapture::default();
    let stderr = SharedCapture::default();
    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(read_capped(out, stdout.clone())));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(read_capped(err, stderr.clone())));

    let (exit_status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status?.code().unwrap_or(-1), false),
        Err(_) => {
            warn!("{:?} exceeded {}s, terminating", script, timeout.as_secs());
            group.kill();
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {:?}: {}", script, e);
            }
            (-1, true)
        }
    };

    // Background children of a finished tool would hold the pipes open.
    group.kill();
    drain(stdout_task).await;
    drain(stderr_task).await;

    let stdout = into_text(&stdout);
    let stderr = into_text(&stderr);

    debug!(
        "{:?} finished: status={}, timed_out={}, stdout={}B, stderr={}B",
        script,
        exit_status,
        timed_out,
        stdout.len(),
        stderr.len()
    );

    Ok(ToolExecutionResult {
        stdout,
        stderr,
        exit_status,
        timed_out,
    })
}

/// Read a stream to the end into `capture`, keeping at most [`MAX_CAPTURE_BYTES`].
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, capture: SharedCapture) {
    let mut buf = [0u8; 8192];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let Ok(mut captured) = capture.lock() else {
                    break;
                };
                let room = MAX_CAPTURE_BYTES.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.truncated = true;
                }
                captured.bytes.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) => {
                debug!("Output pipe read failed: {}", e);
                break;
            }
        }
    }
}

/// Wait briefly for a reader to hit end of stream. What it read is kept either way.
async fn drain(task: Option<JoinHandle<()>>) {
    let Some(mut task) = task else {
        return;
    };

    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Output reader task failed: {}", e),
        Err(_) => {
            task.abort();
            warn!("Output pipe still open after the process group was killed");
        }
    }
}

/// Decode captured bytes, replacing invalid UTF-8.
fn into_text(capture: &SharedCapture) -> String {
    let captured = capture
        .lock()
        .map(|mut captured| std::mem::take(&mut *captured))
        .unwrap_or_default();

    let mut text = String::from_utf8_lossy(&captured.bytes).into_owned();
    if captured.truncated {
        text.push_str("\n[output truncated]");
    }
    text
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    /// Whether `pid` is gone or a zombie, polling for up to 2.5s.
    #[cfg(target_os = "linux")]
    async fn process_gone(pid: &str) -> bool {
        for _ in 0..50 {
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Err(_) => return true,
                Ok(stat) => {
                    let state = stat.rsplit(')').next().unwrap_or("").trim_start();
                    if state.starts_with('Z') {
                        return true;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "echo.sh", "echo \"out:$1\"\necho diag >&2\nexit 3\n");

        let result = run_process("sh", &path, &[OsString::from("hello")], Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(result.stdout.trim(), "out:hello");
        assert_eq!(result.stderr.trim(), "diag");
        assert_eq!(result.exit_status, 3);
        assert!(!result.timed_out);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "bytes.sh", "printf 'ok\\377\\376end'\n");

        let result = run_process("sh", &path, &[], Duration::from_secs(10))
            .await
            .unwrap();

        assert!(result.stdout.starts_with("ok"));
        assert!(result.stdout.ends_with("end"));
        assert!(result.stdout.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "slow.sh", "echo started\nexec sleep 30\n");

        let started = Instant::now();
        let result = run_process("sh", &path, &[], Duration::from_millis(500))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.exit_status, -1);
        assert_eq!(result.stdout.trim(), "started");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_child_processes() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("child.pid");
        let path = script(
            dir.path(),
            "spawner.sh",
            "echo started\nsleep 37 &\necho $! > \"$1\"\nwait\necho never\n",
        );

        let started = Instant::now();
        let result = run_process(
            "sh",
            &path,
            &[pid_file.clone().into_os_string()],
            Duration::from_millis(500),
        )
        .await
        .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.stdout.trim(), "started");
        assert!(started.elapsed() < Duration::from_secs(3));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        assert!(process_gone(pid).await, "sleep {pid} outlived the timeout");
    }

    #[tokio::test]
    async fn test_background_child_does_not_hold_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "leaky.sh", "echo done\nsleep 37 &\n");

        let started = Instant::now();
        let result = run_process("sh", &path, &[], Duration::from_secs(10))
            .await
            .unwrap();

        assert!(!result.timed_out);
        assert_eq!(result.exit_status, 0);
        assert_eq!(result.stdout.trim(), "done");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancelled_caller_kills_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("child.pid");
        let path = script(
            dir.path(),
            "spawner.sh",
            "sleep 37 &\necho $! > \"$1\"\nwait\n",
        );

        let cancelled = tokio::time::timeout(
            Duration::from_millis(500),
            run_process(
                "sh",
                &path,
                &[pid_file.clone().into_os_string()],
                Duration::from_secs(60),
            ),
        )
        .await;
        assert!(cancelled.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        assert!(process_gone(pid).await, "sleep {pid} outlived its caller");
    }

    #[tokio::test]
    async fn test_concurrent_invocations_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "echo.sh", "sleep 0.2\necho \"$1\"\necho \"err:$1\" >&2\n");

        let first_args = [OsString::from("first")];
        let second_args = [OsString::from("second")];
        let (first, second) = tokio::join!(
            run_process("sh", &path, &first_args, Duration::from_secs(10)),
            run_process("sh", &path, &second_args, Duration::from_secs(10)),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.stdout.trim(), "first");
        assert_eq!(first.stderr.trim(), "err:first");
        assert_eq!(second.stdout.trim(), "second");
        assert_eq!(second.stderr.trim(), "err:second");
    }

    #[tokio::test]
    async fn test_missing_launcher_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "x.sh", "true\n");

        let err = run_process("scout-no-such-launcher", &path, &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
