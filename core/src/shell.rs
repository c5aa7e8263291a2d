use std::io;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_channel::Receiver;
use async_channel::Sender;
use regex_lite::Regex;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio::time::Instant;
use tokio::time::timeout;

use crate::error::PagerErr;
use crate::error::Result;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Sole handoff between the reader tasks and the consumer. A full queue
/// suspends the producers rather than dropping lines.
const LINE_QUEUE_CAPACITY: usize = 250;

/// How long a single `next_line` pull waits before re-checking liveness.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Window between SIGTERM and the follow-up SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(500);

const STDERR_TAG: &str = "[stderr] ";
const EXIT_CODE_SIGNAL_BASE: i32 = 128; // conventional shell: 128 + signal

#[allow(clippy::expect_used)]
static ANSI_SGR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\x1b[^m]*m").expect("static pattern compiles"));

/// Runs one subprocess and exposes its stdout/stderr as a single lazy,
/// arrival-ordered sequence of cleaned lines.
///
/// Two reader tasks, one per stream, do line-oriented reads and push onto a
/// bounded queue; the queue closes once both readers hit EOF, which is how
/// the consumer side observes the end of the sequence.
pub struct ShellStream {
    child: Child,
    lines: LineQueue,
    exit_code: Option<i32>,
}

impl ShellStream {
    /// Spawns `shell -c command` with both output streams captured. Fails
    /// with [`PagerErr::Spawn`] without creating a session.
    pub fn spawn(command: &str, shell: &str, idle_timeout: Duration) -> Result<Self> {
        let mut child = Command::new(shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| PagerErr::Spawn {
                command: command.to_string(),
                error,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PagerErr::Io(io::Error::other("stdout pipe was not available")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PagerErr::Io(io::Error::other("stderr pipe was not available")))?;

        let (tx, rx) = async_channel::bounded(LINE_QUEUE_CAPACITY);
        tokio::spawn(forward_lines(stdout, tx.clone(), None));
        tokio::spawn(forward_lines(stderr, tx, Some(STDERR_TAG)));

        Ok(Self {
            child,
            lines: LineQueue::new(rx, idle_timeout),
            exit_code: None,
        })
    }

    /// Next cleaned line, `Ok(None)` once both readers finished and the
    /// queue drained, or [`PagerErr::IdleTimeout`] when no line arrived
    /// within the idle window since the last delivery.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.lines.next().await
    }

    /// Terminates the subprocess and returns its exit code. Idempotent and
    /// safe from any exit path: SIGTERM first, SIGKILL after a short grace
    /// period. Reader tasks observe EOF and finish on their own.
    pub async fn close(&mut self) -> Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        self.request_terminate();
        let status = match timeout(KILL_GRACE, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                self.child.start_kill()?;
                self.child.wait().await?
            }
        };
        let code = exit_code_of(status);
        self.exit_code = Some(code);
        Ok(code)
    }

    #[cfg(unix)]
    fn request_terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            unsafe {
                let _ = libc::kill(pid as i32, libc::SIGTERM);
            }
        }
    }

    #[cfg(not(unix))]
    fn request_terminate(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Consumer half of the bounded line queue, with idle-timeout tracking. The
/// idle window resets on every delivered line, independent from the
/// interface's interaction timeout.
struct LineQueue {
    rx: Receiver<String>,
    idle_timeout: Duration,
    last_output: Instant,
}

impl LineQueue {
    fn new(rx: Receiver<String>, idle_timeout: Duration) -> Self {
        Self {
            rx,
            idle_timeout,
            last_output: Instant::now(),
        }
    }

    async fn next(&mut self) -> Result<Option<String>> {
        loop {
            match timeout(POLL_INTERVAL, self.rx.recv()).await {
                Ok(Ok(line)) => {
                    self.last_output = Instant::now();
                    return Ok(Some(line));
                }
                // Closed and drained: both readers hit EOF.
                Ok(Err(_)) => return Ok(None),
                Err(_) => {
                    if self.last_output.elapsed() >= self.idle_timeout {
                        return Err(PagerErr::IdleTimeout(self.idle_timeout));
                    }
                }
            }
        }
    }
}

async fn forward_lines<R>(reader: R, tx: Sender<String>, tag: Option<&'static str>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(512);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let cleaned = clean_line(&buf);
                let line = match tag {
                    Some(tag) => format!("{tag}{cleaned}"),
                    None => cleaned,
                };
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(error = ?err, "stream reader failed; ending stream");
                break;
            }
        }
    }
}

/// Decodes one raw line (UTF-8 lossy), drops carriage returns and ANSI SGR
/// sequences, strips the trailing newline, and breaks doubled backticks so
/// output cannot close the surrounding code fence.
fn clean_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.replace('\r', "");
    let text = ANSI_SGR.replace_all(&text, "");
    text.trim_end_matches('\n').replace("``", "`\u{200b}`")
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().unwrap_or_else(|| match status.signal() {
        Some(signal) => EXIT_CODE_SIGNAL_BASE + signal,
        None => -1,
    })
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clean_line_strips_ansi_and_carriage_returns() {
        let raw = b"\x1b[1;31mred\x1b[0m text\r\n";
        assert_eq!(clean_line(raw), "red text");
    }

    #[test]
    fn clean_line_breaks_code_fences() {
        assert_eq!(clean_line(b"a``b\n"), "a`\u{200b}`b");
    }

    #[test]
    fn clean_line_decodes_invalid_utf8_lossily() {
        let raw = b"ok \xff\xfe bytes\n";
        assert_eq!(clean_line(raw), "ok \u{fffd}\u{fffd} bytes");
    }

    #[tokio::test(start_paused = true)]
    async fn queue_ends_when_producers_finish() {
        let (tx, rx) = async_channel::bounded(8);
        let mut queue = LineQueue::new(rx, Duration::from_secs(30));
        tx.send("one".to_string()).await.expect("send");
        tx.send("two".to_string()).await.expect("send");
        drop(tx);

        assert_eq!(queue.next().await.expect("line"), Some("one".to_string()));
        assert_eq!(queue.next().await.expect("line"), Some("two".to_string()));
        assert_eq!(queue.next().await.expect("end"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_fires_after_window() {
        let (tx, rx) = async_channel::bounded(8);
        let mut queue = LineQueue::new(rx, Duration::from_secs(3));
        // Keep the sender alive so the queue never looks closed.
        let _tx = tx;

        match queue.next().await {
            Err(PagerErr::IdleTimeout(window)) => {
                assert_eq!(window, Duration::from_secs(3));
            }
            other => panic!("expected idle timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn line_just_before_window_resets_the_timer() {
        let (tx, rx) = async_channel::bounded(8);
        let mut queue = LineQueue::new(rx, Duration::from_secs(3));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = tx.send("late".to_string()).await;
            // Hold the sender past the second window so the timeout, not
            // channel closure, ends the stream.
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        assert_eq!(queue.next().await.expect("line"), Some("late".to_string()));
        let started = Instant::now();
        match queue.next().await {
            Err(PagerErr::IdleTimeout(_)) => {
                // The window restarted at the late line, so at least a full
                // window elapsed after it.
                assert!(started.elapsed() >= Duration::from_secs(3));
            }
            other => panic!("expected idle timeout, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_lines_are_tagged() {
        let mut stream = ShellStream::spawn(
            "echo out; echo err 1>&2",
            "/bin/sh",
            Duration::from_secs(10),
        )
        .expect("spawn");

        let mut lines = Vec::new();
        while let Some(line) = stream.next_line().await.expect("line") {
            lines.push(line);
        }
        let code = stream.close().await.expect("close");

        assert_eq!(code, 0);
        lines.sort();
        assert_eq!(lines, vec!["[stderr] err".to_string(), "out".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn close_reports_nonzero_exit_code() {
        let mut stream =
            ShellStream::spawn("exit 3", "/bin/sh", Duration::from_secs(10)).expect("spawn");
        while stream.next_line().await.expect("line").is_some() {}
        assert_eq!(stream.close().await.expect("close"), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn close_terminates_a_long_running_process() {
        let mut stream = ShellStream::spawn("sleep 30", "/bin/sh", Duration::from_secs(10))
            .expect("spawn");
        let code = stream.close().await.expect("close");
        assert!(code != 0, "terminated process must not report success");
        // Second close is a no-op returning the memoized code.
        assert_eq!(stream.close().await.expect("close"), code);
    }
}
