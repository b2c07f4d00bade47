use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Collected result of a child process run.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    /// Exit status, `None` when the process was killed on timeout
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub(crate) fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }
}

/// Runs `cmd` to completion or until `timeout` elapses.
///
/// Both pipes are drained on their own threads so the child never blocks
/// on a full pipe. Each stdout line is handed to `on_line` as it arrives.
/// On unix the child leads its own process group, and on timeout the
/// whole group is killed so no descendant keeps the pipes open.
///
/// # Errors
///
/// Returns the spawn error if the program cannot be started.
pub(crate) fn run_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
    on_line: Option<&(dyn Fn(&str) + Sync)>,
) -> io::Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let start = Instant::now();
    let mut child = cmd.spawn()?;
    debug!("Spawned pid {}", child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    thread::scope(|scope| {
        let out_reader = scope.spawn(move || stdout.map(|s| read_lines(s, on_line)).unwrap_or_default());
        let err_reader = scope.spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut s) = stderr {
                if let Err(e) = s.read_to_end(&mut buf) {
                    warn!("Failed to read child stderr: {}", e);
                }
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if start.elapsed() >= timeout {
                        warn!(
                            "Process {} exceeded {}s timeout, killing it",
                            child.id(),
                            timeout.as_secs()
                        );
                        kill_tree(&mut child);
                        timed_out = true;
                        break None;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    warn!("Failed to wait for process {}: {}", child.id(), e);
                    kill_tree(&mut child);
                    break None;
                }
            }
        };

        let stdout = out_reader.join().unwrap_or_default();
        let stderr = err_reader.join().unwrap_or_default();

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
            timed_out,
            elapsed: start.elapsed(),
        })
    })
}

/// Kills the child and everything in its process group, then reaps it.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal; the group was created at spawn.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } == -1 {
                warn!(
                    "Failed to kill process group {}: {}",
                    pgid,
                    io::Error::last_os_error()
                );
            }
        }
    }

    if let Err(e) = child.kill() {
        debug!("Kill of process {} reported: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap process {}: {}", child.id(), e);
    }
}

fn read_lines(source: impl Read, on_line: Option<&(dyn Fn(&str) + Sync)>) -> String {
    let mut reader = BufReader::new(source);
    let mut collected = String::new();
    let mut raw = Vec::new();

    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw);
                if let Some(callback) = on_line {
                    callback(line.trim_end_matches(['\r', '\n']));
                }
                collected.push_str(&line);
            }
            Err(e) => {
                warn!("Failed to read child stdout: {}", e);
                break;
            }
        }
    }

    collected
}
