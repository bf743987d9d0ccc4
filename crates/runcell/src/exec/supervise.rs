//! Child process launch and supervision.
//!
//! One supervisor drives one child: it spawns the argv in a fresh process
//! group with the rlimit hook installed, writes stdin from a detached task,
//! drains stdout and stderr into capped buffers, and races the wall-clock
//! deadline, an output-flood trigger, and caller cancellation against child
//! exit. Whichever fires first starts the SIGTERM-then-SIGKILL cascade
//! against the whole group; the readers keep draining afterwards so the
//! child can never block on a full pipe.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, instrument, warn};

use crate::sandbox::{RlimitSet, SandboxError};

/// Margin added to the requested wall-clock limit before the deadline
/// fires, so a program using its full budget is not raced by the timer.
const WALL_GRACE: Duration = Duration::from_millis(500);

/// Bytes kept past the per-stream cap so the exact-cap boundary is
/// detectable without trusting counters alone.
const OUTPUT_OVERSHOOT: usize = 4096;

/// A stream that produces more than this multiple of its cap gets the
/// child killed and the execution classified as an output flood.
const OUTPUT_KILL_MULTIPLIER: u64 = 8;

const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// How long to wait for the pipe readers after the group is dead. Only a
/// process that escaped the group can keep a pipe open longer.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything needed to launch one child.
#[derive(Debug)]
pub(crate) struct LaunchSpec {
    pub argv: Vec<String>,
    /// Working directory for direct mode; the helper chdirs internally in
    /// namespaced mode.
    pub cwd: Option<std::path::PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Vec<u8>,
    pub rlimits: RlimitSet,
    pub stdout_cap: usize,
    pub stderr_cap: usize,
    pub time_limit: Duration,
    pub sigterm_grace: Duration,
}

/// One captured stream: the bytes kept (at most cap + overshoot) and the
/// total the child actually wrote.
#[derive(Debug)]
pub(crate) struct CapturedStream {
    pub bytes: Vec<u8>,
    pub seen: u64,
}

/// Observed facts about a finished child.
#[derive(Debug)]
pub(crate) struct Supervised {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub deadline_fired: bool,
    pub cancelled: bool,
    pub output_exceeded: bool,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
    pub wall_time: Duration,
    pub cpu_time: Option<Duration>,
}

struct DrainState {
    buf: std::sync::Mutex<Vec<u8>>,
    seen: AtomicU64,
}

impl DrainState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            buf: std::sync::Mutex::new(Vec::new()),
            seen: AtomicU64::new(0),
        })
    }

    fn take(&self) -> CapturedStream {
        let mut guard = match self.buf.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        CapturedStream {
            bytes: std::mem::take(&mut *guard),
            seen: self.seen.load(Ordering::Acquire),
        }
    }
}

/// Run a child to completion under the launch bounds.
#[instrument(skip(spec, cancel), fields(argv0 = %spec.argv.first().map(String::as_str).unwrap_or("")))]
pub(crate) async fn supervise(
    spec: LaunchSpec,
    cancel: Option<Arc<Notify>>,
) -> Result<Supervised, SandboxError> {
    let (program, rest) = spec.argv.split_first().ok_or(SandboxError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .env_clear()
        .envs(spec.env.iter().cloned())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    if let Some(ref dir) = spec.cwd {
        cmd.current_dir(dir);
    }

    let rlimits = spec.rlimits;
    // Runs between fork and exec; setrlimit calls only.
    unsafe {
        cmd.pre_exec(move || rlimits.install());
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(SandboxError::Spawn)?;
    let pid = child.id().map(|raw| Pid::from_raw(raw as i32));

    // Feed stdin from its own task so a child that never reads cannot
    // stall the supervisor; the pipe breaks when the group dies.
    if let Some(mut stdin_pipe) = child.stdin.take() {
        let data = spec.stdin;
        tokio::spawn(async move {
            let _ = stdin_pipe.write_all(&data).await;
            let _ = stdin_pipe.shutdown().await;
        });
    }

    let output_kill = Arc::new(Notify::new());
    let combined = Arc::new(AtomicU64::new(0));
    let kill_threshold = OUTPUT_KILL_MULTIPLIER * (spec.stdout_cap + spec.stderr_cap) as u64;

    let stdout_state = DrainState::new();
    let stderr_state = DrainState::new();

    let mut stdout_task = spawn_drain(
        child.stdout.take(),
        spec.stdout_cap + OUTPUT_OVERSHOOT,
        Arc::clone(&stdout_state),
        Arc::clone(&combined),
        kill_threshold,
        Arc::clone(&output_kill),
    );
    let mut stderr_task = spawn_drain(
        child.stderr.take(),
        spec.stderr_cap + OUTPUT_OVERSHOOT,
        Arc::clone(&stderr_state),
        Arc::clone(&combined),
        kill_threshold,
        Arc::clone(&output_kill),
    );

    let cancel = cancel.unwrap_or_default();
    let deadline = tokio::time::sleep(spec.time_limit + WALL_GRACE);
    tokio::pin!(deadline);
    let mut cpu_tick = tokio::time::interval(CPU_SAMPLE_INTERVAL);
    cpu_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut deadline_fired = false;
    let mut cancelled = false;
    let mut output_exceeded = false;
    let mut cpu_time = None;

    let wait_result = loop {
        tokio::select! {
            result = child.wait() => break result,

            _ = &mut deadline, if !deadline_fired => {
                deadline_fired = true;
                debug!("wall-clock deadline fired");
                escalate_kill(pid, spec.sigterm_grace);
            }

            _ = output_kill.notified(), if !output_exceeded => {
                output_exceeded = true;
                warn!(threshold = kill_threshold, "output flood, killing process group");
                escalate_kill(pid, Duration::ZERO);
            }

            _ = cancel.notified(), if !cancelled => {
                cancelled = true;
                debug!("execution cancelled by caller");
                escalate_kill(pid, spec.sigterm_grace);
            }

            _ = cpu_tick.tick() => {
                if let Some(pid) = pid {
                    cpu_time = proc_cpu_time(pid).or(cpu_time);
                }
            }
        }
    };
    let wall_time = start.elapsed();

    // The group must have no survivors before the result is returned;
    // ESRCH here just means it is already empty.
    kill_group(pid, Signal::SIGKILL);

    let status = wait_result.map_err(SandboxError::Wait)?;

    // The readers finish once the group is dead and the pipes close. Only
    // an escapee that left the process group can hold them open; give up
    // on it rather than hang the request.
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        let _ = (&mut stdout_task).await;
        let _ = (&mut stderr_task).await;
    })
    .await;
    if drained.is_err() {
        warn!("stdio readers did not finish after group kill, abandoning them");
        stdout_task.abort();
        stderr_task.abort();
    }

    use std::os::unix::process::ExitStatusExt;
    let supervised = Supervised {
        exit_code: status.code(),
        signal: status.signal(),
        deadline_fired,
        cancelled,
        output_exceeded,
        stdout: stdout_state.take(),
        stderr: stderr_state.take(),
        wall_time,
        cpu_time,
    };

    debug!(
        exit_code = ?supervised.exit_code,
        signal = ?supervised.signal,
        deadline_fired,
        wall_ms = wall_time.as_millis() as u64,
        "child finished"
    );

    Ok(supervised)
}

fn spawn_drain<R>(
    reader: Option<R>,
    keep: usize,
    state: Arc<DrainState>,
    combined: Arc<AtomicU64>,
    kill_threshold: u64,
    output_kill: Arc<Notify>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else { return };
        let mut chunk = vec![0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    state.seen.fetch_add(n as u64, Ordering::Release);
                    let total = combined.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
                    {
                        let mut buf = match state.buf.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        // Keep the head, drain-and-discard the rest so the
                        // child never blocks on a full pipe.
                        if buf.len() < keep {
                            let take = n.min(keep - buf.len());
                            buf.extend_from_slice(&chunk[..take]);
                        }
                    }
                    if total > kill_threshold {
                        output_kill.notify_one();
                    }
                }
            }
        }
    })
}

/// SIGTERM the group, then SIGKILL it after the grace window. Runs
/// detached so the supervisor keeps draining while the grace elapses.
fn escalate_kill(pid: Option<Pid>, grace: Duration) {
    let Some(pid) = pid else { return };
    tokio::spawn(async move {
        if grace.is_zero() {
            kill_group(Some(pid), Signal::SIGKILL);
            return;
        }
        kill_group(Some(pid), Signal::SIGTERM);
        tokio::time::sleep(grace).await;
        kill_group(Some(pid), Signal::SIGKILL);
    });
}

fn kill_group(pid: Option<Pid>, signal: Signal) {
    if let Some(pid) = pid {
        // ESRCH means the group is already gone.
        let _ = killpg(pid, signal);
    }
}

/// Sample the child's CPU time from /proc. Best-effort: the entry vanishes
/// at reap time, and in namespaced mode this reads the helper rather than
/// the payload.
fn proc_cpu_time(pid: Pid) -> Option<Duration> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid.as_raw())).ok()?;
    // Fields after the parenthesized comm; utime and stime are the 14th
    // and 15th fields of the full line.
    let rest = stat.rsplit_once(')')?.1;
    let mut fields = rest.split_whitespace();
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;

    let ticks_per_sec = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks_per_sec <= 0 {
        return None;
    }
    Some(Duration::from_millis(
        (utime + stime) * 1000 / ticks_per_sec as u64,
    ))
}
