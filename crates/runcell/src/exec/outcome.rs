//! Outcome classification and output truncation.

use nix::sys::signal::Signal;

use crate::exec::supervise::CapturedStream;
use crate::types::Outcome;

/// Exit code a setup wrapper uses to signal that limit installation failed
/// before user code ran.
pub(crate) const PREEXEC_FAILURE_CODE: i32 = 125;

/// How much of the stderr tail is searched for memory-exhaustion markers.
const STDERR_SNIFF_BYTES: usize = 4096;

/// Observed facts about a finished child, in classification order.
#[derive(Debug)]
pub(crate) struct ChildFacts<'a> {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub deadline_fired: bool,
    pub cancelled: bool,
    pub output_exceeded: bool,
    /// Whether an address-space rlimit was configured for this run.
    pub memory_limited: bool,
    /// Whether the run went through the namespace helper.
    pub namespaced: bool,
    pub stderr: &'a [u8],
}

/// Classify how the execution ended. First match wins.
pub(crate) fn classify(facts: &ChildFacts<'_>) -> Outcome {
    if facts.cancelled {
        return Outcome::Cancelled;
    }
    if facts.deadline_fired {
        return Outcome::TimedOut;
    }
    if facts.output_exceeded {
        return Outcome::OutputExceeded;
    }

    if let Some(signal) = facts.signal {
        // A SIGKILL nobody here sent is the kernel reclaiming memory.
        if signal == Signal::SIGKILL as i32 && facts.memory_limited {
            return Outcome::MemoryExceeded;
        }
        if signal == Signal::SIGXCPU as i32 {
            return Outcome::TimedOut;
        }
        return Outcome::RuntimeError;
    }

    match facts.exit_code {
        Some(0) => Outcome::Completed,
        Some(code) => {
            if code == PREEXEC_FAILURE_CODE {
                return Outcome::SandboxError;
            }
            // The helper reports its own setup failures as a plain exit 1
            // with a recognizable stderr prefix.
            if facts.namespaced && facts.stderr.starts_with(b"bwrap:") {
                return Outcome::SandboxError;
            }
            // Allocation failure usually surfaces as a non-zero exit, not
            // a signal.
            if facts.memory_limited && stderr_signals_memory_exhaustion(facts.stderr) {
                return Outcome::MemoryExceeded;
            }
            Outcome::RuntimeError
        }
        None => Outcome::RuntimeError,
    }
}

/// Infer allocator-induced death from the stderr tail.
fn stderr_signals_memory_exhaustion(stderr: &[u8]) -> bool {
    let start = stderr.len().saturating_sub(STDERR_SNIFF_BYTES);
    let tail = String::from_utf8_lossy(&stderr[start..]).to_lowercase();

    tail.contains("memoryerror")
        || tail.contains("out of memory")
        || tail.contains("cannot allocate memory")
        || tail.contains("allocation failed")
        || tail.contains("heap limit")
}

/// A stream after truncation.
#[derive(Debug)]
pub(crate) struct TruncatedStream {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

/// Clip a captured stream to the cap.
///
/// A stream that wrote exactly the cap is returned whole and unmarked.
/// Past the cap, the content is clipped at the last UTF-8 boundary not
/// exceeding the cap (with a bounded backward scan so binary data cannot
/// regress) and a marker line naming the stream and the approximate
/// original size is appended.
pub(crate) fn truncate_stream(
    captured: CapturedStream,
    cap: usize,
    label: &str,
) -> TruncatedStream {
    if captured.seen <= cap as u64 {
        return TruncatedStream {
            bytes: captured.bytes,
            truncated: false,
        };
    }

    let mut bytes = captured.bytes;
    bytes.truncate(utf8_cut(&bytes, cap));
    let marker = format!(
        "\n[{label} truncated at {cap} bytes; program wrote about {} bytes]\n",
        captured.seen
    );
    bytes.extend_from_slice(marker.as_bytes());

    TruncatedStream {
        bytes,
        truncated: true,
    }
}

/// Largest index ≤ `cap` that does not split a UTF-8 code point. The scan
/// walks back at most three continuation bytes; invalid sequences cut at
/// the cap itself.
fn utf8_cut(bytes: &[u8], cap: usize) -> usize {
    if bytes.len() <= cap {
        return bytes.len();
    }
    let floor = cap.saturating_sub(3);
    let mut cut = cap;
    while cut > floor && is_continuation(bytes[cut]) {
        cut -= 1;
    }
    if is_continuation(bytes[cut]) {
        // More than three continuation bytes in a row is not UTF-8; there
        // is no boundary to respect.
        cap
    } else {
        cut
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}
