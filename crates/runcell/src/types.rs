use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::LimitsConfig;
use crate::sandbox::SandboxMode;

/// Longest accepted submitted file name, in bytes.
pub const MAX_NAME: usize = 255;

/// A single file submitted for execution.
///
/// `name` is a path relative to the workspace root and may contain
/// subdirectories (`src/util.py`). Absolute paths, parent-directory
/// segments, and NUL bytes are rejected by [`ExecRequest::validate`].
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl SubmittedFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A validated request to execute a bundle of files.
///
/// `files[0]` is the entry file handed to the interpreter. Limit fields
/// left as `None` fall back to the configured defaults at execution time.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub language: String,

    pub version: String,

    pub files: Vec<SubmittedFile>,

    /// Bytes fed to the child's stdin once, up front.
    #[serde(default)]
    pub stdin: Vec<u8>,

    /// Arguments passed after the entry file, verbatim.
    #[serde(default)]
    pub args: Vec<String>,

    /// Whether the sandbox keeps the host network reachable.
    #[serde(default)]
    pub internet: bool,

    /// Wall-clock and CPU budget in seconds.
    #[serde(default)]
    pub time_limit_seconds: Option<f64>,

    /// Address-space ceiling in megabytes.
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,

    /// Processes/threads the execution may hold at once.
    #[serde(default)]
    pub process_limit: Option<u32>,
}

impl ExecRequest {
    /// Create a request with a single entry file and default limits.
    pub fn new(
        language: impl Into<String>,
        version: impl Into<String>,
        files: Vec<SubmittedFile>,
    ) -> Self {
        Self {
            language: language.into(),
            version: version.into(),
            files,
            stdin: Vec::new(),
            args: Vec::new(),
            internet: false,
            time_limit_seconds: None,
            memory_limit_mb: None,
            process_limit: None,
        }
    }

    /// Set the stdin bytes.
    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = stdin.into();
        self
    }

    /// Set the program arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Allow network access inside the sandbox.
    pub fn with_internet(mut self, internet: bool) -> Self {
        self.internet = internet;
        self
    }

    /// Set the wall-clock/CPU budget in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit_seconds = Some(seconds);
        self
    }

    /// Set the memory ceiling in megabytes.
    pub fn with_memory_limit(mut self, mb: u64) -> Self {
        self.memory_limit_mb = Some(mb);
        self
    }

    /// Set the process-count ceiling.
    pub fn with_process_limit(mut self, count: u32) -> Self {
        self.process_limit = Some(count);
        self
    }

    /// Check every input ceiling and the file-name rules.
    ///
    /// Runs before any filesystem work: a request that fails validation
    /// never creates a workspace.
    pub fn validate(&self, limits: &LimitsConfig) -> Result<(), RequestError> {
        if self.version.trim().is_empty() {
            return Err(RequestError::EmptyVersion);
        }

        if self.files.is_empty() {
            return Err(RequestError::NoFiles);
        }
        if self.files.len() > limits.max_files {
            return Err(RequestError::TooManyFiles {
                count: self.files.len(),
                max: limits.max_files,
            });
        }

        let mut total = 0usize;
        for file in &self.files {
            validate_file_name(&file.name)?;
            if self.files.iter().filter(|f| f.name == file.name).count() > 1 {
                return Err(RequestError::DuplicateFileName {
                    name: file.name.clone(),
                });
            }
            if file.content.len() > limits.max_file_bytes {
                return Err(RequestError::FileTooLarge {
                    name: file.name.clone(),
                    size: file.content.len(),
                    max: limits.max_file_bytes,
                });
            }
            total += file.content.len();
        }
        if total > limits.max_total_bytes {
            return Err(RequestError::TotalTooLarge {
                size: total,
                max: limits.max_total_bytes,
            });
        }

        if self.stdin.len() > limits.max_stdin_bytes {
            return Err(RequestError::StdinTooLarge {
                size: self.stdin.len(),
                max: limits.max_stdin_bytes,
            });
        }
        if self.args.len() > limits.max_args {
            return Err(RequestError::TooManyArgs {
                count: self.args.len(),
                max: limits.max_args,
            });
        }

        if let Some(t) = self.time_limit_seconds
            && !(t > 0.0 && t <= limits.max_time_limit)
        {
            return Err(RequestError::TimeLimitOutOfRange {
                requested: t,
                max: limits.max_time_limit,
            });
        }
        if let Some(m) = self.memory_limit_mb
            && !(m > 0 && m <= limits.max_memory_mb)
        {
            return Err(RequestError::MemoryLimitOutOfRange {
                requested: m,
                max: limits.max_memory_mb,
            });
        }
        if let Some(p) = self.process_limit
            && !(p >= 1 && p <= limits.max_processes)
        {
            return Err(RequestError::ProcessLimitOutOfRange {
                requested: p,
                max: limits.max_processes,
            });
        }

        Ok(())
    }
}

/// Reject names that could escape the workspace or break path handling.
fn validate_file_name(name: &str) -> Result<(), RequestError> {
    let reject = |reason: &str| {
        Err(RequestError::InvalidFileName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() || name.trim().is_empty() {
        return reject("empty name");
    }
    if name.len() > MAX_NAME {
        return reject("name too long");
    }
    if name.contains('\0') {
        return reject("contains NUL byte");
    }
    if name.starts_with('/') {
        return reject("absolute path");
    }
    if name.split('/').any(|segment| segment == "..") {
        return reject("parent-directory segment");
    }
    if name.split('/').any(str::is_empty) {
        return reject("empty path segment");
    }
    Ok(())
}

/// Validation failures for an [`ExecRequest`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("version must not be empty")]
    EmptyVersion,

    #[error("request contains no files")]
    NoFiles,

    #[error("too many files: {count} (maximum {max})")]
    TooManyFiles { count: usize, max: usize },

    #[error("invalid file name {name:?}: {reason}")]
    InvalidFileName { name: String, reason: String },

    #[error("duplicate file name {name:?}")]
    DuplicateFileName { name: String },

    #[error("file {name:?} is {size} bytes (maximum {max})")]
    FileTooLarge {
        name: String,
        size: usize,
        max: usize,
    },

    #[error("files total {size} bytes (maximum {max})")]
    TotalTooLarge { size: usize, max: usize },

    #[error("stdin is {size} bytes (maximum {max})")]
    StdinTooLarge { size: usize, max: usize },

    #[error("too many arguments: {count} (maximum {max})")]
    TooManyArgs { count: usize, max: usize },

    #[error("time limit {requested}s out of range (0, {max}]")]
    TimeLimitOutOfRange { requested: f64, max: f64 },

    #[error("memory limit {requested} MB out of range (0, {max}]")]
    MemoryLimitOutOfRange { requested: u64, max: u64 },

    #[error("process limit {requested} out of range [1, {max}]")]
    ProcessLimitOutOfRange { requested: u32, max: u32 },
}

/// Classification of how an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Program exited with status 0.
    Completed,

    /// Wall-clock deadline fired, or the CPU budget was exhausted.
    TimedOut,

    /// The address-space ceiling was hit.
    MemoryExceeded,

    /// Combined output grew far past the configured caps.
    OutputExceeded,

    /// Non-zero exit or death by an ordinary signal.
    RuntimeError,

    /// The sandbox itself failed to set up or apply limits.
    SandboxError,

    /// The caller abandoned the request before the program finished.
    Cancelled,
}

/// Result of one execution.
///
/// Every variant of [`Outcome`] is a successful execution of the service;
/// only setup and sandbox failures are surfaced as errors.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Identifier assigned to this execution, for log correlation.
    pub job_id: Uuid,

    /// Captured standard output, truncated to the configured cap.
    pub stdout: Vec<u8>,

    /// Captured standard error, truncated to the configured cap.
    pub stderr: Vec<u8>,

    pub stdout_truncated: bool,

    pub stderr_truncated: bool,

    /// Exit code if the program exited normally.
    pub exit_code: Option<i32>,

    /// Signal number if the program was killed by a signal.
    pub termination_signal: Option<i32>,

    pub outcome: Outcome,

    /// Wall-clock time between spawn and reap, in milliseconds.
    pub wall_time_ms: u64,

    /// CPU time sampled from the process, if available.
    pub cpu_time_ms: Option<u64>,
}

impl ExecResult {
    /// Check if the program ran to completion with exit code 0.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Completed) && self.exit_code == Some(0)
    }
}

/// Sandbox capability report, as served by the health surface.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub sandbox_mode: SandboxMode,

    /// Stderr of the failed namespace probe, when the host fell back to
    /// direct mode.
    pub probe_error: Option<String>,
}
