use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../runcell.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for runcell.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of the installed runtime tree. Runtimes live at
    /// `<packages_root>/<language>/<version>/bin/<interpreter>`.
    #[serde(default = "default_packages_root")]
    pub packages_root: PathBuf,

    /// Path to the bubblewrap-compatible sandbox helper. A bare name is
    /// resolved through PATH.
    #[serde(default)]
    pub sandbox_helper_path: Option<PathBuf>,

    /// When false, skip the namespace probe and force direct mode.
    #[serde(default = "default_true")]
    pub use_sandbox: bool,

    /// When true, refuse `internet = false` requests while the sandbox is
    /// in direct mode instead of running them without network isolation.
    #[serde(default)]
    pub require_net_isolation: bool,

    /// Where per-execution workspaces are created. Defaults to the system
    /// temporary directory.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Execution and input ceilings.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Get the configured sandbox helper, falling back to a PATH lookup of
    /// `bwrap`.
    pub fn sandbox_helper(&self) -> PathBuf {
        self.sandbox_helper_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("bwrap"))
    }

    /// Get the directory workspaces are created under.
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

/// Execution and input ceilings, all hard.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Wall-clock/CPU budget in seconds when the request does not name one.
    pub default_time_limit: f64,

    /// Largest wall-clock/CPU budget a request may ask for, in seconds.
    pub max_time_limit: f64,

    /// Address-space ceiling in megabytes when the request does not name one.
    pub default_memory_mb: u64,

    /// Largest address-space ceiling a request may ask for, in megabytes.
    pub max_memory_mb: u64,

    /// Process-count ceiling when the request does not name one.
    pub default_processes: u32,

    /// Largest process-count ceiling a request may ask for.
    pub max_processes: u32,

    /// Maximum number of submitted files.
    pub max_files: usize,

    /// Maximum size of one submitted file, in bytes.
    pub max_file_bytes: usize,

    /// Maximum combined size of all submitted files, in bytes.
    pub max_total_bytes: usize,

    /// Maximum stdin size, in bytes.
    pub max_stdin_bytes: usize,

    /// Maximum number of program arguments.
    pub max_args: usize,

    /// Captured stdout ceiling, in bytes.
    pub max_stdout_bytes: usize,

    /// Captured stderr ceiling, in bytes.
    pub max_stderr_bytes: usize,

    /// Largest file the child may create, in bytes.
    pub max_output_file_bytes: u64,

    /// Open file descriptor ceiling.
    pub max_open_files: u64,

    /// Grace window between SIGTERM and SIGKILL on deadline expiry.
    pub sigterm_grace_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_time_limit: 2.0,
            max_time_limit: 30.0,
            default_memory_mb: 256,
            max_memory_mb: 2048,
            default_processes: 16,
            max_processes: 64,
            max_files: 10,
            max_file_bytes: 1024 * 1024,
            max_total_bytes: 5 * 1024 * 1024,
            max_stdin_bytes: 1024 * 1024,
            max_args: 16,
            max_stdout_bytes: 256 * 1024,
            max_stderr_bytes: 256 * 1024,
            max_output_file_bytes: 8 * 1024 * 1024,
            max_open_files: 64,
            sigterm_grace_ms: 300,
        }
    }
}

fn default_packages_root() -> PathBuf {
    PathBuf::from("/packages")
}

fn default_true() -> bool {
    true
}
