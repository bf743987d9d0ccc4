//! Namespace sandboxing and per-process resource limits.
//!
//! Execution runs in one of two modes. `Namespaced` wraps the runtime argv
//! in a bubblewrap invocation that builds a private filesystem view and
//! fresh user/pid/ipc/uts/cgroup (and usually net) namespaces. `Direct`
//! runs the runtime argv as-is with rlimits only, for hosts where the
//! helper cannot create namespaces (containers, WSL). The mode is probed
//! once at startup.
//!
//! References for bubblewrap's CLI:
//! - https://github.com/containers/bubblewrap

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::sandbox::bwrap::BwrapCommand;
pub use crate::sandbox::limits::RlimitSet;
pub use crate::sandbox::probe::{ProbeReport, probe_sandbox};

mod bwrap;
mod limits;
mod probe;

/// How child processes are isolated. Resolved once at startup and shared
/// read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Full namespace isolation through the sandbox helper.
    Namespaced,

    /// Resource limits only; no filesystem or network isolation.
    Direct,
}

/// Errors from sandbox setup and process launch.
///
/// A missing helper is not an error: the probe reports it and the engine
/// falls back to direct mode.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to spawn child process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),

    #[error(
        "network isolation was requested but the sandbox is running in direct mode"
    )]
    IsolationUnavailable,
}
