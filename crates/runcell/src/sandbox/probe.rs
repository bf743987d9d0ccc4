//! Startup probe for namespace support.
//!
//! Having the helper installed is not evidence that it works: containerized
//! and WSL hosts ship bubblewrap but cannot create user namespaces. The
//! probe runs the helper once in a minimal configuration and falls back to
//! direct mode when it fails, recording the helper's stderr for the health
//! surface.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::sandbox::SandboxMode;
use crate::sandbox::bwrap::BwrapCommand;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of the one-shot namespace probe, cached for the process lifetime.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub mode: SandboxMode,

    /// Why the host fell back to direct mode, when it did.
    pub error: Option<String>,
}

impl ProbeReport {
    fn direct(error: impl Into<String>) -> Self {
        Self {
            mode: SandboxMode::Direct,
            error: Some(error.into()),
        }
    }
}

/// Determine whether the namespace sandbox actually functions on this host.
///
/// Runs once at executor startup; the report is cached for the process
/// lifetime.
#[instrument(skip(config))]
pub async fn probe_sandbox(config: &Config) -> ProbeReport {
    if !config.use_sandbox {
        debug!("sandbox disabled by configuration, using direct mode");
        return ProbeReport {
            mode: SandboxMode::Direct,
            error: None,
        };
    }

    let helper = config.sandbox_helper();
    let Some(resolved) = resolve_helper(&helper) else {
        warn!(helper = %helper.display(), "sandbox helper not found, using direct mode");
        return ProbeReport::direct(format!(
            "sandbox helper '{}' not found or not executable",
            helper.display()
        ));
    };

    // Minimal configuration: create the namespaces an execution needs and
    // exit 0.
    let args = BwrapCommand::new(&resolved)
        .unshare_user()
        .unshare_pid()
        .unshare_net(true)
        .ro_bind("/", "/")
        .command(vec!["/bin/true"])
        .build();

    debug!(?args, "probing sandbox helper");

    let output = Command::new(&args[0])
        .args(&args[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => {
            debug!(helper = %resolved.display(), "namespace sandbox available");
            ProbeReport {
                mode: SandboxMode::Namespaced,
                error: None,
            }
        }
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(helper = %resolved.display(), stderr = %stderr, "sandbox probe failed, using direct mode");
            ProbeReport::direct(if stderr.is_empty() {
                format!("probe exited with {}", output.status)
            } else {
                stderr
            })
        }
        Ok(Err(e)) => {
            warn!(error = %e, "failed to run sandbox probe, using direct mode");
            ProbeReport::direct(format!("failed to run probe: {e}"))
        }
        Err(_) => {
            warn!("sandbox probe timed out, using direct mode");
            ProbeReport::direct("probe timed out")
        }
    }
}

/// Resolve the helper to an absolute path. Bare names are searched on PATH,
/// the way the shell would.
fn resolve_helper(helper: &Path) -> Option<PathBuf> {
    if helper.components().count() > 1 || helper.is_absolute() {
        return is_executable(helper).then(|| helper.to_path_buf());
    }

    let path_var = std::env::var("PATH").unwrap_or_default();
    path_var
        .split(':')
        .map(|dir| Path::new(dir).join(helper))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
