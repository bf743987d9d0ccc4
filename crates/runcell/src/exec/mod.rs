//! The execution engine.
//!
//! Carries a single request end-to-end: validate, resolve the runtime,
//! materialize a workspace, build the (sandboxed or direct) argv, supervise
//! the child, classify the outcome, and tear the workspace down.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::exec::outcome::{ChildFacts, classify, truncate_stream};
use crate::exec::supervise::{LaunchSpec, supervise};
use crate::exec::workspace::Workspace;
use crate::runtime::{RuntimeDescriptor, RuntimeError, RuntimeRegistry};
use crate::sandbox::{
    BwrapCommand, ProbeReport, RlimitSet, SandboxError, SandboxMode, probe_sandbox,
};
use crate::types::{Capabilities, ExecRequest, ExecResult, RequestError};

mod outcome;
mod supervise;
mod workspace;

/// Where the workspace appears inside the sandbox.
const IN_SANDBOX_APP: &str = "/app";

/// Fixed, non-identifying hostname inside the sandbox.
const SANDBOX_HOSTNAME: &str = "runcell";

/// Errors that stop an execution before user code produced a result.
///
/// Execution outcomes (timeouts, memory exhaustion, runtime errors) are
/// not errors; they come back inside [`ExecResult`].
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// The execution engine: runtime registry, cached sandbox mode, and
/// configuration, shared read-only across concurrent executions.
#[derive(Debug)]
pub struct Executor {
    config: Config,
    registry: RuntimeRegistry,
    sandbox: ProbeReport,
}

impl Executor {
    /// Build an executor: scan the runtime tree and probe the sandbox
    /// helper once.
    pub async fn new(config: Config) -> Self {
        let registry = RuntimeRegistry::scan(&config.packages_root);
        let sandbox = probe_sandbox(&config).await;
        info!(mode = ?sandbox.mode, "executor initialized");
        Self {
            config,
            registry,
            sandbox,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// List installed runtimes as `(language, versions)` pairs.
    pub fn runtimes(&self) -> Vec<(String, Vec<String>)> {
        self.registry.list_runtimes()
    }

    /// Rescan the runtime tree.
    pub fn refresh_runtimes(&self) {
        self.registry.refresh();
    }

    /// Report the cached sandbox mode and the probe error, if any.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            sandbox_mode: self.sandbox.mode,
            probe_error: self.sandbox.error.clone(),
        }
    }

    /// Execute a request to completion.
    pub async fn execute(&self, request: ExecRequest) -> Result<ExecResult, ExecuteError> {
        self.run(request, None).await
    }

    /// Execute a request that the caller may abandon. When `cancel` is
    /// notified the process group is killed, the workspace torn down, and
    /// a result with [`Outcome::Cancelled`](crate::types::Outcome) returned.
    pub async fn execute_cancellable(
        &self,
        request: ExecRequest,
        cancel: Arc<Notify>,
    ) -> Result<ExecResult, ExecuteError> {
        self.run(request, Some(cancel)).await
    }

    #[instrument(skip(self, request, cancel), fields(language = %request.language, version = %request.version))]
    async fn run(
        &self,
        request: ExecRequest,
        cancel: Option<Arc<Notify>>,
    ) -> Result<ExecResult, ExecuteError> {
        let job_id = Uuid::new_v4();
        let limits = &self.config.limits;

        // Everything below touches the filesystem; nothing above does.
        request.validate(limits)?;
        let descriptor = self
            .registry
            .resolve(&request.language, &request.version)?;

        let mode = self.sandbox.mode;
        if !request.internet && mode == SandboxMode::Direct {
            if self.config.require_net_isolation {
                return Err(SandboxError::IsolationUnavailable.into());
            }
            debug!(%job_id, "direct mode cannot isolate the network, proceeding");
        }

        let time_limit = request
            .time_limit_seconds
            .unwrap_or(limits.default_time_limit);
        let memory_mb = request.memory_limit_mb.unwrap_or(limits.default_memory_mb);
        let processes = request.process_limit.unwrap_or(limits.default_processes);

        let mut workspace = Workspace::create(&self.config.workspace_root())
            .await
            .map_err(ExecuteError::Workspace)?;
        for (index, file) in request.files.iter().enumerate() {
            let executable = index == 0 && descriptor.spec().entry_executable;
            if let Err(e) = workspace
                .write_file(&file.name, &file.content, executable)
                .await
            {
                workspace.cleanup().await;
                return Err(ExecuteError::Workspace(e));
            }
        }
        let entry = &request.files[0].name;

        let runtime_argv = RuntimeRegistry::argv_for(&descriptor, entry, &request.args);
        let (argv, cwd, home) = match mode {
            SandboxMode::Namespaced => (
                self.namespaced_argv(workspace.path(), runtime_argv, request.internet),
                None,
                IN_SANDBOX_APP.to_string(),
            ),
            SandboxMode::Direct => {
                let home = workspace.path().to_string_lossy().into_owned();
                (runtime_argv, Some(workspace.path().to_path_buf()), home)
            }
        };

        let launch = LaunchSpec {
            argv,
            cwd,
            env: child_env(&descriptor, &home),
            stdin: request.stdin.clone(),
            rlimits: RlimitSet::new(
                time_limit,
                memory_mb,
                processes,
                limits.max_output_file_bytes,
                limits.max_open_files,
            ),
            stdout_cap: limits.max_stdout_bytes,
            stderr_cap: limits.max_stderr_bytes,
            time_limit: Duration::from_secs_f64(time_limit),
            sigterm_grace: Duration::from_millis(limits.sigterm_grace_ms),
        };

        info!(
            %job_id,
            language = %descriptor.language,
            version = %descriptor.resolved_version,
            mode = ?mode,
            "executing job"
        );

        let supervised = match supervise(launch, cancel).await {
            Ok(supervised) => supervised,
            Err(e) => {
                workspace.cleanup().await;
                return Err(e.into());
            }
        };

        let outcome = classify(&ChildFacts {
            exit_code: supervised.exit_code,
            signal: supervised.signal,
            deadline_fired: supervised.deadline_fired,
            cancelled: supervised.cancelled,
            output_exceeded: supervised.output_exceeded,
            memory_limited: true,
            namespaced: mode == SandboxMode::Namespaced,
            stderr: &supervised.stderr.bytes,
        });

        let exit_code = supervised.exit_code;
        let termination_signal = supervised.signal;
        let wall_time_ms = supervised.wall_time.as_millis() as u64;
        let cpu_time_ms = supervised.cpu_time.map(|t| t.as_millis() as u64);
        let stdout = truncate_stream(supervised.stdout, limits.max_stdout_bytes, "stdout");
        let stderr = truncate_stream(supervised.stderr, limits.max_stderr_bytes, "stderr");

        // The child group is already fully terminated; now the workspace
        // can go. Deletion failures are logged, never raised.
        workspace.cleanup().await;

        info!(
            %job_id,
            ?outcome,
            exit_code = ?exit_code,
            wall_time_ms,
            "job finished"
        );

        Ok(ExecResult {
            job_id,
            stdout: stdout.bytes,
            stderr: stderr.bytes,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            exit_code,
            termination_signal,
            outcome,
            wall_time_ms,
            cpu_time_ms,
        })
    }

    /// Wrap the runtime argv in the helper invocation: the standard
    /// read-only system view, the runtime tree at its expected path, the
    /// workspace read-write at a fixed mount point, fresh /tmp, /proc and
    /// minimal /dev, and every namespace the request allows.
    fn namespaced_argv(
        &self,
        workspace: &Path,
        runtime_argv: Vec<String>,
        internet: bool,
    ) -> Vec<String> {
        let packages_root = &self.config.packages_root;
        BwrapCommand::new(self.config.sandbox_helper())
            .die_with_parent()
            .new_session()
            .unshare_user()
            .unshare_pid()
            .unshare_ipc()
            .unshare_uts()
            .unshare_cgroup()
            .unshare_net(!internet)
            .hostname(SANDBOX_HOSTNAME)
            .ro_bind("/usr", "/usr")
            .ro_bind_try("/lib", "/lib")
            .ro_bind_try("/lib64", "/lib64")
            .ro_bind_try("/bin", "/bin")
            .ro_bind_try("/etc/alternatives", "/etc/alternatives")
            .ro_bind(packages_root, packages_root)
            .bind(workspace, IN_SANDBOX_APP)
            .chdir(IN_SANDBOX_APP)
            .dev("/dev")
            .proc("/proc")
            .tmpfs("/tmp")
            .drop_caps()
            .command(runtime_argv)
            .build()
    }
}

/// The child's entire environment: the runtime's bin directory as PATH, a
/// home inside the workspace, a fixed locale, and the language table's
/// adjustments. Nothing is inherited.
fn child_env(descriptor: &RuntimeDescriptor, home: &str) -> Vec<(String, String)> {
    let mut env = vec![
        (
            "PATH".to_string(),
            descriptor.bin_dir().to_string_lossy().into_owned(),
        ),
        ("HOME".to_string(), home.to_string()),
        ("LANG".to_string(), "C.UTF-8".to_string()),
    ];
    for (key, value) in descriptor.spec().env {
        env.push(((*key).to_string(), (*value).to_string()));
    }
    env
}
