//! Per-process resource ceilings installed between fork and exec.
//!
//! The limits are hard rlimits applied in the child's pre-exec hook, so
//! user code starts already bounded. Wall-clock enforcement is not handled
//! here: a sleeping process accumulates no CPU time, so the executor races
//! a wall timer against the child instead.

use nix::sys::resource::{Resource, setrlimit};

/// Hard rlimits for one execution.
///
/// `install` runs between fork and exec and must stay async-signal-safe:
/// it makes plain setrlimit syscalls and never allocates. Any failure
/// aborts the spawn, which the executor surfaces as a sandbox error.
#[derive(Debug, Clone, Copy)]
pub struct RlimitSet {
    /// CPU budget in whole seconds. The soft limit delivers SIGXCPU; the
    /// hard limit sits one second above it.
    pub cpu_seconds: u64,

    /// Address-space ceiling in bytes.
    pub address_space_bytes: u64,

    /// Largest file the child may create, in bytes.
    pub file_size_bytes: u64,

    /// Open file descriptor ceiling.
    pub open_files: u64,

    /// Processes/threads the execution's identity may hold.
    pub processes: u64,
}

impl RlimitSet {
    /// Derive the rlimit set for a request.
    pub fn new(
        time_limit_seconds: f64,
        memory_limit_mb: u64,
        process_limit: u32,
        file_size_bytes: u64,
        open_files: u64,
    ) -> Self {
        Self {
            cpu_seconds: (time_limit_seconds.ceil() as u64).max(1),
            address_space_bytes: memory_limit_mb * 1024 * 1024,
            file_size_bytes,
            open_files,
            processes: u64::from(process_limit),
        }
    }

    /// Apply every limit to the calling process. Runs in the child's
    /// pre-exec hook.
    pub fn install(&self) -> std::io::Result<()> {
        apply(Resource::RLIMIT_CPU, self.cpu_seconds, self.cpu_seconds + 1)?;
        apply(
            Resource::RLIMIT_AS,
            self.address_space_bytes,
            self.address_space_bytes,
        )?;
        apply(
            Resource::RLIMIT_FSIZE,
            self.file_size_bytes,
            self.file_size_bytes,
        )?;
        apply(Resource::RLIMIT_NOFILE, self.open_files, self.open_files)?;
        apply(Resource::RLIMIT_NPROC, self.processes, self.processes)?;
        // Core dumps disabled
        apply(Resource::RLIMIT_CORE, 0, 0)?;
        Ok(())
    }
}

fn apply(resource: Resource, soft: u64, hard: u64) -> std::io::Result<()> {
    setrlimit(resource, soft, hard)
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}
