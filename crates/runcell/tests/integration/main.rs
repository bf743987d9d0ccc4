//! Integration tests for runcell.
//!
//! Most tests run in direct mode against a synthetic runtime tree whose
//! "python" interpreter is a /bin/sh shim, so they need nothing beyond a
//! POSIX shell. Tests that exercise the namespace sandbox require
//! bubblewrap and are marked `#[ignore]`. To include them:
//!    cargo test -p runcell -- --include-ignored

use std::path::Path;

use runcell::{Config, Executor};

mod execution;
mod lifecycle;
mod limits;
mod runtimes;
mod validation;

pub(crate) const PYTHON_VERSION: &str = "3.11.9";

pub(crate) struct TestEnv {
    /// Keeps the packages and workspace trees alive for the test.
    pub root: tempfile::TempDir,
    pub config: Config,
}

impl TestEnv {
    pub(crate) fn workspace_root(&self) -> std::path::PathBuf {
        self.root.path().join("workspaces")
    }
}

/// Install `<language>/<version>/bin/<binary>` as a shim that hands the
/// entry file to /bin/sh, so "interpreted" programs are shell scripts.
pub(crate) fn install_shim_runtime(root: &Path, language: &str, version: &str, binary: &str) {
    use std::os::unix::fs::PermissionsExt;

    let bin = root
        .join("packages")
        .join(language)
        .join(version)
        .join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let path = bin.join(binary);
    std::fs::write(&path, "#!/bin/sh\nexec /bin/sh \"$@\"\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

pub(crate) fn test_env() -> TestEnv {
    let root = tempfile::tempdir().unwrap();
    install_shim_runtime(root.path(), "python", PYTHON_VERSION, "python3");

    let mut config = Config::default();
    config.packages_root = root.path().join("packages");
    config.workspace_root = Some(root.path().join("workspaces"));
    config.use_sandbox = false;
    // RLIMIT_NPROC counts every process of the test uid, so the ceiling
    // must clear whatever else the account is running.
    config.limits.default_processes = 2048;
    config.limits.max_processes = 4096;

    TestEnv { root, config }
}

pub(crate) async fn executor(env: &TestEnv) -> Executor {
    Executor::new(env.config.clone()).await
}
