//! Command builder for the bubblewrap CLI.
//!
//! Builds command-line arguments for the sandbox helper. The helper
//! receives mount and namespace flags followed by a `--` separator and the
//! runtime argv to exec inside the sandbox.

use std::path::{Path, PathBuf};

/// Builder for a bubblewrap invocation.
#[derive(Debug)]
pub struct BwrapCommand {
    /// Path to the helper binary
    helper_path: PathBuf,
    /// --ro-bind SRC DEST
    ro_binds: Vec<(String, String)>,
    /// --ro-bind-try SRC DEST (skipped silently when SRC is missing)
    ro_bind_tries: Vec<(String, String)>,
    /// --bind SRC DEST
    binds: Vec<(String, String)>,
    /// --tmpfs DEST
    tmpfs_mounts: Vec<String>,
    /// --proc DEST
    proc_mount: Option<String>,
    /// --dev DEST
    dev_mount: Option<String>,
    /// --chdir DIR
    chdir: Option<String>,
    /// --hostname NAME (requires a new uts namespace)
    hostname: Option<String>,
    unshare_user: bool,
    unshare_pid: bool,
    unshare_net: bool,
    unshare_ipc: bool,
    unshare_uts: bool,
    unshare_cgroup: bool,
    /// --cap-drop ALL
    drop_caps: bool,
    /// --die-with-parent
    die_with_parent: bool,
    /// --new-session
    new_session: bool,
    command: Vec<String>,
}

impl BwrapCommand {
    /// Create a new helper command builder.
    pub fn new(helper_path: impl Into<PathBuf>) -> Self {
        Self {
            helper_path: helper_path.into(),
            ro_binds: Vec::new(),
            ro_bind_tries: Vec::new(),
            binds: Vec::new(),
            tmpfs_mounts: Vec::new(),
            proc_mount: None,
            dev_mount: None,
            chdir: None,
            hostname: None,
            unshare_user: false,
            unshare_pid: false,
            unshare_net: false,
            unshare_ipc: false,
            unshare_uts: false,
            unshare_cgroup: false,
            drop_caps: false,
            die_with_parent: false,
            new_session: false,
            command: Vec::new(),
        }
    }

    /// Bind a host path read-only at the same or another path.
    pub fn ro_bind(mut self, source: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        self.ro_binds.push(path_pair(source, target));
        self
    }

    /// Bind a host path read-only, silently skipping it when the source
    /// does not exist (e.g. `/lib64` on some architectures).
    pub fn ro_bind_try(mut self, source: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        self.ro_bind_tries.push(path_pair(source, target));
        self
    }

    /// Bind a host path read-write.
    pub fn bind(mut self, source: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        self.binds.push(path_pair(source, target));
        self
    }

    /// Mount a fresh tmpfs at the target.
    pub fn tmpfs(mut self, target: impl AsRef<Path>) -> Self {
        self.tmpfs_mounts.push(path_str(target));
        self
    }

    /// Mount a fresh procfs at the target.
    pub fn proc(mut self, target: impl AsRef<Path>) -> Self {
        self.proc_mount = Some(path_str(target));
        self
    }

    /// Mount a minimal devtmpfs (null, zero, random, urandom, tty) at the
    /// target.
    pub fn dev(mut self, target: impl AsRef<Path>) -> Self {
        self.dev_mount = Some(path_str(target));
        self
    }

    /// Change directory inside the sandbox before exec.
    pub fn chdir(mut self, dir: impl AsRef<Path>) -> Self {
        self.chdir = Some(path_str(dir));
        self
    }

    /// Set the sandbox hostname. Only effective together with
    /// [`unshare_uts`](Self::unshare_uts).
    pub fn hostname(mut self, name: impl Into<String>) -> Self {
        self.hostname = Some(name.into());
        self
    }

    pub fn unshare_user(mut self) -> Self {
        self.unshare_user = true;
        self
    }

    pub fn unshare_pid(mut self) -> Self {
        self.unshare_pid = true;
        self
    }

    pub fn unshare_net(mut self, enable: bool) -> Self {
        self.unshare_net = enable;
        self
    }

    pub fn unshare_ipc(mut self) -> Self {
        self.unshare_ipc = true;
        self
    }

    pub fn unshare_uts(mut self) -> Self {
        self.unshare_uts = true;
        self
    }

    pub fn unshare_cgroup(mut self) -> Self {
        self.unshare_cgroup = true;
        self
    }

    /// Drop every capability in the sandbox.
    pub fn drop_caps(mut self) -> Self {
        self.drop_caps = true;
        self
    }

    /// Kill the sandbox when the supervising process dies.
    pub fn die_with_parent(mut self) -> Self {
        self.die_with_parent = true;
        self
    }

    /// Detach the sandbox from the controlling terminal.
    pub fn new_session(mut self) -> Self {
        self.new_session = true;
        self
    }

    /// Set the command to exec inside the sandbox.
    pub fn command(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Build the command-line arguments.
    ///
    /// Consumes self to avoid cloning the command vector.
    pub fn build(self) -> Vec<String> {
        let mut args = vec![self.helper_path.to_string_lossy().into_owned()];

        if self.die_with_parent {
            args.push("--die-with-parent".to_string());
        }
        if self.new_session {
            args.push("--new-session".to_string());
        }

        // Namespaces
        if self.unshare_user {
            args.push("--unshare-user".to_string());
        }
        if self.unshare_pid {
            args.push("--unshare-pid".to_string());
        }
        if self.unshare_net {
            args.push("--unshare-net".to_string());
        }
        if self.unshare_ipc {
            args.push("--unshare-ipc".to_string());
        }
        if self.unshare_uts {
            args.push("--unshare-uts".to_string());
        }
        if self.unshare_cgroup {
            args.push("--unshare-cgroup".to_string());
        }
        if let Some(ref name) = self.hostname {
            args.push("--hostname".to_string());
            args.push(name.clone());
        }

        // Filesystem view
        for (source, target) in &self.ro_binds {
            args.push("--ro-bind".to_string());
            args.push(source.clone());
            args.push(target.clone());
        }
        for (source, target) in &self.ro_bind_tries {
            args.push("--ro-bind-try".to_string());
            args.push(source.clone());
            args.push(target.clone());
        }
        for (source, target) in &self.binds {
            args.push("--bind".to_string());
            args.push(source.clone());
            args.push(target.clone());
        }
        if let Some(ref target) = self.dev_mount {
            args.push("--dev".to_string());
            args.push(target.clone());
        }
        if let Some(ref target) = self.proc_mount {
            args.push("--proc".to_string());
            args.push(target.clone());
        }
        for target in &self.tmpfs_mounts {
            args.push("--tmpfs".to_string());
            args.push(target.clone());
        }

        if let Some(ref dir) = self.chdir {
            args.push("--chdir".to_string());
            args.push(dir.clone());
        }
        if self.drop_caps {
            args.push("--cap-drop".to_string());
            args.push("ALL".to_string());
        }

        // Separator and command
        args.push("--".to_string());
        args.extend(self.command);

        args
    }

    /// Get the helper binary path.
    pub fn helper_path(&self) -> &Path {
        &self.helper_path
    }
}

fn path_pair(source: impl AsRef<Path>, target: impl AsRef<Path>) -> (String, String) {
    (path_str(source), path_str(target))
}

fn path_str(path: impl AsRef<Path>) -> String {
    path.as_ref().to_string_lossy().into_owned()
}
