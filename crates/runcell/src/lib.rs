//! A library for sandboxed code execution.
//!
//! Runcell takes a bundle of source files naming a language and version,
//! runs the entry file under enforced CPU, memory, process, output, and
//! wall-clock bounds, and returns the captured output together with a
//! classification of how the execution ended.
//!
//! # Features
//!
//! - **Sandboxed execution** — untrusted code runs under a bubblewrap
//!   namespace sandbox when the host supports it, with a resource-limited
//!   direct fallback otherwise.
//! - **Multi-language** — installed runtimes are discovered on disk and
//!   resolved from a `(language, version)` request, with prefix version
//!   matching.
//! - **Resource limits** — CPU time, address space, process count, file
//!   size, descriptor count, and per-stream output ceilings.
//! - **Outcome classification** — timeouts, memory exhaustion, output
//!   floods, runtime errors, and sandbox failures are reported as values,
//!   not errors.

pub use config::{Config, EXAMPLE_CONFIG, LimitsConfig};
pub use exec::{ExecuteError, Executor};
pub use runtime::{RuntimeDescriptor, RuntimeRegistry};
pub use sandbox::SandboxMode;
pub use types::{Capabilities, ExecRequest, ExecResult, Outcome, SubmittedFile};

pub mod config;
pub mod exec;
pub mod runtime;
pub mod sandbox;
pub mod types;
