//! Runtime discovery and resolution.
//!
//! Installed language runtimes live on disk at
//! `<packages_root>/<language>/<version>/bin/<interpreter>`. This module
//! scans that tree, resolves `(language, version)` requests to a concrete
//! interpreter, and builds the argv prefix to invoke it.

use thiserror::Error;

pub use crate::runtime::language::{LANGUAGES, LanguageSpec, expand_template, find_language};
pub use crate::runtime::registry::{RuntimeDescriptor, RuntimeRegistry};

mod language;
mod registry;

/// Errors from runtime resolution. Both are non-fatal for the service and
/// surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("language '{0}' is not supported")]
    UnsupportedLanguage(String),

    #[error("no installed runtime matches {language} {version}")]
    RuntimeNotFound { language: String, version: String },
}
