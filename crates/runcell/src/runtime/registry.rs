//! On-disk runtime scanning and version resolution.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::runtime::language::{LANGUAGES, LanguageSpec, expand_template, find_language};
use crate::runtime::RuntimeError;

/// A resolved runtime: language, concrete installed version, and the
/// interpreter to exec. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RuntimeDescriptor {
    pub language: String,
    pub resolved_version: String,
    pub interpreter_path: PathBuf,
    bin_dir: PathBuf,
    spec: &'static LanguageSpec,
}

impl RuntimeDescriptor {
    /// The `bin/` directory of the resolved runtime; becomes the child's
    /// entire PATH.
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// The language table entry this descriptor was resolved from.
    pub fn spec(&self) -> &'static LanguageSpec {
        self.spec
    }
}

/// Registry of runtimes installed under the packages root.
///
/// The snapshot is built once at startup and shared read-only; `refresh`
/// rescans the tree. `resolve` re-checks the interpreter on disk so a
/// runtime removed after the scan fails cleanly.
#[derive(Debug)]
pub struct RuntimeRegistry {
    root: PathBuf,
    installed: RwLock<BTreeMap<String, Vec<String>>>,
}

impl RuntimeRegistry {
    /// Scan the packages root and build the registry.
    pub fn scan(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let installed = RwLock::new(scan_tree(&root));
        Self { root, installed }
    }

    /// Rescan the packages root, replacing the snapshot.
    pub fn refresh(&self) {
        let fresh = scan_tree(&self.root);
        if let Ok(mut installed) = self.installed.write() {
            *installed = fresh;
        }
    }

    /// List installed runtimes as `(language, versions)` pairs, versions
    /// sorted ascending. Reflects the on-disk state at the last scan.
    pub fn list_runtimes(&self) -> Vec<(String, Vec<String>)> {
        self.installed
            .read()
            .map(|installed| {
                installed
                    .iter()
                    .map(|(lang, versions)| (lang.clone(), versions.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve a `(language, version)` request to a concrete runtime.
    ///
    /// The exact version wins when installed; otherwise the
    /// lexicographically-greatest installed version equal to the request or
    /// starting with `request + "."` is chosen, so `3.11` resolves to
    /// `3.11.9` and `3` to the greatest installed 3.x.
    pub fn resolve(&self, language: &str, version: &str) -> Result<RuntimeDescriptor, RuntimeError> {
        let spec = find_language(language)
            .ok_or_else(|| RuntimeError::UnsupportedLanguage(language.to_string()))?;

        let not_found = || RuntimeError::RuntimeNotFound {
            language: spec.id.to_string(),
            version: version.to_string(),
        };

        let versions = self
            .installed
            .read()
            .ok()
            .and_then(|installed| installed.get(spec.id).cloned())
            .unwrap_or_default();

        // Exact match first, then prefix matches greatest-first; the first
        // candidate with a usable interpreter on disk wins.
        let dotted = format!("{version}.");
        let mut candidates: Vec<String> = Vec::new();
        if versions.iter().any(|v| v == version) {
            candidates.push(version.to_string());
        }
        let mut prefixed: Vec<&String> =
            versions.iter().filter(|v| v.starts_with(&dotted)).collect();
        prefixed.sort();
        candidates.extend(prefixed.into_iter().rev().cloned());

        for resolved in candidates {
            let bin_dir = self.root.join(spec.id).join(&resolved).join("bin");
            let interpreter_path = spec
                .binary_names
                .iter()
                .map(|name| bin_dir.join(name))
                .find(|path| is_executable_file(path));

            if let Some(interpreter_path) = interpreter_path {
                debug!(
                    language = spec.id,
                    requested = version,
                    resolved = %resolved,
                    interpreter = %interpreter_path.display(),
                    "resolved runtime"
                );
                return Ok(RuntimeDescriptor {
                    language: spec.id.to_string(),
                    resolved_version: resolved,
                    interpreter_path,
                    bin_dir,
                    spec,
                });
            }
        }

        Err(not_found())
    }

    /// Build the command line for a resolved runtime: the interpreter,
    /// language-specific flags, the entry file, then the user arguments
    /// verbatim.
    pub fn argv_for(descriptor: &RuntimeDescriptor, entry: &str, args: &[String]) -> Vec<String> {
        let mut argv = expand_template(
            descriptor.spec.argv_template,
            &descriptor.interpreter_path.to_string_lossy(),
            entry,
        );
        argv.extend(args.iter().cloned());
        argv
    }
}

/// Scan `<root>/<language>` for version directories holding a usable
/// interpreter.
fn scan_tree(root: &Path) -> BTreeMap<String, Vec<String>> {
    let mut installed = BTreeMap::new();

    for spec in LANGUAGES {
        let lang_dir = root.join(spec.id);
        let mut versions = Vec::new();

        let entries = match std::fs::read_dir(&lang_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                installed.insert(spec.id.to_string(), versions);
                continue;
            }
            Err(e) => {
                warn!(language = spec.id, error = %e, "failed to scan runtime directory");
                installed.insert(spec.id.to_string(), versions);
                continue;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(version) = name.to_str() else {
                continue;
            };
            if !looks_like_version(version) {
                continue;
            }
            if !entry.path().is_dir() {
                continue;
            }

            let bin_dir = entry.path().join("bin");
            let usable = spec
                .binary_names
                .iter()
                .any(|binary| is_executable_file(&bin_dir.join(binary)));
            if usable {
                versions.push(version.to_string());
            } else {
                debug!(
                    language = spec.id,
                    version,
                    "skipping version directory without a usable interpreter"
                );
            }
        }

        versions.sort();
        installed.insert(spec.id.to_string(), versions);
    }

    installed
}

fn looks_like_version(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_digit() || c == '.')
        && name.chars().any(|c| c.is_ascii_digit())
}

fn is_executable_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
