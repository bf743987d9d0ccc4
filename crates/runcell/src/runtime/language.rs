//! The static table of supported languages.
//!
//! Adding a language means adding one entry here; the registry, sandbox,
//! and executor need no change.

/// How to invoke one supported language.
#[derive(Debug)]
pub struct LanguageSpec {
    /// Language identifier as requested by clients (lowercase).
    pub id: &'static str,

    /// Interpreter binary names tried in order under the version's `bin/`
    /// directory.
    pub binary_names: &'static [&'static str],

    /// Argv template. `{interpreter}` expands to the resolved interpreter
    /// path and `{entry}` to the entry file's path in the workspace; user
    /// arguments are appended verbatim after expansion.
    pub argv_template: &'static [&'static str],

    /// Environment adjustments applied on top of the minimal base set.
    pub env: &'static [(&'static str, &'static str)],

    /// Whether the entry file must carry the executable bit.
    pub entry_executable: bool,
}

pub const LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        id: "python",
        binary_names: &["python3", "python"],
        argv_template: &["{interpreter}", "{entry}"],
        env: &[("PYTHONDONTWRITEBYTECODE", "1"), ("PYTHONUNBUFFERED", "1")],
        entry_executable: false,
    },
    LanguageSpec {
        id: "node",
        binary_names: &["node"],
        argv_template: &["{interpreter}", "{entry}"],
        env: &[("NODE_DISABLE_COLORS", "1")],
        entry_executable: false,
    },
];

/// Look up a language by its identifier, case-insensitively.
pub fn find_language(id: &str) -> Option<&'static LanguageSpec> {
    LANGUAGES.iter().find(|lang| lang.id.eq_ignore_ascii_case(id))
}

/// Expand placeholders in an argv template.
pub fn expand_template(template: &[&str], interpreter: &str, entry: &str) -> Vec<String> {
    template
        .iter()
        .map(|word| {
            word.replace("{interpreter}", interpreter)
                .replace("{entry}", entry)
        })
        .collect()
}
