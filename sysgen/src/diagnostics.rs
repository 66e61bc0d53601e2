//! Diagnostic types for structured error reporting.
//!
//! `sysgen check --json` prints a [`CheckResult`]; the human-readable form
//! goes to stderr through [`render_diagnostic`].

use serde::Serialize;

use crate::error::{DeclFault, GenError};

/// Diagnostic severity level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// The result of checking a system call list.
#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    /// Number of calls accepted, when the list parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calls: Option<usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CheckResult {
    /// A passing check; `warnings` are reported but do not fail it.
    pub fn success(calls: usize, warnings: Vec<Diagnostic>) -> Self {
        CheckResult {
            status: "success".to_string(),
            calls: Some(calls),
            diagnostics: warnings,
        }
    }

    pub fn failure(diagnostic: Diagnostic) -> Self {
        CheckResult {
            status: "failure".to_string(),
            calls: None,
            diagnostics: vec![diagnostic],
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == "failure"
    }
}

/// A single diagnostic message.
#[derive(Debug, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub location: Location,
    pub message: String,
    pub context: String,
    pub suggestions: Vec<Suggestion>,
}

/// Input location: the file and, when known, the record index in it.
#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,
}

/// A suggested fix for a diagnostic.
#[derive(Debug, Serialize)]
pub struct Suggestion {
    pub strategy: String,
    pub description: String,
}

impl Diagnostic {
    /// Build a diagnostic from a generation error.
    ///
    /// `known_calls` feeds "did you mean?" suggestions for misspelt
    /// configuration entries.
    pub fn from_error(err: &GenError, file: &str, known_calls: &[String]) -> Self {
        let (context, suggestions) = match err {
            GenError::Malformed { fault, .. } => (
                "System call parameters must be `<type> <name>` items that fit the register convention."
                    .to_string(),
                suggest_for_fault(*fault),
            ),
            GenError::Duplicate { .. } => (
                "Each system call name must be unique across all headers.".to_string(),
                vec![Suggestion {
                    strategy: "rename".to_string(),
                    description: "Rename one of the declarations or drop the duplicate.".to_string(),
                }],
            ),
            GenError::IdCollision { .. } => (
                "Call ids are derived from the upper-cased name.".to_string(),
                vec![],
            ),
            GenError::ReservedId { .. } => (
                "`K_SYSCALL_UNIMPLEMENTED`, `K_SYSCALL_NUM` and `handle_unimplemented` belong to the dispatch table."
                    .to_string(),
                vec![Suggestion {
                    strategy: "rename".to_string(),
                    description: "Rename the system call.".to_string(),
                }],
            ),
            GenError::UnitPath { .. } => (
                "Wrapper headers are written below the output directory under their unit name.".to_string(),
                vec![Suggestion {
                    strategy: "rename".to_string(),
                    description: "Use a relative header path without `.` or `..` components.".to_string(),
                }],
            ),
            GenError::UnknownCall { name, .. } => (
                "Binding overrides must name a declared system call.".to_string(),
                suggest_similar_name(name, known_calls),
            ),
            GenError::ConflictingBinding { .. } => (
                "A call is either always linked in or configured out, not both.".to_string(),
                vec![],
            ),
            GenError::Input(_) => (
                "Expected a JSON array of [[\"<ret> <name>\", \"<params>\"], \"<header>\"] records."
                    .to_string(),
                vec![],
            ),
            GenError::Io { .. } => (
                "Could not read or write the specified file.".to_string(),
                vec![],
            ),
            GenError::Internal(_) => (String::new(), vec![]),
        };

        Diagnostic {
            code: err.code().to_string(),
            severity: Severity::Error,
            location: Location {
                file: file.to_string(),
                record: err.record(),
            },
            message: err.to_string(),
            context,
            suggestions,
        }
    }
}

impl Diagnostic {
    /// Warning for a manifest key the generator does not know.
    pub fn unknown_manifest_key(key: &str, manifest: &str) -> Self {
        Diagnostic {
            code: "CFG_003".to_string(),
            severity: Severity::Warning,
            location: Location {
                file: manifest.to_string(),
                record: None,
            },
            message: format!("unknown key `{key}` in [generator]"),
            context: "The key is ignored.".to_string(),
            suggestions: suggest_similar_name(key, &known_manifest_keys()),
        }
    }
}

fn known_manifest_keys() -> Vec<String> {
    crate::config::GENERATOR_KEYS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

fn suggest_for_fault(fault: DeclFault) -> Vec<Suggestion> {
    let (strategy, description) = match fault {
        DeclFault::Array => ("pointer", "Declare the parameter as `T *name` instead of `T name[N]`."),
        DeclFault::FunctionPointer => ("typedef", "Introduce a typedef for the function pointer type."),
        DeclFault::Unparseable => ("name", "Give every parameter both a type and a name."),
        DeclFault::ReservedName => ("rename", "Rename the parameter."),
    };
    vec![Suggestion {
        strategy: strategy.to_string(),
        description: description.to_string(),
    }]
}

/// Render a diagnostic for a terminal.
///
/// ```text
/// error[SIG_001]: record 2: in declaration of `int k_read`: `char buf[8]`: ...
///   --> syscalls.json (record 2)
///   = System call parameters must be ...
///   help: Declare the parameter as `T *name` instead of `T name[N]`.
/// ```
pub fn render_diagnostic(diag: &Diagnostic) -> String {
    let severity_str = match diag.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    let mut out = format!("{}[{}]: {}\n", severity_str, diag.code, diag.message);

    match diag.location.record {
        Some(record) => out.push_str(&format!("  --> {} (record {})\n", diag.location.file, record)),
        None => out.push_str(&format!("  --> {}\n", diag.location.file)),
    }
    if !diag.context.is_empty() {
        out.push_str(&format!("  = {}\n", diag.context));
    }
    for suggestion in &diag.suggestions {
        out.push_str(&format!("  help: {}\n", suggestion.description));
    }
    out
}

// ---------------------------------------------------------------------------
// Fix suggestions
// ---------------------------------------------------------------------------

/// Compute Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b.is_empty() {
        return a.chars().count();
    }
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];
    for (i, ac) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, bc) in b.chars().enumerate() {
            let cost = if ac == bc { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Find the closest matching name from a list of candidates.
pub fn find_similar_name<'a>(name: &str, candidates: &'a [String]) -> Option<&'a str> {
    let max_dist = (name.len() / 2 + 1).min(3);
    candidates
        .iter()
        .filter(|c| c.len().abs_diff(name.len()) <= max_dist)
        .map(|c| (c.as_str(), levenshtein_distance(name, c)))
        .filter(|&(_, d)| d > 0 && d <= max_dist)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

fn suggest_similar_name(name: &str, known: &[String]) -> Vec<Suggestion> {
    find_similar_name(name, known)
        .map(|similar| Suggestion {
            strategy: "replace".to_string(),
            description: format!("Did you mean `{similar}`?"),
        })
        .into_iter()
        .collect()
}
