//! Linter report normalization
//!
//! Turns an ESLint or Stylelint JSON report into one [`FileTask`] per real
//! file on disk, each carrying the diagnostics reported against it.

pub mod paths;

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use paths::reconstruct_source_path;

/// Which linter produced the report. Each has its own entry layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LinterKind {
    /// Per-file entries: `{ "filePath": ..., "messages": [...] }`
    Eslint,
    /// Per-extracted-stylesheet entries: `{ "source": ..., "warnings": [...] }`
    Stylelint,
}

impl LinterKind {
    pub fn label(&self) -> &'static str {
        match self {
            LinterKind::Eslint => "eslint",
            LinterKind::Stylelint => "stylelint",
        }
    }

    fn path_field(&self) -> &'static str {
        match self {
            LinterKind::Eslint => "filePath",
            LinterKind::Stylelint => "source",
        }
    }

    fn entries_field(&self) -> &'static str {
        match self {
            LinterKind::Eslint => "messages",
            LinterKind::Stylelint => "warnings",
        }
    }
}

/// One reported problem. `line` is `None` when the linter gave no position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub line: Option<u64>,
    pub message: String,
}

impl DiagnosticRecord {
    fn from_value(value: &Value) -> Self {
        let line = value.get("line").and_then(|v| v.as_u64());
        let message = value
            .get("message")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("text").and_then(|v| v.as_str()))
            .unwrap_or("Unknown error")
            .to_string();
        Self { line, message }
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Line {}: {}", line, self.message),
            None => write!(f, "Line ?: {}", self.message),
        }
    }
}

/// A file to fix and everything the linter said about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
    pub diagnostics: Vec<DiagnosticRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Load a report from disk.
///
/// A missing or blank file means the linter had nothing to say and yields
/// `Ok(None)`. Content that is present but not JSON is an error.
pub fn load_report(path: &Path) -> Result<Option<Value>, ReportError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|source| ReportError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| ReportError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Group report entries into per-file tasks.
///
/// Relative paths are resolved against `root`. Tasks come back in the order
/// their file was first seen, and diagnostics keep report order.
pub fn normalize(report: &Value, kind: LinterKind, root: &Path) -> Vec<FileTask> {
    let Some(entries) = report.as_array() else {
        if !report.is_null() {
            warn!(linter = kind.label(), "report is not a JSON array, nothing to fix");
        }
        return Vec::new();
    };

    let mut tasks: Vec<FileTask> = Vec::new();
    let mut by_path: HashMap<PathBuf, usize> = HashMap::new();

    for entry in entries {
        let Some(raw_path) = entry.get(kind.path_field()).and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(items) = entry
            .get(kind.entries_field())
            .and_then(|v| v.as_array())
            .filter(|items| !items.is_empty())
        else {
            continue;
        };

        let reported = match kind {
            LinterKind::Eslint => raw_path.to_string(),
            LinterKind::Stylelint => reconstruct_source_path(raw_path),
        };
        if reported.is_empty() {
            continue;
        }

        let path = resolve_path(root, &reported);
        if !path.is_file() {
            warn!(
                source = raw_path,
                resolved = %path.display(),
                "skipping report entry for unknown file"
            );
            continue;
        }

        let diagnostics = items.iter().map(DiagnosticRecord::from_value);
        match by_path.get(&path) {
            Some(&idx) => tasks[idx].diagnostics.extend(diagnostics),
            None => {
                by_path.insert(path.clone(), tasks.len());
                tasks.push(FileTask {
                    path,
                    diagnostics: diagnostics.collect(),
                });
            }
        }
    }

    debug!(
        linter = kind.label(),
        files = tasks.len(),
        "normalized report"
    );
    tasks
}

/// Keep only the task for `only`, as given on the command line.
///
/// A relative `only` is resolved against `root`. Paths are compared in
/// canonical form when they can be canonicalized, so `./x` and `x` match.
pub fn retain_file(tasks: Vec<FileTask>, root: &Path, only: &Path) -> Vec<FileTask> {
    let wanted = resolve_path(root, &only.to_string_lossy());
    let wanted = wanted.canonicalize().unwrap_or(wanted);

    let kept: Vec<FileTask> = tasks
        .into_iter()
        .filter(|task| {
            let path = task.path.canonicalize().unwrap_or_else(|_| task.path.clone());
            path == wanted
        })
        .collect();
    if kept.is_empty() {
        warn!(file = %only.display(), "report has no entries for the requested file");
    }
    kept
}

fn resolve_path(root: &Path, reported: &str) -> PathBuf {
    let path = Path::new(reported);
    if path.is_absolute() || root.as_os_str().is_empty() || root == Path::new(".") {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
