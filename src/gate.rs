//! Safety gate
//!
//! Every generated patch passes through here before it may replace a file.
//! The generator is told to keep PHP tags and logic intact, but nothing it
//! says is trusted: tag counts are compared mechanically and the result must
//! pass the language's own syntax check.

use crate::util::{run_command_with_timeout, truncate};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

/// Embedded-language boundary tokens whose counts must survive a patch
pub const OPEN_TAGS: [&str; 2] = ["<?php", "<?="];
pub const CLOSE_TAG: &str = "?>";

const MAX_VALIDATOR_OUTPUT_CHARS: usize = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TagCountMismatch,
    SyntaxInvalid,
    EmptyOutput,
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::TagCountMismatch => "tag-count-mismatch",
            RejectReason::SyntaxInvalid => "syntax-invalid",
            RejectReason::EmptyOutput => "empty-output",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    Pass(String),
    Reject {
        reason: RejectReason,
        /// Human-readable explanation (counts, validator output)
        detail: String,
    },
}

impl GateResult {
    fn reject(reason: RejectReason, detail: impl Into<String>) -> Self {
        GateResult::Reject {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, GateResult::Pass(_))
    }
}

/// What to do when the candidate fails the syntax check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxPolicy {
    /// Any validator failure rejects the patch
    #[default]
    Strict,
    /// Tolerate a failing candidate when the original already fails
    Baseline,
}

/// Occurrences of each boundary token in one piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DelimiterCounts {
    /// Same order as [`OPEN_TAGS`]
    pub open: [usize; 2],
    pub close: usize,
}

impl DelimiterCounts {
    pub fn of(content: &str) -> Self {
        Self {
            open: OPEN_TAGS.map(|tag| content.matches(tag).count()),
            close: content.matches(CLOSE_TAG).count(),
        }
    }

    fn open_total(&self) -> usize {
        self.open.iter().sum()
    }
}

/// Per-token count equality between original and candidate
pub fn check_delimiters(original: &str, candidate: &str) -> Result<(), String> {
    let before = DelimiterCounts::of(original);
    let after = DelimiterCounts::of(candidate);
    if before == after {
        return Ok(());
    }

    let per_tag = OPEN_TAGS
        .iter()
        .zip(before.open.iter().zip(after.open.iter()))
        .map(|(tag, (b, a))| format!("{} {}->{}", tag, b, a))
        .collect::<Vec<_>>()
        .join(", ");

    Err(format!(
        "original: {} open, {} close; patched: {} open, {} close ({}, {} {}->{})",
        before.open_total(),
        before.close,
        after.open_total(),
        after.close,
        per_tag,
        CLOSE_TAG,
        before.close,
        after.close
    ))
}

/// External syntax checker invocation, e.g. `php -l <file>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ValidatorCommand {
    /// Split a `["php", "-l"]`-style argv. `None` when empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn label(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug)]
enum Validation {
    Valid,
    Invalid(String),
    /// The validator never produced a verdict (spawn failure, timeout)
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct SafetyGate {
    pub validator: ValidatorCommand,
    /// Appended to the target path to name the transient validation file
    pub transient_suffix: String,
    pub validator_timeout: Duration,
    pub syntax_policy: SyntaxPolicy,
}

impl SafetyGate {
    /// Run every check against a candidate for `path`.
    ///
    /// Never touches `path` itself; the only file written is the transient
    /// copy, which is gone again when this returns.
    pub fn check(&self, path: &Path, original: &str, candidate: &str) -> GateResult {
        if candidate.trim().is_empty() {
            return GateResult::reject(RejectReason::EmptyOutput, "patched content is empty");
        }

        if let Err(detail) = check_delimiters(original, candidate) {
            return GateResult::reject(RejectReason::TagCountMismatch, detail);
        }

        match self.validate_candidate(path, candidate) {
            Validation::Valid => GateResult::Pass(candidate.to_string()),
            Validation::Unavailable(detail) => {
                GateResult::reject(RejectReason::SyntaxInvalid, detail)
            }
            Validation::Invalid(output) => {
                if self.syntax_policy == SyntaxPolicy::Baseline && self.original_already_invalid(path)
                {
                    warn!(
                        path = %path.display(),
                        "original already fails syntax check, accepting patch under baseline policy"
                    );
                    return GateResult::Pass(candidate.to_string());
                }
                GateResult::reject(RejectReason::SyntaxInvalid, output)
            }
        }
    }

    pub fn transient_path(&self, path: &Path) -> PathBuf {
        let mut name: OsString = path.as_os_str().to_os_string();
        name.push(&self.transient_suffix);
        PathBuf::from(name)
    }

    fn validate_candidate(&self, path: &Path, candidate: &str) -> Validation {
        let transient_path = self.transient_path(path);
        let transient = match TransientFile::create(transient_path, candidate) {
            Ok(file) => file,
            Err(e) => {
                return Validation::Unavailable(format!(
                    "could not write validation copy: {}",
                    e
                ))
            }
        };

        let verdict = self.run_validator(transient.path());
        drop(transient);
        verdict
    }

    fn original_already_invalid(&self, path: &Path) -> bool {
        matches!(self.run_validator(path), Validation::Invalid(_))
    }

    fn run_validator(&self, target: &Path) -> Validation {
        let mut cmd = Command::new(&self.validator.program);
        cmd.args(&self.validator.args).arg(target);

        debug!(validator = %self.validator.label(), target = %target.display(), "running syntax check");
        let result = match run_command_with_timeout(&mut cmd, self.validator_timeout) {
            Ok(result) => result,
            Err(e) => {
                return Validation::Unavailable(format!("{}: {}", self.validator.label(), e))
            }
        };

        if result.timed_out {
            return Validation::Unavailable(format!(
                "{} timed out after {:?}",
                self.validator.label(),
                self.validator_timeout
            ));
        }

        if result.success() {
            Validation::Valid
        } else {
            Validation::Invalid(truncate(
                &result.combined_output(),
                MAX_VALIDATOR_OUTPUT_CHARS,
            ))
        }
    }
}

/// A file that exists only for the lifetime of this value
struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    fn create(path: PathBuf, content: &str) -> io::Result<Self> {
        if let Err(e) = fs::write(&path, content) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove validation copy");
            }
        }
    }
}
