use crate::commit::write_atomic;
use crate::gate::{GateResult, RejectReason, SafetyGate};
use crate::llm::{sanitize, PatchGenerator, TextGenerator};
use crate::report::FileTask;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  PER-FILE PIPELINE (generate → sanitize → gate → commit)
// ═══════════════════════════════════════════════════════════════════════════

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    /// Patched content passed the gate and was written
    Fixed { model: String },
    /// Passed the gate, but `--dry-run` skipped the write
    WouldFix { model: String },
    /// The generator handed back the original content
    Unchanged { model: String },
    Rejected {
        reason: RejectReason,
        detail: String,
    },
    GenerationFailed { error: String },
    /// Reading or writing the target failed
    IoFailed { error: String },
}

impl FixOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FixOutcome::Fixed { .. } | FixOutcome::WouldFix { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FixOutcome,
}

/// Tally of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn fixed(&self) -> usize {
        self.count(|o| o.is_success())
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, FixOutcome::Unchanged { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, FixOutcome::Rejected { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                FixOutcome::GenerationFailed { .. } | FixOutcome::IoFailed { .. }
            )
        })
    }

    fn count(&self, pred: impl Fn(&FixOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s): {} fixed, {} unchanged, {} rejected, {} failed",
            self.files.len(),
            self.fixed(),
            self.unchanged(),
            self.rejected(),
            self.failed()
        )
    }
}

/// Drives each [`FileTask`] through generation, the safety gate and commit
#[derive(Debug)]
pub struct Fixer<G> {
    generator: PatchGenerator<G>,
    gate: SafetyGate,
    dry_run: bool,
}

impl<G: TextGenerator> Fixer<G> {
    pub fn new(generator: PatchGenerator<G>, gate: SafetyGate) -> Self {
        Self {
            generator,
            gate,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Process tasks one at a time. A failure on one file never stops the
    /// rest.
    pub async fn run(&self, tasks: Vec<FileTask>) -> RunSummary {
        let mut summary = RunSummary::default();
        for task in tasks {
            let outcome = self.fix_file(&task).await;
            summary.files.push(FileReport {
                path: task.path,
                outcome,
            });
        }
        summary
    }

    pub async fn fix_file(&self, task: &FileTask) -> FixOutcome {
        let path = &task.path;
        info!(
            path = %path.display(),
            errors = task.diagnostics.len(),
            "fixing file"
        );

        let original = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read file");
                return FixOutcome::IoFailed {
                    error: e.to_string(),
                };
            }
        };

        let patch = match self.generator.generate(task, &original).await {
            Ok(patch) => patch,
            Err(e) => {
                error!(path = %path.display(), error = %e, "all models failed, keeping original");
                return FixOutcome::GenerationFailed {
                    error: e.to_string(),
                };
            }
        };

        let candidate = normalize_generated_content(&original, sanitize(&patch.text).to_string());
        if candidate == original {
            info!(path = %path.display(), model = %patch.model, "model returned the file unchanged");
            return FixOutcome::Unchanged { model: patch.model };
        }

        let content = match self.gate.check(path, &original, &candidate) {
            GateResult::Pass(content) => content,
            GateResult::Reject { reason, detail } => {
                warn!(
                    path = %path.display(),
                    model = %patch.model,
                    reason = %reason,
                    detail = %detail,
                    "safety check failed, keeping original"
                );
                return FixOutcome::Rejected { reason, detail };
            }
        };

        if self.dry_run {
            info!(path = %path.display(), model = %patch.model, "patch passed all checks (dry run, not written)");
            return FixOutcome::WouldFix { model: patch.model };
        }

        if let Err(e) = write_atomic(path, &content) {
            error!(path = %path.display(), error = %e, "failed to write patched file");
            return FixOutcome::IoFailed {
                error: e.to_string(),
            };
        }

        info!(path = %path.display(), model = %patch.model, "successfully fixed");
        FixOutcome::Fixed { model: patch.model }
    }
}

/// Match the candidate's trailing newline to the original's.
///
/// Generator output is trimmed, which would otherwise strip a file's final
/// newline on every fix.
pub(crate) fn normalize_generated_content(original: &str, content: String) -> String {
    let original_ends_newline = original.ends_with('\n');
    let mut normalized = content;

    if original_ends_newline {
        if !normalized.ends_with('\n') {
            if original.ends_with("\r\n") {
                normalized.push_str("\r\n");
            } else {
                normalized.push('\n');
            }
        }
    } else {
        while normalized.ends_with('\n') {
            if normalized.ends_with("\r\n") {
                let new_len = normalized.len().saturating_sub(2);
                normalized.truncate(new_len);
            } else {
                let new_len = normalized.len().saturating_sub(1);
                normalized.truncate(new_len);
            }
        }
    }

    normalized
}

#[cfg(test)]
mod tests;
