use super::*;
use crate::gate::{SyntaxPolicy, ValidatorCommand};
use crate::llm::scripted::{Reply, ScriptedGenerator};
use crate::llm::{FallbackChain, GenerationError};
use crate::report::DiagnosticRecord;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

const ORIGINAL: &str = "<?php $title = 'x'; ?>\n<style>\nh1{color:#FFF}\n</style>\n<?php echo $title; ?>\n";
const FIXED: &str = "<?php $title = 'x'; ?>\n<style>\nh1 {\n  color: #fff;\n}\n</style>\n<?php echo $title; ?>\n";

fn chain(models: &[&str]) -> FallbackChain {
    FallbackChain {
        models: models.iter().map(|m| m.to_string()).collect(),
        attempt_timeout: Duration::from_secs(5),
        rate_limit_pause: Duration::ZERO,
    }
}

fn gate(argv: &[&str]) -> SafetyGate {
    let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
    SafetyGate {
        validator: ValidatorCommand::from_argv(&argv).unwrap(),
        transient_suffix: ".check.php".to_string(),
        validator_timeout: Duration::from_secs(10),
        syntax_policy: SyntaxPolicy::Strict,
    }
}

fn fixer(replies: Vec<Reply>, models: &[&str], validator: &[&str]) -> Fixer<ScriptedGenerator> {
    let generator = PatchGenerator::new(ScriptedGenerator::new(replies), chain(models));
    Fixer::new(generator, gate(validator))
}

fn task_for(dir: &Path, name: &str, content: &str) -> FileTask {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    FileTask {
        path,
        diagnostics: vec![DiagnosticRecord {
            line: Some(3),
            message: "Expected \"#FFF\" to be \"#fff\" (color-hex-case)".to_string(),
        }],
    }
}

fn transient(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".check.php");
    PathBuf::from(name)
}

#[cfg(unix)]
#[tokio::test]
async fn test_second_model_output_is_committed_after_first_fails() {
    let dir = tempdir().unwrap();
    let task = task_for(dir.path(), "header.php", ORIGINAL);
    let fenced = format!("```php\n{}```", FIXED);
    let fixer = fixer(
        vec![
            Reply::Fail(GenerationError::Api {
                status: 500,
                message: "internal".to_string(),
            }),
            Reply::Text(fenced),
        ],
        &["fast", "smart"],
        &["true"],
    );

    let outcome = fixer.fix_file(&task).await;

    assert_eq!(
        outcome,
        FixOutcome::Fixed {
            model: "smart".to_string()
        }
    );
    assert!(outcome.is_success());
    assert_eq!(fs::read_to_string(&task.path).unwrap(), FIXED);
    assert!(!transient(&task.path).exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_all_models_empty_never_reaches_gate() {
    let dir = tempdir().unwrap();
    let task = task_for(dir.path(), "header.php", ORIGINAL);
    let marker = dir.path().join("validator-ran");
    let script = format!("touch '{}'", marker.display());
    let fixer = fixer(
        vec![Reply::text(""), Reply::text("   ")],
        &["fast", "smart"],
        &["sh", "-c", &script, "sh"],
    );

    let outcome = fixer.fix_file(&task).await;

    assert!(matches!(outcome, FixOutcome::GenerationFailed { .. }));
    assert!(!outcome.is_success());
    assert!(!marker.exists());
    assert_eq!(fs::read_to_string(&task.path).unwrap(), ORIGINAL);
}

#[cfg(unix)]
#[tokio::test]
async fn test_syntax_failure_keeps_original_and_removes_transient() {
    let dir = tempdir().unwrap();
    let task = task_for(dir.path(), "header.php", ORIGINAL);
    let fixer = fixer(vec![Reply::text(FIXED)], &["fast"], &["false"]);

    let outcome = fixer.fix_file(&task).await;

    assert!(matches!(
        outcome,
        FixOutcome::Rejected {
            reason: RejectReason::SyntaxInvalid,
            ..
        }
    ));
    assert_eq!(fs::read_to_string(&task.path).unwrap(), ORIGINAL);
    assert!(!transient(&task.path).exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_dropped_php_tag_is_rejected() {
    let dir = tempdir().unwrap();
    let original = "<?php $a = 1; ?>\n<p style=\"color:RED\">x</p>\n<?php $b = 2; ?>\n";
    let candidate = "$a = 1; ?>\n<p style=\"color: red\">x</p>\n<?php $b = 2; ?>\n";
    let task = task_for(dir.path(), "inline.php", original);
    let fixer = fixer(vec![Reply::text(candidate)], &["fast"], &["true"]);

    let outcome = fixer.fix_file(&task).await;

    assert!(matches!(
        outcome,
        FixOutcome::Rejected {
            reason: RejectReason::TagCountMismatch,
            ..
        }
    ));
    assert_eq!(fs::read_to_string(&task.path).unwrap(), original);
}

#[cfg(unix)]
#[tokio::test]
async fn test_identical_output_is_unchanged() {
    let dir = tempdir().unwrap();
    let task = task_for(dir.path(), "header.php", ORIGINAL);
    let marker = dir.path().join("validator-ran");
    let script = format!("touch '{}'", marker.display());
    // Trimmed output loses the final newline; reconciliation restores it
    let fixer = fixer(
        vec![Reply::text(ORIGINAL.trim_end())],
        &["fast"],
        &["sh", "-c", &script, "sh"],
    );

    let outcome = fixer.fix_file(&task).await;

    assert_eq!(
        outcome,
        FixOutcome::Unchanged {
            model: "fast".to_string()
        }
    );
    assert!(!outcome.is_success());
    assert!(!marker.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_dry_run_checks_but_does_not_write() {
    let dir = tempdir().unwrap();
    let task = task_for(dir.path(), "header.php", ORIGINAL);
    let fixer = fixer(vec![Reply::text(FIXED)], &["fast"], &["true"]).dry_run(true);

    let outcome = fixer.fix_file(&task).await;

    assert_eq!(
        outcome,
        FixOutcome::WouldFix {
            model: "fast".to_string()
        }
    );
    assert_eq!(fs::read_to_string(&task.path).unwrap(), ORIGINAL);
}

#[tokio::test]
async fn test_unreadable_file_is_io_failure() {
    let dir = tempdir().unwrap();
    let task = FileTask {
        path: dir.path().join("deleted.php"),
        diagnostics: vec![],
    };
    let fixer = fixer(vec![Reply::text(FIXED)], &["fast"], &["true"]);

    let outcome = fixer.fix_file(&task).await;

    assert!(matches!(outcome, FixOutcome::IoFailed { .. }));
    assert!(fixer.generator.backend().calls().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_continues_after_rejection() {
    let dir = tempdir().unwrap();
    let first = task_for(dir.path(), "a.php", ORIGINAL);
    let second = task_for(dir.path(), "b.php", ORIGINAL);
    let broken = FIXED.replacen("<?php", "", 1);
    let fixer = fixer(
        vec![Reply::Text(broken), Reply::text(FIXED)],
        &["fast"],
        &["true"],
    );

    let summary = fixer.run(vec![first.clone(), second.clone()]).await;

    assert_eq!(summary.files.len(), 2);
    assert_eq!(summary.rejected(), 1);
    assert_eq!(summary.fixed(), 1);
    assert_eq!(summary.failed(), 0);
    assert_eq!(fs::read_to_string(&first.path).unwrap(), ORIGINAL);
    assert_eq!(fs::read_to_string(&second.path).unwrap(), FIXED);
    assert_eq!(
        summary.to_string(),
        "2 file(s): 1 fixed, 0 unchanged, 1 rejected, 0 failed"
    );
}

#[test]
fn test_normalize_generated_content_adds_newline_when_original_had() {
    let normalized = normalize_generated_content("line1\n", "line1".to_string());
    assert_eq!(normalized, "line1\n");
}

#[test]
fn test_normalize_generated_content_strips_newline_when_original_missing() {
    let normalized = normalize_generated_content("line1", "line1\n\n".to_string());
    assert_eq!(normalized, "line1");
}

#[test]
fn test_normalize_generated_content_preserves_crlf() {
    let normalized = normalize_generated_content("line1\r\n", "line1".to_string());
    assert_eq!(normalized, "line1\r\n");
}
