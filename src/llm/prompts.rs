use crate::report::FileTask;

pub const LINT_FIX_INSTRUCTIONS: &str = r#"You are a professional code fixer. Fix the linting errors in the code below.

IMPORTANT RULES:
1. ONLY return the fixed file content. No explanations, no markdown blocks.
2. DO NOT change any PHP tags (<?php, <?=, ?>) or any program logic. Every tag must appear exactly as often as in the original.
3. ONLY fix the CSS/HTML/JS styling and presentation issues reported below.
4. If you cannot fix an error without breaking the file, return the ORIGINAL code exactly."#;

/// Render diagnostics as a bullet list, one per line
pub fn format_diagnostics(task: &FileTask) -> String {
    task.diagnostics
        .iter()
        .map(|d| format!("- {}", d))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the single prompt sent to the generator for one file
pub fn build_fix_prompt(task: &FileTask, content: &str) -> String {
    format!(
        "{}\n\nFILE: {}\n\nERRORS:\n{}\n\nORIGINAL CODE:\n{}",
        LINT_FIX_INSTRUCTIONS,
        task.path.display(),
        format_diagnostics(task),
        content
    )
}
