//! Markdown fence stripping for generated file content
//!
//! Models often wrap literal output in ```` ```php ```` fences despite being
//! told not to. Only whole fence lines at the very start and end are removed;
//! every other byte is passed through because the safety gate compares exact
//! content.

const FENCE: &str = "```";

/// Strip leading and trailing code-fence lines.
///
/// Repeats until neither end is a fence line, so nested wrappers are removed
/// too and the function is idempotent.
pub fn sanitize(raw: &str) -> &str {
    let mut text = raw;

    while text.starts_with(FENCE) {
        text = match text.split_once('\n') {
            Some((_, rest)) => rest,
            None => "",
        };
    }

    while let Some(rest) = strip_closing_fence(text) {
        text = rest;
    }

    text
}

fn strip_closing_fence(text: &str) -> Option<&str> {
    let body = match text.strip_suffix('\n') {
        Some(body) => body.strip_suffix('\r').unwrap_or(body),
        None => text,
    };

    let (head, last) = match body.rfind('\n') {
        Some(idx) => (&body[..idx], &body[idx + 1..]),
        None => ("", body),
    };

    if !is_fence_line(last) {
        return None;
    }

    Some(head.strip_suffix('\r').unwrap_or(head))
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= FENCE.len() && trimmed.chars().all(|c| c == '`')
}
