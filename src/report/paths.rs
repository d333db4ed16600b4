//! Mapping extracted stylesheet paths back to their source files
//!
//! Stylelint cannot read styles embedded in templates, so an upstream step
//! copies each `<style>` block or `style=""` attribute into
//! `.tmp-stylelint/<original path>.style.css` (or `.inline.css`) and lints
//! those. The report then names the extracted copy, not the real file.

/// Extraction directory segment, in both separator conventions
const EXTRACT_DIRS: [&str; 2] = [".tmp-stylelint/", ".tmp-stylelint\\"];

/// Suffixes appended to the original path by the extraction step
const EXTRACT_SUFFIXES: [&str; 2] = [".style.css", ".inline.css"];

/// Reconstruct the original file path from an extracted stylesheet path.
///
/// Removes the extraction directory segment wherever it appears (absolute
/// report paths keep their leading directories) and strips one extraction
/// suffix. Paths that were never extracted come back unchanged; the caller
/// decides whether the result exists.
pub fn reconstruct_source_path(source: &str) -> String {
    let mut path = source.to_string();

    for dir in EXTRACT_DIRS {
        if let Some(pos) = path.find(dir) {
            path.replace_range(pos..pos + dir.len(), "");
            break;
        }
    }

    for suffix in EXTRACT_SUFFIXES {
        if let Some(stripped) = path.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }

    path
}
