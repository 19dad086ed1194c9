//! In-place application of a structured fix
//!
//! Replaces one 1-indexed line, keeping the original line's leading
//! whitespace and line ending.

use deflake_core::{DeflakeError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Record of a line replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPatch {
    pub path: PathBuf,
    pub line: u32,
    pub original: String,
    pub replacement: String,
}

/// Replace line `line` of `path` with `new_content`
pub fn replace_line(path: &Path, line: u32, new_content: &str) -> Result<AppliedPatch> {
    if !path.is_file() {
        return Err(DeflakeError::Patch(format!(
            "source file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let mut lines: Vec<&str> = content.split_inclusive('\n').collect();

    let index = (line as usize).checked_sub(1).filter(|i| *i < lines.len());
    let Some(index) = index else {
        return Err(DeflakeError::Patch(format!(
            "line {} out of range for {} ({} lines)",
            line,
            path.display(),
            lines.len()
        )));
    };

    let current = lines[index];
    let (text, ending) = split_ending(current);
    let indent: String = text.chars().take_while(|c| c.is_whitespace()).collect();
    let line_break = if ending.is_empty() { "\n" } else { ending };
    let replacement = format!(
        "{}{}",
        indent_block(new_content, &indent).join(line_break),
        ending
    );

    lines[index] = &replacement;
    std::fs::write(path, lines.concat())?;

    info!("Patched {}:{}", path.display(), line);
    Ok(AppliedPatch {
        path: path.to_path_buf(),
        line,
        original: text.to_string(),
        replacement: replacement.trim_end_matches(['\r', '\n']).to_string(),
    })
}

/// Place every line of `code` at `indent`, keeping the lines' relative nesting
fn indent_block(code: &str, indent: &str) -> Vec<String> {
    let mut lines = code.trim().lines();
    let Some(first) = lines.next() else {
        return vec![indent.to_string()];
    };
    let rest: Vec<&str> = lines.map(|l| l.trim_end_matches('\r')).collect();

    // Common margin of the continuation lines
    let margin = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    std::iter::once(format!("{}{}", indent, first.trim_end()))
        .chain(rest.iter().map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", indent, l.get(margin..).unwrap_or_else(|| l.trim_start()))
            }
        }))
        .collect()
}

fn split_ending(line: &str) -> (&str, &str) {
    if let Some(text) = line.strip_suffix("\r\n") {
        (text, "\r\n")
    } else if let Some(text) = line.strip_suffix('\n') {
        (text, "\n")
    } else {
        (line, "")
    }
}
