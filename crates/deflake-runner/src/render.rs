//! Rendering the brain's verdict
//!
//! A structured fix (`{code, line_number, reason}`) is parsed first, whether it
//! arrives as an object or as a JSON string (optionally wrapped in a markdown
//! code fence). Anything else is shown as plain text.

use deflake_client::HealResponse;
use deflake_core::FailureLocation;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::PathBuf;

const RULE: &str = "========================================";
const THIN_RULE: &str = "----------------------------------------";

/// Structured suggestion returned by the brain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredFix {
    pub code: String,
    /// Line the fix applies to; takes precedence over the extracted test step
    #[serde(default, deserialize_with = "lenient_line")]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Parsed fix payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fix {
    Structured(StructuredFix),
    Text { text: String },
}

impl Fix {
    /// The code or text to show
    pub fn body(&self) -> &str {
        match self {
            Fix::Structured(fix) => &fix.code,
            Fix::Text { text } => text,
        }
    }
}

/// Where a structured fix should be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixTarget {
    pub file: String,
    pub line: u32,
    /// Absolute path, when known, for `--apply`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl std::fmt::Display for FixTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Everything shown to the user for one triage
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<Fix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<FailureLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_target: Option<FixTarget>,
    /// Verbatim response body when the brain did not report success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// Interpret a `fix` payload
pub fn parse_fix(value: &Value) -> Fix {
    match value {
        Value::Object(_) => match serde_json::from_value::<StructuredFix>(value.clone()) {
            Ok(fix) => Fix::Structured(fix),
            Err(_) => Fix::Text {
                text: pretty(value),
            },
        },
        Value::String(s) => match serde_json::from_str::<StructuredFix>(strip_code_fence(s)) {
            Ok(fix) => Fix::Structured(fix),
            Err(_) => Fix::Text { text: s.clone() },
        },
        other => Fix::Text {
            text: other.to_string(),
        },
    }
}

/// Combine the response with the extracted location
pub fn build_report(response: &HealResponse, location: Option<&FailureLocation>) -> Report {
    if !response.is_success() {
        return Report {
            success: false,
            fix: None,
            location: location.cloned(),
            fix_target: None,
            response: Some(response.raw.clone()),
        };
    }

    let fix = response.fix().map(parse_fix);
    let fix_target = fix.as_ref().and_then(|f| fix_target(f, location));

    Report {
        success: true,
        fix,
        location: location.cloned(),
        fix_target,
        response: None,
    }
}

fn fix_target(fix: &Fix, location: Option<&FailureLocation>) -> Option<FixTarget> {
    let Fix::Structured(structured) = fix else {
        return None;
    };
    let line = structured.line_number?;
    let location = location?;

    match (&location.root_cause_file, &location.spec_file) {
        (Some(file), _) => Some(FixTarget {
            file: file.clone(),
            line,
            path: location.root_cause_absolute_path.clone(),
        }),
        (None, Some(spec)) => Some(FixTarget {
            file: spec.clone(),
            line,
            path: None,
        }),
        (None, None) => None,
    }
}

/// Human-readable report for the terminal
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", RULE);

    if !report.success {
        let _ = writeln!(out, "Failed to get a fix. Response:");
        if let Some(response) = &report.response {
            let _ = writeln!(out, "{}", pretty(response));
        }
        let _ = writeln!(out, "{}", RULE);
        return out;
    }

    let _ = writeln!(out, "Fix suggested");
    let _ = writeln!(out, "{}", RULE);

    if let Some(loc) = &report.location {
        if let Some(spec) = &loc.spec_file {
            match loc.test_start_line {
                Some(line) => {
                    let _ = writeln!(out, "Test:          {}:{}", spec, line);
                }
                None => {
                    let _ = writeln!(out, "Test:          {}", spec);
                }
            }
        }
        if let (Some(file), Some(line)) = (&loc.root_cause_file, loc.root_cause_line) {
            let _ = writeln!(out, "Runtime error: {}:{}", file, line);
        }
        match (&report.fix_target, &loc.spec_file, loc.test_step_line) {
            (Some(target), _, _) => {
                let _ = writeln!(out, "Fix target:    {}", target);
            }
            (None, Some(spec), Some(step)) => {
                let _ = writeln!(out, "Test step:     {}:{}", spec, step);
            }
            _ => {}
        }
    }

    if let Some(fix) = &report.fix {
        let _ = writeln!(out, "{}", THIN_RULE);
        if let Fix::Structured(StructuredFix {
            reason: Some(reason),
            ..
        }) = fix
        {
            let _ = writeln!(out, "Reason: {}\n", reason);
        }
        let _ = writeln!(out, "{}", fix.body().trim_end());
    }

    let _ = writeln!(out, "{}", RULE);
    out
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json)
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn lenient_line<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
