//! Wire types for the fix-suggestion service

use deflake_core::EvidenceBundle;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body sent to the brain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealRequest {
    pub error_log: String,
    /// Text artifact content; binary kinds never reach this field
    pub html_snapshot: String,
    /// `Line <N>` of the root-cause frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failing_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
}

impl From<&EvidenceBundle> for HealRequest {
    fn from(bundle: &EvidenceBundle) -> Self {
        Self {
            error_log: bundle.error_log.clone(),
            html_snapshot: bundle.artifact_text.clone(),
            failing_line: bundle.location.as_ref().and_then(|l| l.failing_line()),
            source_code: bundle.source_code.clone(),
        }
    }
}

/// Response body from the brain, kept verbatim
///
/// Only `status == "success"` counts as success; anything else is surfaced
/// to the user as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealResponse {
    pub raw: Value,
}

impl HealResponse {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn is_success(&self) -> bool {
        self.raw.get("status").and_then(Value::as_str) == Some("success")
    }

    /// The `fix` payload: a plain string or a `{code, line_number, reason}` object
    pub fn fix(&self) -> Option<&Value> {
        self.raw.get("fix").filter(|v| !v.is_null())
    }
}
