//! Shared data model for failure triage

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// Where a failing test broke, as far as the log text reveals
///
/// Every field is individually optional. A value of this type is only ever
/// produced when at least `spec_file` or `root_cause_file` is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureLocation {
    /// Test file named in the runner's failure header
    pub spec_file: Option<String>,
    /// Line in `spec_file` where the failing test begins
    pub test_start_line: Option<u32>,
    /// Basename of the first non-dependency stack frame
    pub root_cause_file: Option<String>,
    /// That frame's path resolved against the working directory
    pub root_cause_absolute_path: Option<PathBuf>,
    pub root_cause_line: Option<u32>,
    /// Line in `spec_file` where the failing action was invoked
    pub test_step_line: Option<u32>,
}

impl FailureLocation {
    /// Whether enough was found to be worth reporting
    pub fn is_actionable(&self) -> bool {
        self.spec_file.is_some() || self.root_cause_file.is_some()
    }

    /// `Line <N>` hint for the remote brain, from the root-cause frame
    pub fn failing_line(&self) -> Option<String> {
        self.root_cause_line.map(|line| format!("Line {}", line))
    }
}

/// Kinds of failure artifacts, ordered by how useful they are to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Short textual context file (e.g. Playwright's `error-context.md`)
    RichContext,
    /// HTML page snapshot
    HtmlSnapshot,
    /// Packaged trace archive; never parsed
    BinaryTrace,
}

impl ArtifactKind {
    /// Score bonus on top of the modification time in milliseconds.
    ///
    /// The rich-context bonus exceeds any realistic epoch timestamp so that
    /// kind dominates recency for it.
    pub fn weight(&self) -> i64 {
        match self {
            ArtifactKind::RichContext => 10_000_000_000_000,
            ArtifactKind::HtmlSnapshot => 60_000,
            ArtifactKind::BinaryTrace => 0,
        }
    }

    /// Whether the content can be forwarded as text
    pub fn is_text(&self) -> bool {
        !matches!(self, ArtifactKind::BinaryTrace)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::RichContext => write!(f, "rich_context"),
            ArtifactKind::HtmlSnapshot => write!(f, "html_snapshot"),
            ArtifactKind::BinaryTrace => write!(f, "binary_trace"),
        }
    }
}

/// A file that might document the failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCandidate {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    /// Milliseconds since the epoch of the last modification
    pub modified_ms: i64,
    /// `kind.weight() + modified_ms`
    pub priority_score: i64,
}

impl ArtifactCandidate {
    pub fn new(path: PathBuf, kind: ArtifactKind, modified: SystemTime) -> Self {
        let modified_ms = modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Self {
            path,
            kind,
            modified_ms,
            priority_score: kind.weight().saturating_add(modified_ms),
        }
    }
}

impl Ord for ArtifactCandidate {
    /// Best candidate sorts first: score descending, then recency, then path
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority_score
            .cmp(&self.priority_score)
            .then_with(|| other.modified_ms.cmp(&self.modified_ms))
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for ArtifactCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Everything forwarded to the remote brain for one failing run
///
/// Built fresh per run and dropped once the remote call returns.
#[derive(Debug, Clone, Default)]
pub struct EvidenceBundle {
    pub error_log: String,
    /// Text content of the resolved artifact (never a binary trace)
    pub artifact_text: String,
    pub artifact_path: Option<PathBuf>,
    pub location: Option<FailureLocation>,
    /// Source of the root-cause file, if readable
    pub source_code: Option<String>,
}

/// Result of one wrapped child invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildProcessOutcome {
    pub exit_code: i32,
    /// stdout and stderr interleaved in arrival order
    pub output: String,
}

impl ChildProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
