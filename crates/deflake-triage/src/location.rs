//! Failure location extraction from raw runner output
//!
//! The log is read with a small ordered grammar:
//!
//! 1. **Header** - `1) [chromium] › tests/login.spec.ts:12:3 › ...` names the
//!    spec file and the line where the failing test starts.
//! 2. **Frames** - `at <label> (<path>:<line>:<col>)` or `at <path>:<line>:<col>`.
//! 3. **Adapter hints** - `Location: <path>:<line>` and `File: <path>` lines
//!    written by the pytest, Cypress and WebdriverIO adapters. Only consulted
//!    when the primary rules found nothing for that field.
//!
//! Two selection rules are then applied to the frames, each testable on its own:
//! the root cause is the first frame outside dependency code, and the test step
//! is the first frame inside the spec file.
//!
//! Nothing here fails: text that matches no rule yields `None`.

use deflake_core::FailureLocation;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

static HEADER_RE: OnceLock<Regex> = OnceLock::new();
static FRAME_RE: OnceLock<Regex> = OnceLock::new();
static LOCATION_HINT_RE: OnceLock<Regex> = OnceLock::new();
static FILE_HINT_RE: OnceLock<Regex> = OnceLock::new();

fn header_re() -> &'static Regex {
    HEADER_RE.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*\d+\)[ \t]+\[[^\]\r\n]+\][ \t]+(?:›|>)[ \t]+(?P<spec>[^\s:]+?\.(?:spec|test)\.[cm]?[jt]sx?):(?P<line>\d+):(?P<col>\d+)",
        )
        .expect("header pattern is valid")
    })
}

fn frame_re() -> &'static Regex {
    FRAME_RE.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*at[ \t]+(?:(?P<label>[^\r\n(]*?)[ \t]*\((?P<path>[^()\r\n]+?):(?P<line>\d+):(?P<col>\d+)\)|(?P<bare>[^\s()]+?):(?P<bare_line>\d+):(?P<bare_col>\d+))[ \t\r]*$",
        )
        .expect("frame pattern is valid")
    })
}

fn location_hint_re() -> &'static Regex {
    LOCATION_HINT_RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*Location:[ \t]+(?P<path>[^\r\n]+?):(?P<line>\d+)[ \t\r]*$")
            .expect("location hint pattern is valid")
    })
}

fn file_hint_re() -> &'static Regex {
    FILE_HINT_RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*File:[ \t]+(?P<path>[^\s][^\r\n]*?)[ \t\r]*$")
            .expect("file hint pattern is valid")
    })
}

/// Failure header captured from the runner's summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureHeader {
    pub spec_file: String,
    pub line: u32,
    pub column: u32,
}

/// One `at ...` line of a stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function / method label, if the frame had one
    pub label: Option<String>,
    /// Path exactly as printed
    pub path: String,
    pub line: u32,
    pub column: u32,
}

impl StackFrame {
    /// Final path component, accepting both separator styles
    pub fn basename(&self) -> &str {
        basename(&self.path)
    }
}

/// Explicit environment for path resolution
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    /// Base for relative frame paths
    pub working_dir: PathBuf,
    /// Expansion for `~/` paths; left unexpanded when absent
    pub home_dir: Option<PathBuf>,
    /// Path components that mark dependency code (e.g. `node_modules`)
    pub dependency_markers: Vec<String>,
}

impl ExtractionContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            home_dir: None,
            dependency_markers: vec!["node_modules".to_string()],
        }
    }

    pub fn with_home_dir(mut self, home_dir: Option<PathBuf>) -> Self {
        self.home_dir = home_dir;
        self
    }

    pub fn with_dependency_markers(mut self, markers: Vec<String>) -> Self {
        self.dependency_markers = markers;
        self
    }

    /// Whether a frame path points into dependency or runtime-internal code
    pub fn is_dependency_path(&self, path: &str) -> bool {
        if path.starts_with("node:") || path.starts_with("internal/") {
            return true;
        }
        path.split(['/', '\\'])
            .any(|component| self.dependency_markers.iter().any(|m| m == component))
    }

    /// Resolve a printed frame path to an absolute, lexically normalized path
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let path = match raw.strip_prefix("~/") {
            Some(rest) => match &self.home_dir {
                Some(home) => home.join(rest),
                None => PathBuf::from(raw),
            },
            None => {
                let p = Path::new(raw);
                if p.is_absolute() {
                    p.to_path_buf()
                } else {
                    self.working_dir.join(p)
                }
            }
        };
        normalize(&path)
    }
}

/// Parses runner output into a [`FailureLocation`]
#[derive(Debug, Clone)]
pub struct LocationExtractor {
    context: ExtractionContext,
}

impl LocationExtractor {
    pub fn new(context: ExtractionContext) -> Self {
        Self { context }
    }

    /// Derive a failure location from raw log text
    ///
    /// Returns `None` unless a spec file or a root-cause file was found.
    pub fn extract(&self, log: &str) -> Option<FailureLocation> {
        let header = parse_header(log);
        let frames = parse_frames(log);
        debug!(
            "Parsed log: header={}, {} stack frame(s)",
            header.is_some(),
            frames.len()
        );

        let mut location = FailureLocation::default();

        if let Some(header) = &header {
            location.spec_file = Some(header.spec_file.clone());
            location.test_start_line = Some(header.line);
        } else if let Some(file) = parse_file_hint(log) {
            location.spec_file = Some(file);
        }

        if let Some(frame) = self.select_root_cause(&frames) {
            location.root_cause_file = Some(frame.basename().to_string());
            location.root_cause_absolute_path = Some(self.context.resolve(&frame.path));
            location.root_cause_line = Some(frame.line);
        } else if let Some((path, line)) = parse_location_hint(log)
            .filter(|(path, _)| !self.context.is_dependency_path(path))
        {
            location.root_cause_file = Some(basename(&path).to_string());
            location.root_cause_absolute_path = Some(self.context.resolve(&path));
            location.root_cause_line = Some(line);
        }

        if let Some(spec_file) = &location.spec_file {
            location.test_step_line = select_test_step(&frames, spec_file).map(|f| f.line);
        }

        if location.is_actionable() {
            Some(location)
        } else {
            debug!("No failure location found in {} bytes of log", log.len());
            None
        }
    }

    /// First frame whose path is not dependency code
    ///
    /// Frames are in deepest-first order, so this is the frame closest to the
    /// failure that the user owns.
    pub fn select_root_cause<'a>(&self, frames: &'a [StackFrame]) -> Option<&'a StackFrame> {
        frames
            .iter()
            .find(|frame| !self.context.is_dependency_path(&frame.path))
    }
}

/// First failure header in the log
pub fn parse_header(log: &str) -> Option<FailureHeader> {
    let caps = header_re().captures(log)?;
    Some(FailureHeader {
        spec_file: caps["spec"].to_string(),
        line: caps["line"].parse().ok()?,
        column: caps["col"].parse().ok()?,
    })
}

/// Every stack frame in the log, in the order printed
pub fn parse_frames(log: &str) -> Vec<StackFrame> {
    frame_re()
        .captures_iter(log)
        .filter_map(|caps| {
            let (label, path, line, col) = match caps.name("path") {
                Some(path) => (
                    caps.name("label")
                        .map(|l| l.as_str().trim())
                        .filter(|l| !l.is_empty())
                        .map(str::to_string),
                    path.as_str(),
                    &caps["line"],
                    &caps["col"],
                ),
                None => (None, &caps["bare"], &caps["bare_line"], &caps["bare_col"]),
            };

            Some(StackFrame {
                label,
                path: path.trim().to_string(),
                line: line.parse().ok()?,
                column: col.parse().ok()?,
            })
        })
        .collect()
}

/// First frame located inside the spec file
pub fn select_test_step<'a>(frames: &'a [StackFrame], spec_file: &str) -> Option<&'a StackFrame> {
    frames
        .iter()
        .find(|frame| path_ends_with(&frame.path, spec_file))
}

fn parse_location_hint(log: &str) -> Option<(String, u32)> {
    let caps = location_hint_re().captures(log)?;
    Some((caps["path"].trim().to_string(), caps["line"].parse().ok()?))
}

fn parse_file_hint(log: &str) -> Option<String> {
    file_hint_re()
        .captures(log)
        .map(|caps| caps["path"].to_string())
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Component-wise suffix match that ignores separator style and a leading `./`
fn path_ends_with(path: &str, suffix: &str) -> bool {
    let path = path.replace('\\', "/");
    let suffix = suffix.replace('\\', "/");
    let suffix = suffix.trim_start_matches("./");
    if suffix.is_empty() {
        return false;
    }
    path == suffix || path.ends_with(&format!("/{}", suffix))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
