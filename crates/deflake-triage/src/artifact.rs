//! Artifact resolution - pick the single best failure artifact
//!
//! Playwright scatters evidence across `test-results/`: an `error-context.md`
//! per failing test, HTML snapshots, and `trace.zip` archives. Rich text is
//! cheapest to parse and most informative, so it always wins; within a kind
//! the newest file wins. Traces are never parsed, so a winning trace is
//! swapped for the aggregate HTML report, or failing that for the best text
//! artifact it outranked. Only a tree with nothing but traces is unsupported.

use deflake_core::config::ArtifactSettings;
use deflake_core::{ArtifactCandidate, ArtifactKind, DeflakeError, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// File-name used by the aggregate report; never treated as a per-test snapshot
const AGGREGATE_INDEX: &str = "index.html";

/// Where to look, relative to the working directory
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub results_dir: PathBuf,
    pub aggregate_report: PathBuf,
    pub fallback_reports: Vec<PathBuf>,
}

impl From<&ArtifactSettings> for ResolverConfig {
    fn from(settings: &ArtifactSettings) -> Self {
        Self {
            results_dir: settings.results_dir.clone(),
            aggregate_report: settings.aggregate_report.clone(),
            fallback_reports: settings.fallback_reports.clone(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::from(&ArtifactSettings::default())
    }
}

/// Classify a file by name and extension
pub fn classify(path: &Path) -> Option<ArtifactKind> {
    let file_name = path.file_name()?.to_str()?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())?;

    match ext.as_str() {
        "md" => Some(ArtifactKind::RichContext),
        "html" if !file_name.eq_ignore_ascii_case(AGGREGATE_INDEX) => {
            Some(ArtifactKind::HtmlSnapshot)
        }
        "zip" => Some(ArtifactKind::BinaryTrace),
        _ => None,
    }
}

/// Scans a working directory for the best failure artifact
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    working_dir: PathBuf,
    config: ResolverConfig,
}

impl ArtifactResolver {
    pub fn new(working_dir: impl Into<PathBuf>, config: ResolverConfig) -> Self {
        Self {
            working_dir: working_dir.into(),
            config,
        }
    }

    /// All classified files under the results directory, best first
    ///
    /// A missing or empty results directory yields an empty list.
    pub fn scan(&self) -> Vec<ArtifactCandidate> {
        let root = self.working_dir.join(&self.config.results_dir);
        if !root.is_dir() {
            debug!("Results directory {} does not exist", root.display());
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for entry in WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(kind) = classify(entry.path()) else {
                continue;
            };

            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            candidates.push(ArtifactCandidate::new(entry.into_path(), kind, modified));
        }

        candidates.sort();
        debug!(
            "Found {} artifact candidate(s) under {}",
            candidates.len(),
            root.display()
        );
        candidates
    }

    /// Resolve the single best artifact
    ///
    /// Returns `Ok(None)` when nothing usable exists anywhere, and
    /// `UnsupportedArtifact` when only a binary trace is available.
    #[instrument(skip(self), fields(dir = %self.working_dir.display()))]
    pub fn resolve(&self) -> Result<Option<ArtifactCandidate>> {
        let candidates = self.scan();
        match candidates.first() {
            Some(best) if best.kind.is_text() => {
                info!("Resolved {} artifact: {}", best.kind, best.path.display());
                Ok(Some(best.clone()))
            }
            Some(trace) => {
                warn!(
                    "Best artifact is a binary trace ({}); looking for a text artifact",
                    trace.path.display()
                );
                if let Some(report) = self.conventional_report() {
                    info!("Using aggregate report instead: {}", report.path.display());
                    return Ok(Some(report));
                }
                match candidates.iter().find(|c| c.kind.is_text()) {
                    Some(text) => {
                        info!("Using older {} artifact: {}", text.kind, text.path.display());
                        Ok(Some(text.clone()))
                    }
                    None => Err(DeflakeError::UnsupportedArtifact {
                        path: trace.path.clone(),
                    }),
                }
            }
            None => {
                let report = self.conventional_report();
                match &report {
                    Some(r) => info!("Using conventional report: {}", r.path.display()),
                    None => debug!("No artifact found in results tree or conventional paths"),
                }
                Ok(report)
            }
        }
    }

    /// Validate an artifact path supplied explicitly by the user
    pub fn explicit(&self, path: &Path) -> Result<ArtifactCandidate> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        };

        if !path.is_file() {
            return Err(DeflakeError::ArtifactNotFound(path));
        }

        let kind = classify(&path).unwrap_or(ArtifactKind::HtmlSnapshot);
        if !kind.is_text() {
            return Err(DeflakeError::UnsupportedArtifact { path });
        }

        Ok(candidate_at(path, kind))
    }

    /// First existing conventional report: the aggregate report, then the fallbacks in order
    fn conventional_report(&self) -> Option<ArtifactCandidate> {
        std::iter::once(&self.config.aggregate_report)
            .chain(self.config.fallback_reports.iter())
            .map(|rel| self.working_dir.join(rel))
            .find(|path| path.is_file() && classify(path) != Some(ArtifactKind::BinaryTrace))
            .map(|path| {
                let kind = classify(&path).unwrap_or(ArtifactKind::HtmlSnapshot);
                candidate_at(path, kind)
            })
    }
}

fn candidate_at(path: PathBuf, kind: ArtifactKind) -> ArtifactCandidate {
    let modified = std::fs::metadata(&path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    ArtifactCandidate::new(path, kind, modified)
}
