//! Evidence bundle assembly
//!
//! Reads the resolved artifact and the root-cause source file and bounds both
//! so the remote brain receives a predictable payload.

use deflake_core::config::EvidenceLimits;
use deflake_core::{ArtifactCandidate, DeflakeError, EvidenceBundle, FailureLocation, Result};
use tracing::{debug, warn};

/// Appended to any text cut short
pub const TRUNCATION_MARKER: &str = "...[TRUNCATED]";

/// Cut `text` to at most `max_chars` characters, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Read an artifact as text, bounded
///
/// Binary traces are refused before any bytes are read.
pub fn read_artifact_text(artifact: &ArtifactCandidate, max_chars: usize) -> Result<String> {
    if !artifact.kind.is_text() {
        return Err(DeflakeError::UnsupportedArtifact {
            path: artifact.path.clone(),
        });
    }

    let bytes = std::fs::read(&artifact.path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DeflakeError::ArtifactNotFound(artifact.path.clone()),
        _ => DeflakeError::Io(e),
    })?;
    let text = String::from_utf8_lossy(&bytes);
    debug!(
        "Read {} chars from {}",
        text.chars().count(),
        artifact.path.display()
    );
    Ok(truncate_chars(&text, max_chars))
}

/// Source of the root-cause file, bounded
///
/// Missing or unreadable source is not an error; the bundle simply omits it.
pub fn read_source_snippet(location: &FailureLocation, max_chars: usize) -> Option<String> {
    let path = location.root_cause_absolute_path.as_ref()?;
    match std::fs::read_to_string(path) {
        Ok(source) => Some(truncate_chars(&source, max_chars)),
        Err(e) => {
            warn!("Could not read source {}: {}", path.display(), e);
            None
        }
    }
}

/// Assemble the bundle for one failing run
pub fn build_bundle(
    error_log: String,
    artifact: Option<&ArtifactCandidate>,
    location: Option<FailureLocation>,
    limits: &EvidenceLimits,
) -> Result<EvidenceBundle> {
    let artifact_text = match artifact {
        Some(artifact) => read_artifact_text(artifact, limits.max_snapshot_chars)?,
        None => {
            warn!("No artifact available; sending the log without a snapshot");
            String::new()
        }
    };

    let source_code = location
        .as_ref()
        .and_then(|loc| read_source_snippet(loc, limits.max_source_chars));

    Ok(EvidenceBundle {
        error_log,
        artifact_text,
        artifact_path: artifact.map(|a| a.path.clone()),
        location,
        source_code,
    })
}
