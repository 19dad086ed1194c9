//! Failure triage for DeFlake
//!
//! Turns the debris of a failed browser-automation run into something a fix
//! service can act on:
//!
//! - [`location`]: parses raw log text into a [`FailureLocation`] (pure, no I/O)
//! - [`artifact`]: picks the single best failure artifact from the results tree
//! - [`evidence`]: reads and bounds the artifact and source into an [`EvidenceBundle`]
//!
//! [`FailureLocation`]: deflake_core::FailureLocation
//! [`EvidenceBundle`]: deflake_core::EvidenceBundle

pub mod artifact;
pub mod evidence;
pub mod location;

pub use artifact::{classify, ArtifactResolver, ResolverConfig};
pub use evidence::{build_bundle, read_artifact_text, read_source_snippet, truncate_chars};
pub use location::{ExtractionContext, FailureHeader, LocationExtractor, StackFrame};
