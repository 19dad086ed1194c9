//! # deflake-core
//!
//! Core types for the DeFlake failure triage system.
//!
//! DeFlake wraps a browser-automation test command (or reads artifacts a
//! previous run left behind), finds the most useful failure evidence, and
//! forwards a bounded evidence bundle to a remote fix-suggestion service.
//!
//! ## Core Paradigm
//!
//! - Evidence is ranked, never guessed: rich text beats HTML beats binary traces
//! - Stack frames split into "test step" (inside the spec file) and "root cause"
//!   (first frame outside dependency code)
//! - Every extracted field is optional; unparseable logs yield absence, not errors
//! - Configuration is an explicit value handed to each component

pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::DeflakeConfig;
pub use error::{DeflakeError, Result};
pub use types::*;
