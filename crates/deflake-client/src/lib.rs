//! # deflake-client
//!
//! Transport to the remote fix-suggestion service ("the brain").
//!
//! The brain is opaque: DeFlake sends one [`HealRequest`] per failing run and
//! receives one [`HealResponse`]. Transports implement [`ReportClient`] so the
//! triage flow can be driven by the HTTP client in production and by
//! [`MockReportClient`] offline and in tests.
//!
//! ## Contract
//!
//! - Exactly one attempt per failing run; no retries
//! - Content travels in memory; nothing is staged on disk
//! - A missing API key fails before any network activity

mod auth;
mod client;
mod mock;
mod types;

pub use auth::{resolve_settings, ClientSettings};
pub use client::{HttpReportClient, ReportClient};
pub use mock::MockReportClient;
pub use types::*;
