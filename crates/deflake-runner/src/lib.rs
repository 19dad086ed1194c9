//! Wrapper mode, triage flow and reporting for DeFlake
//!
//! - [`supervisor`]: runs the wrapped test command, mirrors and buffers its output
//! - [`flow`]: resolve → extract → bundle → remote call → report, once per failing run
//! - [`render`]: turns the brain's verdict into a terminal report or a JSON value
//! - [`history`]: fail-open record of suggested fixes for the dashboard
//! - [`patcher`]: optional in-place application of a structured fix

pub mod flow;
pub mod history;
pub mod patcher;
pub mod render;
pub mod supervisor;

pub use flow::{run_wrapped, standalone_input, TriageFlow, TriageInput, TriageOutcome, WrapOutcome};
pub use history::{HistoryEntry, HistoryLog};
pub use patcher::{replace_line, AppliedPatch};
pub use render::{build_report, parse_fix, render_text, Fix, FixTarget, Report, StructuredFix};
pub use supervisor::ProcessSupervisor;
