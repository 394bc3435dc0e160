//! planbridge library
//!
//! Extracts work items and release phases from Markdown planning documents
//! and materializes them in GitHub Issues, Linear or Jira. The binary is a
//! thin CLI over [`export`]; the library can be embedded by bots and
//! document generators that already hold the Markdown in memory.

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod export;
pub mod extract;
pub mod output;
pub mod tracker;

// Re-export commonly used types
pub use domain::{Document, Phase, Plan, Priority, WorkItem};
pub use export::{preview, ExportOptions, ExportResult, ExportStage, Exporter};
pub use extract::{NoPhasesFoundPolicy, Planner, StrategyKind, TextToWorkItems};
pub use output::{Envelope, ErrorEnvelope, ExitCode};
pub use tracker::{IssueTracker, TrackerError, TrackerKind};
