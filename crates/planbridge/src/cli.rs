//! Command-line interface definitions using clap.

use crate::extract::{NoPhasesFoundPolicy, StrategyKind};
use crate::tracker::TrackerKind;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Turn Markdown plans into GitHub, Linear or Jira issues
///
/// Extracts work items (bullets with `[P0]`, `[3pt]`, `[bug]` style markers)
/// and release phases (`## Sprint 1` style headers) from Markdown documents,
/// then creates the matching labels, milestones/cycles/versions, epics,
/// stories and sub-tasks in the chosen tracker.
///
/// Exit Codes:
///   0  - Command succeeded
///   1  - Generic error or partially failed export
///   2  - Invalid arguments or configuration
///   3  - Input document not found
///   4  - Plan rejected by the no-phases policy
///   5  - Permission denied
///  10  - Tracker unreachable or credentials rejected
#[derive(Parser)]
#[command(name = "planbridge", version)]
#[command(about = "Turn Markdown plans into tracker issues", long_about = None)]
pub struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output (for scripting)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log progress to stderr (overridden by PLANBRIDGE_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: ./planbridge.toml or $PLANBRIDGE_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract work items and phases without contacting any tracker
    Parse {
        /// Markdown documents to read
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Show what an export would create, using placeholder ids
    Preview(ExportArgs),

    /// Create the plan in the target tracker
    Export {
        #[command(flatten)]
        args: ExportArgs,

        /// Run the full mapping without network calls (same as preview)
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the JSON schema of parse/export output
    Schema,
}

/// Options shared by every command that extracts a plan.
#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    /// Extraction strategy: heuristic or commonmark
    #[arg(long)]
    pub strategy: Option<StrategyKind>,

    /// When no phases are found: synthesize, empty or fail
    #[arg(long, value_name = "POLICY")]
    pub phase_policy: Option<NoPhasesFoundPolicy>,

    /// Start date for synthesized phases (YYYY-MM-DD, default: today)
    #[arg(long, value_name = "DATE")]
    pub today: Option<NaiveDate>,
}

/// Options for preview and export.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Target tracker: github, linear or jira
    #[arg(short, long)]
    pub target: TrackerKind,

    /// Markdown documents to read
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Create an epic (GitHub/Jira) or project (Linear) with this name
    #[arg(long, value_name = "NAME")]
    pub top_level: Option<String>,

    /// Do not create milestones/cycles/sprints/versions
    #[arg(long)]
    pub no_containers: bool,

    /// Do not create missing labels/components up front
    #[arg(long)]
    pub no_label_sync: bool,

    /// Do not attach labels to created issues
    #[arg(long)]
    pub no_labels: bool,

    #[command(flatten)]
    pub plan: PlanArgs,
}
