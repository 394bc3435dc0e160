//! What the CLI prints: human summaries, JSON envelopes and exit codes.
//!
//! Human text goes to stdout, warnings to stderr. With `--json` the only thing
//! on stdout is one envelope per command, so bots can parse it directly.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt::Write as _;
use std::io::{self, Write};

use crate::domain::{Plan, WorkItem};
use crate::export::{ExportResult, ExportStage};
use crate::tracker::CreatedEntity;

/// Bumped whenever the envelope or `data` shapes change incompatibly.
pub const FORMAT_VERSION: &str = "0.1.0";

/// How much the CLI prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Human,
    /// Human output without warnings
    Quiet,
    /// Envelopes only
    Json,
}

/// Writes command output according to the selected [`Mode`].
#[derive(Debug, Clone, Copy)]
pub struct Console {
    mode: Mode,
}

impl Console {
    /// `--json` wins over `--quiet`
    pub fn new(quiet: bool, json: bool) -> Self {
        let mode = match (json, quiet) {
            (true, _) => Mode::Json,
            (false, true) => Mode::Quiet,
            (false, false) => Mode::Human,
        };
        Self { mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_json(&self) -> bool {
        self.mode == Mode::Json
    }

    /// Human-readable result text; skipped in JSON mode
    pub fn text(&self, text: &str) -> io::Result<()> {
        if self.is_json() {
            return Ok(());
        }
        emit(&mut io::stdout(), text)
    }

    /// Warning on stderr; only in [`Mode::Human`]
    pub fn warn(&self, text: &str) -> io::Result<()> {
        if self.mode != Mode::Human {
            return Ok(());
        }
        emit(&mut io::stderr(), &format!("Warning: {}", text))
    }

    /// Serialize an envelope to stdout; only in JSON mode
    pub fn envelope<T: Serialize>(&self, envelope: &T) -> io::Result<()> {
        if !self.is_json() {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(envelope).map_err(io::Error::other)?;
        emit(&mut io::stdout(), &json)
    }
}

/// A closed pipe (`planbridge parse | head`) ends the process quietly.
fn emit(out: &mut impl Write, text: &str) -> io::Result<()> {
    match writeln!(out, "{}", text) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => std::process::exit(0),
        other => other,
    }
}

/// Envelope metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub command: String,
}

impl Metadata {
    fn now(command: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            version: FORMAT_VERSION,
            command: command.to_string(),
        }
    }
}

/// `{"success", "data", "metadata"}` envelope around a command result.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub metadata: Metadata,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T, command: &str) -> Self {
        Self::new(true, data, command)
    }

    /// Export results can be delivered and still count as failed.
    pub fn new(success: bool, data: T, command: &str) -> Self {
        Self {
            success,
            data,
            metadata: Metadata::now(command),
        }
    }
}

/// Machine-readable category of a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ConfigError,
    MissingToken,
    DocumentNotFound,
    PlanFailed,
    VerificationFailed,
    IoError,
}

impl ErrorKind {
    pub fn exit_code(self) -> ExitCode {
        match self {
            ErrorKind::ConfigError | ErrorKind::MissingToken => ExitCode::InvalidArgument,
            ErrorKind::DocumentNotFound => ExitCode::NotFound,
            ErrorKind::PlanFailed => ExitCode::ValidationFailed,
            ErrorKind::VerificationFailed => ExitCode::ExternalError,
            ErrorKind::IoError => ExitCode::GenericError,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorKind,
    pub message: String,
    /// Remediation text for misconfiguration
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

/// `{"success": false, "error", "metadata"}` envelope.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
    pub metadata: Metadata,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorKind, message: impl Into<String>, command: &str) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code,
                message: message.into(),
                suggestions: Vec::new(),
            },
            metadata: Metadata::now(command),
        }
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.error.suggestions.push(suggestion.into());
        self
    }
}

/// Process exit codes.
///
/// ```rust
/// use planbridge::ExitCode;
///
/// assert_eq!(ExitCode::Success.code(), 0);
/// assert_eq!(ExitCode::ExternalError.code(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    /// Unexpected failures and exports that finished with errors
    GenericError,
    /// Bad flags, config values or missing credentials
    InvalidArgument,
    /// An input document or config file does not exist
    NotFound,
    /// Plan rejected by the `fail` no-phases policy
    ValidationFailed,
    PermissionDenied,
    /// Tracker unreachable or credentials rejected
    ExternalError,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::GenericError => 1,
            ExitCode::InvalidArgument => 2,
            ExitCode::NotFound => 3,
            ExitCode::ValidationFailed => 4,
            ExitCode::PermissionDenied => 5,
            ExitCode::ExternalError => 10,
        }
    }

    /// Exit code for a finished export run
    pub fn for_export(result: &ExportResult) -> Self {
        match result.stage {
            _ if result.is_success() => ExitCode::Success,
            ExportStage::Idle => ExitCode::ValidationFailed,
            ExportStage::Verifying => ExitCode::ExternalError,
            _ => ExitCode::GenericError,
        }
    }
}

/// Root of `planbridge schema`: the shapes emitted under `data`.
#[derive(Debug, Serialize, JsonSchema)]
pub struct OutputSchema {
    pub plan: Plan,
    pub export: ExportResult,
}

fn write_item(out: &mut String, item: &WorkItem, indent: &str) {
    let mut line = format!("{}- {}", indent, item.title);
    if item.completed {
        line.push_str(" (done)");
    }
    let mut tags: Vec<String> = Vec::new();
    if item.priority != crate::domain::Priority::None {
        tags.push(item.priority.as_str().to_string());
    }
    if let Some(estimate) = &item.estimate {
        let unit = if estimate.unit.is_time() { "h" } else { "pt" };
        tags.push(format!("{}{}", estimate.value(), unit));
    }
    tags.extend(item.labels.iter().cloned());
    if !tags.is_empty() {
        line.push_str(&format!(" [{}]", tags.join(", ")));
    }
    let _ = writeln!(out, "{}", line);
}

/// Render an extracted plan as an indented outline.
pub fn format_plan(plan: &Plan) -> String {
    let mut out = String::new();
    for doc in &plan.documents {
        let _ = writeln!(out, "{} ({} items)", doc.document, doc.items.len());
        for item in &doc.items {
            write_item(&mut out, item, "  ");
            for child in &item.children {
                write_item(&mut out, child, "    ");
            }
        }
    }

    let origin = if plan.synthesized_phases { " (synthesized)" } else { "" };
    let _ = writeln!(out, "\nPhases{}:", origin);
    if plan.phases.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for phase in &plan.phases {
        match (phase.start_date, phase.end_date) {
            (Some(start), Some(end)) => {
                let _ = writeln!(out, "  - {} ({} to {})", phase.name, start, end);
            }
            (Some(start), None) => {
                let _ = writeln!(out, "  - {} (from {})", phase.name, start);
            }
            _ => {
                let _ = writeln!(out, "  - {}", phase.name);
            }
        }
    }
    out
}

fn write_entities(out: &mut String, heading: &str, entities: &[CreatedEntity]) {
    if entities.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}:", heading);
    for entity in entities {
        let reused = if entity.reused { " (existing)" } else { "" };
        let _ = write!(out, "  {} {}{}", entity.display_key(), entity.name, reused);
        if let Some(url) = &entity.url {
            let _ = write!(out, " <{}>", url);
        }
        out.push('\n');
    }
}

/// Render an export result: created entities, then errors.
pub fn format_export(result: &ExportResult) -> String {
    let mut out = String::new();
    let mode = if result.dry_run { "Preview" } else { "Export" };
    let _ = writeln!(out, "{} to {} ({})", mode, result.tracker, result.stage);

    let noun = result.tracker.label_noun();
    write_entities(&mut out, &format!("{}s", capitalize(noun)), &result.labels);
    write_entities(
        &mut out,
        &format!("{}s", capitalize(result.tracker.container_noun())),
        &result.containers,
    );
    if let Some(top) = &result.top_level {
        write_entities(
            &mut out,
            &capitalize(result.tracker.top_level_noun()),
            std::slice::from_ref(top),
        );
    }
    write_entities(&mut out, "Items", &result.items);
    write_entities(&mut out, "Sub-tasks", &result.sub_tasks);

    let summary = result.summary();
    let _ = writeln!(
        out,
        "\n{} item(s), {} sub-task(s), {} error(s)",
        summary.items, summary.sub_tasks, summary.errors
    );
    for error in &result.errors {
        let _ = writeln!(out, "  ✗ {}", error);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
