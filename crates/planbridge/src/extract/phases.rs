//! Release phase extraction and the no-phases fallback policy.
//!
//! Phase headers are Markdown headings (or whole-line bold text) that start
//! with `phase`, `sprint`, `cycle` or `milestone`. The text following a header
//! is searched for up to two ISO dates and a one-line description.

use crate::domain::Phase;
use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Maximum number of characters after a header searched for dates and a description.
pub const CONTEXT_CHARS: usize = 500;

/// Names given to synthesized phases, in order.
const DEFAULT_PHASE_NAMES: [(&str, &str); 4] = [
    ("Foundation", "Project setup and core infrastructure"),
    ("Core Features", "Primary feature development"),
    ("Polish", "Hardening, performance and UX polish"),
    ("Launch", "Release preparation and rollout"),
];

static PHASE_HEADER_REGEX: OnceLock<Regex> = OnceLock::new();
static DATE_REGEX: OnceLock<Regex> = OnceLock::new();

fn phase_header_regex() -> &'static Regex {
    PHASE_HEADER_REGEX.get_or_init(|| {
        Regex::new(
            r"(?i)^ {0,3}(?:#{1,6}[ \t]+|\*\*)[ \t]*((?:phase|sprint|cycle|milestone)\b[:\s-]*\S.*?)[ \t]*(?:\*\*)?[ \t]*$",
        )
        .expect("Phase header regex should compile")
    })
}

fn date_regex() -> &'static Regex {
    DATE_REGEX.get_or_init(|| {
        Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("Date regex should compile")
    })
}

/// Errors raised while assembling phases for an export run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("No phase, sprint, cycle or milestone headers found in {documents} document(s)")]
    NoPhasesFound { documents: usize },

    #[error("Unknown no-phases policy: '{0}' (expected synthesize, empty or fail)")]
    UnknownPolicy(String),
}

/// What to do when no document contains a phase header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum NoPhasesFoundPolicy {
    /// Substitute `count` consecutive phases of `span_days` days starting today.
    SynthesizeDefaults { count: usize, span_days: i64 },
    /// Export without any phases.
    Empty,
    /// Abort planning with [`PlanError::NoPhasesFound`].
    Fail,
}

impl Default for NoPhasesFoundPolicy {
    fn default() -> Self {
        NoPhasesFoundPolicy::SynthesizeDefaults {
            count: 2,
            span_days: 14,
        }
    }
}

impl FromStr for NoPhasesFoundPolicy {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "synthesize" | "default" | "defaults" => Ok(Self::default()),
            "empty" | "none" => Ok(Self::Empty),
            "fail" => Ok(Self::Fail),
            other => Err(PlanError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for NoPhasesFoundPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SynthesizeDefaults { count, span_days } => {
                write!(f, "synthesize ({} x {} days)", count, span_days)
            }
            Self::Empty => write!(f, "empty"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl NoPhasesFoundPolicy {
    /// Apply the policy to the phases gathered across all documents.
    ///
    /// Returns the phases to use and whether they were synthesized.
    pub fn apply(
        &self,
        phases: Vec<Phase>,
        documents: usize,
        today: NaiveDate,
    ) -> Result<(Vec<Phase>, bool), PlanError> {
        if !phases.is_empty() {
            return Ok((phases, false));
        }

        match *self {
            Self::SynthesizeDefaults { count, span_days } => {
                Ok((default_phases(count, span_days, today), true))
            }
            Self::Empty => Ok((Vec::new(), false)),
            Self::Fail => Err(PlanError::NoPhasesFound { documents }),
        }
    }
}

/// Build `count` back-to-back phases of `span_days` days starting at `today`.
///
/// Phases that would end past the last representable date are dropped.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use planbridge::extract::phases::default_phases;
///
/// let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// let phases = default_phases(2, 14, today);
/// assert_eq!(phases[0].name, "Foundation");
/// assert_eq!(phases[1].start_date, NaiveDate::from_ymd_opt(2024, 3, 15));
/// ```
pub fn default_phases(count: usize, span_days: i64, today: NaiveDate) -> Vec<Phase> {
    let Some(span) = Duration::try_days(span_days.max(1)) else {
        return Vec::new();
    };
    (0..count)
        .map_while(|index| {
            let offset = span.checked_mul(i32::try_from(index).ok()?)?;
            let start = today.checked_add_signed(offset)?;
            let end = start.checked_add_signed(span)?;
            let (name, description) = DEFAULT_PHASE_NAMES
                .get(index)
                .map(|(n, d)| (n.to_string(), Some(d.to_string())))
                .unwrap_or_else(|| (format!("Phase {}", index + 1), None));
            Some(Phase {
                name,
                start_date: Some(start),
                end_date: Some(end),
                description,
            })
        })
        .collect()
}

/// Extract phases from one document in header order.
///
/// Identically named headers each produce their own phase.
pub fn extract_phases(text: &str) -> Vec<Phase> {
    let mut headers: Vec<(String, usize, usize)> = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if let Some(caps) = phase_header_regex().captures(content) {
            let name = caps[1].trim_end_matches(':').trim().to_string();
            headers.push((name, offset, offset + line.len()));
        }
        offset += line.len();
    }

    headers
        .iter()
        .enumerate()
        .map(|(index, (name, _, body_start))| {
            let bound = headers
                .get(index + 1)
                .map(|(_, next_start, _)| *next_start)
                .unwrap_or(text.len());
            let context = context_window(text, *body_start, bound);
            let mut dates = date_regex()
                .captures_iter(context)
                .filter_map(|caps| NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok());

            Phase {
                name: name.clone(),
                start_date: dates.next(),
                end_date: dates.next(),
                description: first_description_line(context),
            }
        })
        .collect()
}

/// Text after a header, capped at [`CONTEXT_CHARS`] characters and `bound`.
fn context_window(text: &str, start: usize, bound: usize) -> &str {
    let rest = &text[start..bound];
    let end = rest
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    &rest[..end]
}

fn first_description_line(context: &str) -> Option<String> {
    context
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}
