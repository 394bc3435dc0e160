//! Inline marker recognition and normalization.
//!
//! Bullet text carries loosely formatted markers: bracketed priorities
//! (`[P0]`, `[high]`), estimates (`[3pt]`, `[2d]`), category labels (`[bug]`)
//! and emoji priority glyphs (`🔴`). This module recognizes them, maps them
//! onto the target-agnostic [`Priority`], [`Estimate`] and label vocabulary,
//! and strips them from titles.

use crate::domain::{Estimate, EstimateUnit, Priority};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Category labels recognized in bracket markers.
///
/// Anything outside this list is left in the title as plain text.
pub const LABEL_VOCABULARY: [&str; 9] = [
    "feature",
    "bug",
    "tech-debt",
    "research",
    "design",
    "devops",
    "security",
    "testing",
    "documentation",
];

/// Emoji glyphs treated as priority markers, highest tier first.
const PRIORITY_GLYPHS: [(char, Priority); 6] = [
    ('🔴', Priority::Highest),
    ('🟠', Priority::High),
    ('🟡', Priority::Medium),
    ('🟢', Priority::Low),
    ('🔵', Priority::Lowest),
    ('⚪', Priority::Lowest),
];

static PRIORITY_REGEX: OnceLock<Regex> = OnceLock::new();
static ESTIMATE_REGEX: OnceLock<Regex> = OnceLock::new();
static BRACKET_WORD_REGEX: OnceLock<Regex> = OnceLock::new();

fn priority_regex() -> &'static Regex {
    PRIORITY_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\[\s*(p[0-4]|urgent|critical|highest|high|medium|normal|lowest|low|trivial)\s*\]")
            .expect("Priority regex should compile")
    })
}

fn estimate_regex() -> &'static Regex {
    ESTIMATE_REGEX.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*(\d+(?:\.\d+)?)\s*(points|point|pts|pt|sp|hours|hour|hrs|hr|h|days|day|d|weeks|week|wks|wk|w)\s*\]",
        )
        .expect("Estimate regex should compile")
    })
}

fn bracket_word_regex() -> &'static Regex {
    BRACKET_WORD_REGEX.get_or_init(|| {
        Regex::new(r"\[\s*([A-Za-z][A-Za-z-]*)\s*\]").expect("Bracket word regex should compile")
    })
}

/// Markers captured from one bullet line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Markers {
    pub priority: Priority,
    pub estimate: Option<Estimate>,
    pub labels: BTreeSet<String>,
}

/// Map a priority marker word to its tier.
///
/// Matching is case-insensitive and tolerant of surrounding brackets and
/// whitespace. Unrecognized text yields [`Priority::None`].
///
/// # Examples
///
/// ```
/// use planbridge::domain::Priority;
/// use planbridge::extract::markers::parse_priority;
///
/// assert_eq!(parse_priority("P0"), Priority::Highest);
/// assert_eq!(parse_priority("[urgent]"), Priority::Highest);
/// assert_eq!(parse_priority("high"), Priority::High);
/// assert_eq!(parse_priority("someday"), Priority::None);
/// ```
pub fn parse_priority(marker: &str) -> Priority {
    let word = marker
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .to_lowercase();

    match word.as_str() {
        "p0" | "urgent" | "critical" | "highest" => Priority::Highest,
        "p1" | "high" => Priority::High,
        "p2" | "medium" | "normal" => Priority::Medium,
        "p3" | "low" => Priority::Low,
        "p4" | "lowest" | "trivial" => Priority::Lowest,
        _ => {
            let mut chars = word.chars();
            match (chars.next(), chars.next()) {
                (Some(glyph), None) => glyph_priority(glyph).unwrap_or(Priority::None),
                _ => Priority::None,
            }
        }
    }
}

fn glyph_priority(glyph: char) -> Option<Priority> {
    PRIORITY_GLYPHS
        .iter()
        .find(|(g, _)| *g == glyph)
        .map(|(_, p)| *p)
}

/// Map an estimate unit suffix to its unit.
pub fn parse_estimate_unit(unit: &str) -> Option<EstimateUnit> {
    match unit.trim().to_lowercase().as_str() {
        "pt" | "pts" | "point" | "points" | "sp" => Some(EstimateUnit::Points),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(EstimateUnit::Hours),
        "d" | "day" | "days" => Some(EstimateUnit::Days),
        "w" | "wk" | "wks" | "week" | "weeks" => Some(EstimateUnit::Weeks),
        _ => None,
    }
}

/// Return the canonical vocabulary label for `word`, if it is one.
///
/// # Examples
///
/// ```
/// use planbridge::extract::markers::normalize_label;
///
/// assert_eq!(normalize_label("Bug"), Some("bug"));
/// assert_eq!(normalize_label("TECH-DEBT"), Some("tech-debt"));
/// assert_eq!(normalize_label("backend"), None);
/// ```
pub fn normalize_label(word: &str) -> Option<&'static str> {
    let lowered = word.trim().to_lowercase();
    LABEL_VOCABULARY
        .iter()
        .copied()
        .find(|label| *label == lowered)
}

/// Extract priority, estimate and labels from raw bullet text.
///
/// Extraction is non-destructive; use [`clean_title`] to strip the markers.
/// The first priority marker wins; bracketed markers take precedence over
/// emoji glyphs.
pub fn extract_markers(raw: &str) -> Markers {
    let priority = priority_regex()
        .captures(raw)
        .map(|caps| parse_priority(&caps[1]))
        .or_else(|| raw.chars().find_map(glyph_priority))
        .unwrap_or_default();

    let estimate = estimate_regex().captures(raw).and_then(|caps| {
        let amount: f64 = caps[1].parse().ok()?;
        let unit = parse_estimate_unit(&caps[2])?;
        Some(Estimate::new(amount, unit))
    });

    let labels = bracket_word_regex()
        .captures_iter(raw)
        .filter_map(|caps| normalize_label(&caps[1]))
        .map(str::to_string)
        .collect();

    Markers {
        priority,
        estimate,
        labels,
    }
}

/// Strip every recognized marker and priority glyph, then collapse whitespace.
///
/// # Examples
///
/// ```
/// use planbridge::extract::markers::clean_title;
///
/// assert_eq!(clean_title("[P0] Fix login bug [3pt] [bug]"), "Fix login bug");
/// assert_eq!(clean_title("🔴 Ship it [someday]"), "Ship it [someday]");
/// ```
pub fn clean_title(raw: &str) -> String {
    let without_priority = priority_regex().replace_all(raw, " ");
    let without_estimate = estimate_regex().replace_all(&without_priority, " ");
    let without_labels = bracket_word_regex().replace_all(&without_estimate, |caps: &regex::Captures| {
        if normalize_label(&caps[1]).is_some() {
            " ".to_string()
        } else {
            caps[0].to_string()
        }
    });

    without_labels
        .chars()
        .filter(|c| glyph_priority(*c).is_none())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
