//! Line-oriented heuristic work item extraction.
//!
//! Bullets (`-`, `*`, `+`, optionally with a `[ ]`/`[x]` checkbox) below the
//! nesting threshold open top-level items; bullets at or above it attach to
//! the most recently opened top-level item. Top-level numbered list lines are
//! scanned in a second pass and appended unless their title duplicates an
//! existing one.

use super::markers::{clean_title, extract_markers};
use super::TextToWorkItems;
use crate::domain::WorkItem;
use regex::Regex;
use std::sync::OnceLock;

/// Indentation (in columns) at which a bullet becomes a child.
pub const NESTING_THRESHOLD: usize = 4;

/// Titles must be longer than this many characters to be kept.
pub const MIN_TITLE_CHARS: usize = 3;

const TAB_WIDTH: usize = 4;

static BULLET_REGEX: OnceLock<Regex> = OnceLock::new();
static NUMBERED_REGEX: OnceLock<Regex> = OnceLock::new();
static HEADING_REGEX: OnceLock<Regex> = OnceLock::new();

fn bullet_regex() -> &'static Regex {
    BULLET_REGEX.get_or_init(|| {
        Regex::new(r"^([ \t]*)[-*+][ \t]+(?:\[([ xX])\][ \t]+)?(.+?)\s*$")
            .expect("Bullet regex should compile")
    })
}

fn numbered_regex() -> &'static Regex {
    NUMBERED_REGEX.get_or_init(|| {
        Regex::new(r"^([ \t]*)\d+[.)][ \t]+(?:\[([ xX])\][ \t]+)?(.+?)\s*$")
            .expect("Numbered regex should compile")
    })
}

fn heading_regex() -> &'static Regex {
    HEADING_REGEX
        .get_or_init(|| Regex::new(r"^ {0,3}#{1,6}(\s|$)").expect("Heading regex should compile"))
}

/// The default regex/line-pattern extraction strategy.
///
/// # Example
///
/// ```
/// use planbridge::domain::Priority;
/// use planbridge::extract::{HeuristicExtractor, TextToWorkItems};
///
/// let items = HeuristicExtractor.extract("- [P0] Fix login bug [3pt] [bug]\n    - Add unit test");
/// assert_eq!(items.len(), 1);
/// assert_eq!(items[0].title, "Fix login bug");
/// assert_eq!(items[0].priority, Priority::Highest);
/// assert_eq!(items[0].children[0].title, "Add unit test");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

/// Where free-text lines are currently being appended.
#[derive(Debug, Clone, Copy)]
enum DescriptionTarget {
    Item(usize),
    Child(usize, usize),
}

impl TextToWorkItems for HeuristicExtractor {
    fn id(&self) -> &str {
        "heuristic"
    }

    fn extract(&self, text: &str) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = Vec::new();
        let mut descriptions: Vec<(Vec<String>, Vec<Vec<String>>)> = Vec::new();
        let mut open_item: Option<usize> = None;
        let mut target: Option<DescriptionTarget> = None;

        for line in text.lines() {
            if let Some(caps) = bullet_regex().captures(line) {
                let indent = indentation_width(&caps[1]);
                let item = build_item(&caps[3], caps.get(2).map(|m| m.as_str()));

                if indent < NESTING_THRESHOLD {
                    if let Some(item) = item {
                        items.push(item);
                        descriptions.push((Vec::new(), Vec::new()));
                        open_item = Some(items.len() - 1);
                        target = open_item.map(DescriptionTarget::Item);
                    } else {
                        target = None;
                    }
                } else if let Some(parent) = open_item {
                    if let Some(child) = item {
                        items[parent].children.push(child);
                        descriptions[parent].1.push(Vec::new());
                        target = Some(DescriptionTarget::Child(
                            parent,
                            items[parent].children.len() - 1,
                        ));
                    } else {
                        target = None;
                    }
                }
                continue;
            }

            if heading_regex().is_match(line) || numbered_regex().is_match(line) {
                target = None;
                continue;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match target {
                Some(DescriptionTarget::Item(idx)) => descriptions[idx].0.push(trimmed.to_string()),
                Some(DescriptionTarget::Child(idx, child)) => {
                    descriptions[idx].1[child].push(trimmed.to_string())
                }
                None => {}
            }
        }

        for (item, (lines, child_lines)) in items.iter_mut().zip(descriptions) {
            item.description = join_description(lines);
            for (child, lines) in item.children.iter_mut().zip(child_lines) {
                child.description = join_description(lines);
            }
        }

        append_numbered_items(text, &mut items);
        items
    }
}

/// Second pass: top-level numbered list lines that do not duplicate a title.
fn append_numbered_items(text: &str, items: &mut Vec<WorkItem>) {
    for line in text.lines() {
        let Some(caps) = numbered_regex().captures(line) else {
            continue;
        };
        if indentation_width(&caps[1]) >= NESTING_THRESHOLD {
            continue;
        }
        let Some(item) = build_item(&caps[3], caps.get(2).map(|m| m.as_str())) else {
            continue;
        };
        let duplicate = items.iter().any(|existing| {
            existing.title == item.title
                || existing.children.iter().any(|child| child.title == item.title)
        });
        if !duplicate {
            items.push(item);
        }
    }
}

/// Build a work item from raw bullet text, or `None` when the cleaned title
/// is too short to keep.
pub(crate) fn build_item(raw: &str, checkbox: Option<&str>) -> Option<WorkItem> {
    let markers = extract_markers(raw);
    let title = clean_title(raw);
    if title.chars().count() <= MIN_TITLE_CHARS {
        return None;
    }

    Some(WorkItem {
        title,
        description: None,
        priority: markers.priority,
        estimate: markers.estimate,
        labels: markers.labels,
        completed: checkbox.is_some_and(|mark| mark.eq_ignore_ascii_case("x")),
        children: Vec::new(),
    })
}

fn indentation_width(leading: &str) -> usize {
    leading
        .chars()
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

fn join_description(lines: Vec<String>) -> Option<String> {
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
