//! Core domain types for plan extraction.
//!
//! This module defines the target-agnostic model that every extraction
//! strategy produces and every tracker adapter consumes: documents, work
//! items, release phases, and their priorities and estimates.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A named Markdown document handed over by the document generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Document {
    /// Display name (usually the file name, e.g. "prd.md")
    pub name: String,
    /// Raw Markdown content
    pub content: String,
}

impl Document {
    /// Create a document from a name and its Markdown content
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Target-agnostic priority tier derived from free-text markers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// `[p0]`, `[urgent]`, `[critical]`, `🔴`
    Highest,
    /// `[p1]`, `[high]`, `🟠`
    High,
    /// `[p2]`, `[medium]`, `🟡`
    Medium,
    /// `[p3]`, `[low]`, `🟢`
    Low,
    /// `[p4]`, `[lowest]`, `⚪`
    Lowest,
    /// No recognized marker
    #[default]
    None,
}

impl Priority {
    /// Lowercase name used in human output
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Highest => "highest",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Lowest => "lowest",
            Priority::None => "none",
        }
    }
}

/// Unit attached to an estimate marker such as `[3pt]` or `[2d]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EstimateUnit {
    Points,
    Hours,
    Days,
    Weeks,
}

impl EstimateUnit {
    /// Multiplier applied to reach the normalized value.
    ///
    /// Time units normalize to hours (8h days, 40h weeks); points stay points.
    pub fn factor(&self) -> f64 {
        match self {
            EstimateUnit::Points | EstimateUnit::Hours => 1.0,
            EstimateUnit::Days => 8.0,
            EstimateUnit::Weeks => 40.0,
        }
    }

    /// True for hour/day/week units
    pub fn is_time(&self) -> bool {
        !matches!(self, EstimateUnit::Points)
    }
}

/// An estimate as written in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Estimate {
    /// Amount as written (e.g. `2` for `[2d]`)
    pub amount: f64,
    /// Unit as written
    pub unit: EstimateUnit,
}

impl Estimate {
    pub fn new(amount: f64, unit: EstimateUnit) -> Self {
        Self { amount, unit }
    }

    /// Normalized value: story points for point estimates, hours otherwise.
    pub fn value(&self) -> f64 {
        self.amount * self.unit.factor()
    }
}

/// One parsed unit of work.
///
/// Children are limited to a single nesting level; deeper indentation in the
/// source is flattened onto the most recent top-level item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct WorkItem {
    /// Cleaned title with all recognized markers removed
    pub title: String,
    /// Free text gathered from non-list lines following the item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Derived priority tier
    #[serde(default)]
    pub priority: Priority,
    /// Optional estimate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<Estimate>,
    /// Labels from the fixed category vocabulary
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Whether the bullet carried a checked `[x]` box
    #[serde(default)]
    pub completed: bool,
    /// Sub-tasks (one level deep)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<WorkItem>,
}

impl WorkItem {
    /// Create a work item with only a title set
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Number of items including children
    pub fn total_count(&self) -> usize {
        1 + self.children.len()
    }
}

/// A release window such as a milestone, sprint, cycle or version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Phase {
    /// Header text naming the phase (e.g. "Phase 1: Foundation")
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Phase {
    /// Create an undated phase
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_date: None,
            end_date: None,
            description: None,
        }
    }

    /// Builder-style date range setter
    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }
}

/// Extraction output for a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentPlan {
    /// Source document name
    pub document: String,
    /// Work items in document order
    pub items: Vec<WorkItem>,
    /// Phases found in this document, in match order
    pub phases: Vec<Phase>,
}

impl DocumentPlan {
    /// Phase used to place this document's items into a container.
    ///
    /// This is the first phase header found in the document, if any.
    pub fn inferred_phase(&self) -> Option<&Phase> {
        self.phases.first()
    }
}

/// Extraction output across all documents of one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// Per-document extraction
    pub documents: Vec<DocumentPlan>,
    /// Phases to materialize as containers (after the no-phases policy)
    pub phases: Vec<Phase>,
    /// True when `phases` was synthesized by the fallback policy
    #[serde(default)]
    pub synthesized_phases: bool,
}

impl Plan {
    /// Iterate all top-level work items across documents
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.documents.iter().flat_map(|doc| doc.items.iter())
    }

    /// Total number of work items including children
    pub fn item_count(&self) -> usize {
        self.items().map(WorkItem::total_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_normalization() {
        assert_eq!(Estimate::new(3.0, EstimateUnit::Points).value(), 3.0);
        assert_eq!(Estimate::new(5.0, EstimateUnit::Hours).value(), 5.0);
        assert_eq!(Estimate::new(2.0, EstimateUnit::Days).value(), 16.0);
        assert_eq!(Estimate::new(1.5, EstimateUnit::Weeks).value(), 60.0);
    }

    #[test]
    fn test_priority_default_is_none() {
        assert_eq!(Priority::default(), Priority::None);
        assert_eq!(WorkItem::new("Task").priority, Priority::None);
    }

    #[test]
    fn test_inferred_phase_is_first_phase() {
        let plan = DocumentPlan {
            document: "roadmap.md".to_string(),
            items: vec![],
            phases: vec![Phase::new("Phase 1: MVP"), Phase::new("Phase 2: Scale")],
        };
        assert_eq!(plan.inferred_phase().unwrap().name, "Phase 1: MVP");
    }

    #[test]
    fn test_item_count_includes_children() {
        let mut parent = WorkItem::new("Parent task");
        parent.children.push(WorkItem::new("Child task"));
        let plan = Plan {
            documents: vec![DocumentPlan {
                document: "a.md".to_string(),
                items: vec![parent, WorkItem::new("Other task")],
                phases: vec![],
            }],
            phases: vec![],
            synthesized_phases: false,
        };
        assert_eq!(plan.item_count(), 3);
    }
}
