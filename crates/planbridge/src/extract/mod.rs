//! Plan extraction from Markdown documents.
//!
//! Work item extraction is a pluggable strategy: every strategy implements
//! [`TextToWorkItems`] and produces the same target-agnostic [`WorkItem`]
//! model, so exporters never depend on how the text was scanned. Phase
//! extraction and the no-phases fallback live in [`phases`].

pub mod commonmark;
pub mod heuristic;
pub mod markers;
pub mod phases;

pub use commonmark::CommonMarkExtractor;
pub use heuristic::HeuristicExtractor;
pub use phases::{extract_phases, NoPhasesFoundPolicy, PlanError};

use crate::domain::{Document, DocumentPlan, Plan, WorkItem};
use chrono::{NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Strategy that turns loosely structured Markdown into work items.
///
/// Implementations must be pure: extracting the same text twice yields the
/// same sequence, and extraction never fails (it degrades to an empty list).
///
/// # Example
///
/// ```
/// use planbridge::extract::{HeuristicExtractor, TextToWorkItems};
///
/// let extractor = HeuristicExtractor;
/// assert_eq!(extractor.id(), "heuristic");
/// assert!(extractor.extract("No lists here.").is_empty());
/// ```
pub trait TextToWorkItems {
    /// Strategy identifier (e.g., "heuristic", "commonmark")
    fn id(&self) -> &str;

    /// Extract work items from document text
    fn extract(&self, text: &str) -> Vec<WorkItem>;
}

/// Built-in extraction strategies selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    Heuristic,
    CommonMark,
}

impl StrategyKind {
    /// Instantiate the strategy
    pub fn build(&self) -> Box<dyn TextToWorkItems> {
        match self {
            StrategyKind::Heuristic => Box::new(HeuristicExtractor),
            StrategyKind::CommonMark => Box::new(CommonMarkExtractor),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heuristic" | "regex" => Ok(StrategyKind::Heuristic),
            "commonmark" | "markdown" => Ok(StrategyKind::CommonMark),
            other => Err(format!(
                "Invalid extraction strategy '{}'. Expected heuristic or commonmark",
                other
            )),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Heuristic => write!(f, "heuristic"),
            StrategyKind::CommonMark => write!(f, "commonmark"),
        }
    }
}

/// Builds a [`Plan`] from documents using a strategy and a no-phases policy.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use planbridge::domain::Document;
/// use planbridge::extract::Planner;
///
/// let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let planner = Planner::new().with_today(today);
/// let plan = planner.plan(&[Document::new("prd.md", "- Write the PRD")]).unwrap();
///
/// assert_eq!(plan.item_count(), 1);
/// assert!(plan.synthesized_phases);
/// assert_eq!(plan.phases.len(), 2);
/// ```
pub struct Planner {
    extractor: Box<dyn TextToWorkItems>,
    policy: NoPhasesFoundPolicy,
    today: Option<NaiveDate>,
}

impl Planner {
    /// Planner with the heuristic strategy and the default policy
    pub fn new() -> Self {
        Self {
            extractor: Box::new(HeuristicExtractor),
            policy: NoPhasesFoundPolicy::default(),
            today: None,
        }
    }

    /// Replace the extraction strategy
    pub fn with_extractor(mut self, extractor: Box<dyn TextToWorkItems>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the no-phases policy
    pub fn with_policy(mut self, policy: NoPhasesFoundPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pin the date synthesized phases start from (defaults to today, UTC)
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn strategy_id(&self) -> &str {
        self.extractor.id()
    }

    /// Run extraction over every document and apply the no-phases policy.
    pub fn plan(&self, documents: &[Document]) -> Result<Plan, PlanError> {
        let per_document: Vec<DocumentPlan> = documents
            .iter()
            .map(|doc| {
                let items = self.extractor.extract(&doc.content);
                let phases = extract_phases(&doc.content);
                debug!(
                    document = %doc.name,
                    items = items.len(),
                    phases = phases.len(),
                    strategy = self.extractor.id(),
                    "Extracted document"
                );
                DocumentPlan {
                    document: doc.name.clone(),
                    items,
                    phases,
                }
            })
            .collect();

        let found: Vec<_> = per_document
            .iter()
            .flat_map(|doc| doc.phases.iter().cloned())
            .collect();
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let (phases, synthesized_phases) = self.policy.apply(found, documents.len(), today)?;

        Ok(Plan {
            documents: per_document,
            phases,
            synthesized_phases,
        })
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_plan_collects_phases_across_documents() {
        let docs = vec![
            Document::new("a.md", "## Sprint 1\n- Task one\n"),
            Document::new("b.md", "## Sprint 2\n- Task two\n## Sprint 2\n"),
        ];
        let plan = Planner::new().with_today(today()).plan(&docs).unwrap();

        assert!(!plan.synthesized_phases);
        let names: Vec<_> = plan.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Sprint 1", "Sprint 2", "Sprint 2"]);
        assert_eq!(plan.documents[1].inferred_phase().unwrap().name, "Sprint 2");
    }

    #[test]
    fn test_plan_with_fail_policy() {
        let docs = vec![Document::new("a.md", "- Task one\n")];
        let result = Planner::new()
            .with_policy(NoPhasesFoundPolicy::Fail)
            .plan(&docs);
        assert_eq!(result, Err(PlanError::NoPhasesFound { documents: 1 }));
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!("commonmark".parse::<StrategyKind>(), Ok(StrategyKind::CommonMark));
        assert_eq!("heuristic".parse::<StrategyKind>(), Ok(StrategyKind::Heuristic));
        assert!("grammar".parse::<StrategyKind>().is_err());

        let planner = Planner::new().with_extractor(StrategyKind::CommonMark.build());
        assert_eq!(planner.strategy_id(), "commonmark");
    }

    #[test]
    fn test_empty_document_list() {
        let plan = Planner::new().with_today(today()).plan(&[]).unwrap();
        assert_eq!(plan.item_count(), 0);
        assert_eq!(plan.phases.len(), 2);
    }
}
