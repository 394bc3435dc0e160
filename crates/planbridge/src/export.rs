//! Export pipeline: plan extraction followed by tracker materialization.
//!
//! A run walks a fixed sequence of stages (see [`ExportStage`]). A failed
//! verification ends the run; after that every failure is recorded in
//! [`ExportResult::errors`] and the run moves on to the next entity.

use crate::domain::{Document, Phase, Plan, WorkItem};
use crate::extract::{NoPhasesFoundPolicy, Planner, StrategyKind};
use crate::tracker::{
    CreatedEntity, IssueTracker, ItemDraft, ItemRole, PreviewTracker, TrackerError, TrackerKind,
};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

/// Flags controlling what an export run creates.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Name of the epic/project grouping all items; none skips the stage
    pub top_level: Option<String>,
    /// Create milestones/cycles/sprints/versions from phases
    pub create_containers: bool,
    /// Ensure every used label (Jira: component) exists before creating items
    pub sync_labels: bool,
    /// Attach labels to created items
    pub attach_labels: bool,
    /// Use the preview tracker instead of the network
    pub dry_run: bool,
    pub phase_policy: NoPhasesFoundPolicy,
    pub strategy: StrategyKind,
    /// Fixed "today" for synthesized phases (defaults to the current date)
    pub today: Option<NaiveDate>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            top_level: None,
            create_containers: true,
            sync_labels: true,
            attach_labels: true,
            dry_run: false,
            phase_policy: NoPhasesFoundPolicy::default(),
            strategy: StrategyKind::default(),
            today: None,
        }
    }
}

impl ExportOptions {
    fn planner(&self) -> Planner {
        let planner = Planner::new()
            .with_extractor(self.strategy.build())
            .with_policy(self.phase_policy);
        match self.today {
            Some(today) => planner.with_today(today),
            None => planner,
        }
    }
}

/// Stage an export run reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Idle,
    Verifying,
    SyncingLabels,
    CreatingContainers,
    CreatingTopLevel,
    CreatingItems,
    CreatingChildren,
    Done,
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportStage::Idle => "idle",
            ExportStage::Verifying => "verifying",
            ExportStage::SyncingLabels => "syncing labels",
            ExportStage::CreatingContainers => "creating containers",
            ExportStage::CreatingTopLevel => "creating top-level",
            ExportStage::CreatingItems => "creating items",
            ExportStage::CreatingChildren => "creating children",
            ExportStage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Everything an export run created, plus the errors it recovered from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExportResult {
    pub tracker: TrackerKind,
    pub dry_run: bool,
    /// Last stage entered
    pub stage: ExportStage,
    /// Extracted plan (absent when planning itself failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    pub labels: Vec<CreatedEntity>,
    pub containers: Vec<CreatedEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_level: Option<CreatedEntity>,
    pub items: Vec<CreatedEntity>,
    pub sub_tasks: Vec<CreatedEntity>,
    pub errors: Vec<String>,
}

/// Entity counts of an [`ExportResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExportSummary {
    pub labels_created: usize,
    pub labels_reused: usize,
    pub containers: usize,
    pub top_level: usize,
    pub items: usize,
    pub sub_tasks: usize,
    pub errors: usize,
}

impl ExportResult {
    fn new(tracker: TrackerKind, dry_run: bool) -> Self {
        Self {
            tracker,
            dry_run,
            stage: ExportStage::Idle,
            plan: None,
            labels: Vec::new(),
            containers: Vec::new(),
            top_level: None,
            items: Vec::new(),
            sub_tasks: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn summary(&self) -> ExportSummary {
        let reused = self.labels.iter().filter(|l| l.reused).count();
        ExportSummary {
            labels_created: self.labels.len() - reused,
            labels_reused: reused,
            containers: self.containers.len(),
            top_level: usize::from(self.top_level.is_some()),
            items: self.items.len(),
            sub_tasks: self.sub_tasks.len(),
            errors: self.errors.len(),
        }
    }

    /// Reached `Done` without recording any error
    pub fn is_success(&self) -> bool {
        self.stage == ExportStage::Done && self.errors.is_empty()
    }

    fn enter(&mut self, stage: ExportStage) {
        info!(tracker = %self.tracker, stage = %stage, "Export stage");
        self.stage = stage;
    }

    fn record(&mut self, what: String, error: TrackerError) {
        warn!(tracker = %self.tracker, error = %error, "{}", what);
        self.errors.push(format!("{}: {}", what, error));
    }
}

/// Drives one tracker through export runs.
///
/// # Example
///
/// ```
/// use planbridge::domain::Document;
/// use planbridge::export::{ExportOptions, Exporter};
/// use planbridge::tracker::{PreviewTracker, TrackerKind};
///
/// let mut exporter = Exporter::new(PreviewTracker::new(TrackerKind::Github));
/// let result = exporter.export(
///     &[Document::new("prd.md", "- Ship the MVP")],
///     &ExportOptions::default(),
/// );
/// assert!(result.is_success());
/// assert_eq!(result.items[0].name, "Ship the MVP");
/// ```
pub struct Exporter<T: IssueTracker> {
    tracker: T,
}

impl<T: IssueTracker> Exporter<T> {
    pub fn new(tracker: T) -> Self {
        Self { tracker }
    }

    /// Run the full export. With `options.dry_run` set the run goes to a
    /// [`PreviewTracker`] speaking this tracker's vocabulary instead.
    pub fn export(&mut self, documents: &[Document], options: &ExportOptions) -> ExportResult {
        if options.dry_run && !self.tracker.is_dry_run() {
            return preview(self.tracker.kind(), documents, options);
        }
        run(&mut self.tracker, documents, options)
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn into_inner(self) -> T {
        self.tracker
    }
}

/// Dry run with fabricated `PREVIEW-<n>` ids; never touches the network.
pub fn preview(kind: TrackerKind, documents: &[Document], options: &ExportOptions) -> ExportResult {
    run(&mut PreviewTracker::new(kind), documents, options)
}

/// Run the export state machine against any tracker.
pub fn run<T: IssueTracker + ?Sized>(
    tracker: &mut T,
    documents: &[Document],
    options: &ExportOptions,
) -> ExportResult {
    let mut result = ExportResult::new(tracker.kind(), tracker.is_dry_run());

    let plan = match options.planner().plan(documents) {
        Ok(plan) => plan,
        Err(e) => {
            warn!(error = %e, "Planning failed");
            result.errors.push(e.to_string());
            return result;
        }
    };
    info!(
        documents = plan.documents.len(),
        items = plan.item_count(),
        phases = plan.phases.len(),
        synthesized = plan.synthesized_phases,
        "Plan extracted"
    );

    result.enter(ExportStage::Verifying);
    if let Err(e) = tracker.verify() {
        result.record(format!("{} verification failed", result.tracker), e);
        result.plan = Some(plan);
        return result;
    }

    result.enter(ExportStage::SyncingLabels);
    if options.sync_labels {
        for name in used_labels(&plan) {
            match tracker.ensure_label(&name) {
                Ok(label) => result.labels.push(label),
                Err(e) => {
                    let noun = result.tracker.label_noun();
                    result.record(format!("Failed to sync {} '{}'", noun, name), e)
                }
            }
        }
    }

    result.enter(ExportStage::CreatingContainers);
    if options.create_containers {
        for phase in &plan.phases {
            match tracker.create_container(phase) {
                Ok(container) => result.containers.push(container),
                Err(e) => {
                    let noun = result.tracker.container_noun();
                    result.record(format!("Failed to create {} '{}'", noun, phase.name), e)
                }
            }
        }
    }

    result.enter(ExportStage::CreatingTopLevel);
    if let Some(name) = &options.top_level {
        let description = format!(
            "Work items extracted from {} document(s) by planbridge.",
            plan.documents.len()
        );
        match tracker.create_top_level(name, Some(&description)) {
            Ok(entity) => result.top_level = Some(entity),
            Err(e) => {
                let noun = result.tracker.top_level_noun();
                result.record(format!("Failed to create {} '{}'", noun, name), e)
            }
        }
    }

    result.enter(ExportStage::CreatingItems);
    let mut parents: Vec<(CreatedEntity, &WorkItem, Option<CreatedEntity>, &str)> = Vec::new();
    for doc in &plan.documents {
        let container = doc
            .inferred_phase()
            .and_then(|phase| match_container(phase, &result.containers))
            .cloned();

        for item in &doc.items {
            let draft = draft_for(
                &*tracker,
                item,
                &doc.document,
                options,
                container.clone(),
                result.top_level.clone(),
                ItemRole::Story,
            );
            match tracker.create_item(&draft) {
                Ok(entity) => {
                    assign_container(tracker, &mut result, &entity, draft.container.as_ref());
                    if let Some(top) = result.top_level.clone() {
                        if let Err(e) = tracker.link_child(&top, &entity) {
                            result.record(
                                format!("Failed to link '{}' to '{}'", item.title, top.name),
                                e,
                            );
                        }
                    }
                    result.items.push(entity.clone());
                    parents.push((entity, item, container.clone(), &doc.document));
                }
                Err(e) => {
                    result.record(format!("Failed to create item '{}'", item.title), e);
                    if !item.children.is_empty() {
                        result.errors.push(format!(
                            "Skipped {} sub-task(s) of '{}': parent was not created",
                            item.children.len(),
                            item.title
                        ));
                    }
                }
            }
        }
    }

    result.enter(ExportStage::CreatingChildren);
    for (parent, item, container, source) in parents {
        for child in &item.children {
            let draft = draft_for(
                &*tracker,
                child,
                source,
                options,
                container.clone(),
                Some(parent.clone()),
                ItemRole::SubTask,
            );
            match tracker.create_item(&draft) {
                Ok(entity) => {
                    assign_container(tracker, &mut result, &entity, draft.container.as_ref());
                    if let Err(e) = tracker.link_child(&parent, &entity) {
                        result.record(
                            format!("Failed to link '{}' to '{}'", child.title, item.title),
                            e,
                        );
                    }
                    result.sub_tasks.push(entity);
                }
                Err(e) => result.record(format!("Failed to create sub-task '{}'", child.title), e),
            }
        }
    }

    result.enter(ExportStage::Done);
    result.plan = Some(plan);
    result
}

/// A failed move leaves the item in place and records an error.
fn assign_container<T: IssueTracker + ?Sized>(
    tracker: &mut T,
    result: &mut ExportResult,
    item: &CreatedEntity,
    container: Option<&CreatedEntity>,
) {
    let Some(container) = container else {
        return;
    };
    if let Err(e) = tracker.assign_container(item, container) {
        result.record(format!("Failed to add '{}' to '{}'", item.name, container.name), e);
    }
}

/// Every label used by any item or child, deduplicated and sorted.
fn used_labels(plan: &Plan) -> BTreeSet<String> {
    plan.items()
        .flat_map(|item| std::iter::once(item).chain(item.children.iter()))
        .flat_map(|item| item.labels.iter().cloned())
        .collect()
}

/// First container whose name contains the phase name, ignoring case.
pub fn match_container<'a>(phase: &Phase, containers: &'a [CreatedEntity]) -> Option<&'a CreatedEntity> {
    let needle = phase.name.to_lowercase();
    containers
        .iter()
        .find(|c| c.name.to_lowercase().contains(&needle))
}

fn draft_for<T: IssueTracker + ?Sized>(
    tracker: &T,
    item: &WorkItem,
    source: &str,
    options: &ExportOptions,
    container: Option<CreatedEntity>,
    parent: Option<CreatedEntity>,
    role: ItemRole,
) -> ItemDraft {
    let kind = tracker.kind();
    ItemDraft {
        title: item.title.clone(),
        description: item.description.clone(),
        source: source.to_string(),
        priority: tracker.normalize_priority(item.priority),
        estimate: item.estimate.filter(|_| kind.accepts_numeric_estimate()),
        labels: if options.attach_labels {
            item.labels.iter().cloned().collect()
        } else {
            Vec::new()
        },
        container,
        parent,
        role,
    }
}
