//! Issue tracker adapters.
//!
//! This module defines the [`IssueTracker`] capability trait that the
//! exporter drives, along with the per-target vocabulary mapping. Concrete
//! adapters exist for GitHub Issues, Linear and Jira, plus a
//! [`PreviewTracker`] that fabricates placeholder entities for dry runs.
//!
//! All network access goes through the [`Transport`] seam so adapters can be
//! exercised against a [`ScriptedTransport`] in tests.

pub mod github;
pub mod jira;
pub mod linear;
pub mod preview;
pub mod transport;

pub use github::{GithubSettings, GithubTracker};
pub use jira::{JiraSettings, JiraTracker};
pub use linear::{LinearSettings, LinearTracker};
pub use preview::PreviewTracker;
pub use transport::{ApiRequest, HttpSettings, Method, ScriptedTransport, Transport, UreqTransport};

use crate::domain::{Estimate, Phase, Priority};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by tracker adapters and transports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP {status} from {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Supported external issue trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    Github,
    Linear,
    Jira,
}

/// A priority expressed in a tracker's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum TrackerPriority {
    /// Label applied to the issue (GitHub)
    Label(String),
    /// Numeric level (Linear: 0 none, 1 urgent .. 4 low)
    Level(u8),
    /// Named priority (Jira)
    Named(String),
    /// Leave the tracker's priority unset
    Unset,
}

impl TrackerKind {
    /// Map a priority tier onto this tracker's vocabulary.
    ///
    /// # Examples
    ///
    /// ```
    /// use planbridge::domain::Priority;
    /// use planbridge::tracker::{TrackerKind, TrackerPriority};
    ///
    /// assert_eq!(TrackerKind::Linear.priority_value(Priority::Highest), TrackerPriority::Level(1));
    /// assert_eq!(
    ///     TrackerKind::Jira.priority_value(Priority::None),
    ///     TrackerPriority::Named("Medium".to_string())
    /// );
    /// ```
    pub fn priority_value(&self, priority: Priority) -> TrackerPriority {
        match self {
            TrackerKind::Github => match priority {
                Priority::Highest => TrackerPriority::Label("priority: critical".to_string()),
                Priority::High => TrackerPriority::Label("priority: high".to_string()),
                Priority::Medium => TrackerPriority::Label("priority: medium".to_string()),
                Priority::Low => TrackerPriority::Label("priority: low".to_string()),
                Priority::Lowest => TrackerPriority::Label("priority: lowest".to_string()),
                Priority::None => TrackerPriority::Unset,
            },
            TrackerKind::Linear => TrackerPriority::Level(match priority {
                Priority::Highest => 1,
                Priority::High => 2,
                Priority::Medium => 3,
                Priority::Low | Priority::Lowest => 4,
                Priority::None => 0,
            }),
            TrackerKind::Jira => TrackerPriority::Named(
                match priority {
                    Priority::Highest => "Highest",
                    Priority::High => "High",
                    Priority::Medium | Priority::None => "Medium",
                    Priority::Low => "Low",
                    Priority::Lowest => "Lowest",
                }
                .to_string(),
            ),
        }
    }

    /// Whether the tracker has a numeric estimate field
    pub fn accepts_numeric_estimate(&self) -> bool {
        matches!(self, TrackerKind::Linear | TrackerKind::Jira)
    }

    /// What this tracker calls a time-boxed container
    pub fn container_noun(&self) -> &'static str {
        match self {
            TrackerKind::Github => "milestone",
            TrackerKind::Linear => "cycle",
            TrackerKind::Jira => "version",
        }
    }

    /// What this tracker calls the top-level grouping entity
    pub fn top_level_noun(&self) -> &'static str {
        match self {
            TrackerKind::Github | TrackerKind::Jira => "epic",
            TrackerKind::Linear => "project",
        }
    }

    /// What this tracker calls a label-like category
    pub fn label_noun(&self) -> &'static str {
        match self {
            TrackerKind::Github | TrackerKind::Linear => "label",
            TrackerKind::Jira => "component",
        }
    }
}

impl FromStr for TrackerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" | "gh" => Ok(TrackerKind::Github),
            "linear" => Ok(TrackerKind::Linear),
            "jira" => Ok(TrackerKind::Jira),
            other => Err(format!(
                "Invalid target '{}'. Expected github, linear or jira",
                other
            )),
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerKind::Github => write!(f, "GitHub"),
            TrackerKind::Linear => write!(f, "Linear"),
            TrackerKind::Jira => write!(f, "Jira"),
        }
    }
}

/// Kind of entity created in a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Label,
    Container,
    TopLevel,
    Item,
    SubTask,
}

/// An entity that exists (or would exist, in a preview) in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreatedEntity {
    /// Tracker-internal identifier used for follow-up API calls
    pub id: String,
    /// Human-facing key such as `#12`, `ENG-42` or `PROJ-7`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Display name (title, label name, milestone title)
    pub name: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// True when the entity already existed and was reused
    #[serde(default)]
    pub reused: bool,
}

impl CreatedEntity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            key: None,
            name: name.into(),
            kind,
            url: None,
            reused: false,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn reused(mut self) -> Self {
        self.reused = true;
        self
    }

    /// Key if present, otherwise the id
    pub fn display_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.id)
    }
}

/// Role of an issue being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    /// Top-level work item (story)
    Story,
    /// Child of another work item
    SubTask,
}

/// Everything an adapter needs to create one issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub title: String,
    pub description: Option<String>,
    /// Name of the document the item came from
    pub source: String,
    pub priority: TrackerPriority,
    /// Only set for trackers that accept a numeric estimate
    pub estimate: Option<Estimate>,
    pub labels: Vec<String>,
    pub container: Option<CreatedEntity>,
    pub parent: Option<CreatedEntity>,
    pub role: ItemRole,
}

impl ItemDraft {
    /// Issue body: the item description followed by a provenance footer.
    pub fn body(&self) -> String {
        let mut body = String::new();
        if let Some(description) = &self.description {
            body.push_str(description);
            body.push_str("\n\n");
        }
        body.push_str(&format!("_Generated from `{}` by planbridge._", self.source));
        body
    }
}

/// Capability interface implemented once per tracker.
///
/// The exporter calls these in a fixed order (verify, labels, containers,
/// top-level, items, children) and treats every error after verification as
/// non-fatal.
pub trait IssueTracker {
    /// Which tracker vocabulary this adapter speaks
    fn kind(&self) -> TrackerKind;

    /// True for adapters that never touch the network
    fn is_dry_run(&self) -> bool {
        false
    }

    /// Check connectivity and credentials, and resolve project/team ids.
    fn verify(&mut self) -> Result<(), TrackerError>;

    /// Make sure a label (or Jira component) exists, creating it if needed.
    fn ensure_label(&mut self, name: &str) -> Result<CreatedEntity, TrackerError>;

    /// Create a milestone, cycle, sprint or version for a phase.
    fn create_container(&mut self, phase: &Phase) -> Result<CreatedEntity, TrackerError>;

    /// Create the epic or project grouping all items.
    fn create_top_level(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> Result<CreatedEntity, TrackerError>;

    /// Create one issue.
    fn create_item(&mut self, draft: &ItemDraft) -> Result<CreatedEntity, TrackerError>;

    /// Move a created item into its container when the tracker cannot set
    /// it at creation time (Jira sprints).
    fn assign_container(
        &mut self,
        _item: &CreatedEntity,
        _container: &CreatedEntity,
    ) -> Result<(), TrackerError> {
        Ok(())
    }

    /// Attach an existing child to its parent.
    fn link_child(
        &mut self,
        parent: &CreatedEntity,
        child: &CreatedEntity,
    ) -> Result<(), TrackerError>;

    /// Map a priority tier onto this tracker's vocabulary
    fn normalize_priority(&self, priority: Priority) -> TrackerPriority {
        self.kind().priority_value(priority)
    }
}

impl<T: IssueTracker + ?Sized> IssueTracker for Box<T> {
    fn kind(&self) -> TrackerKind {
        (**self).kind()
    }

    fn is_dry_run(&self) -> bool {
        (**self).is_dry_run()
    }

    fn verify(&mut self) -> Result<(), TrackerError> {
        (**self).verify()
    }

    fn ensure_label(&mut self, name: &str) -> Result<CreatedEntity, TrackerError> {
        (**self).ensure_label(name)
    }

    fn create_container(&mut self, phase: &Phase) -> Result<CreatedEntity, TrackerError> {
        (**self).create_container(phase)
    }

    fn create_top_level(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> Result<CreatedEntity, TrackerError> {
        (**self).create_top_level(name, description)
    }

    fn create_item(&mut self, draft: &ItemDraft) -> Result<CreatedEntity, TrackerError> {
        (**self).create_item(draft)
    }

    fn assign_container(
        &mut self,
        item: &CreatedEntity,
        container: &CreatedEntity,
    ) -> Result<(), TrackerError> {
        (**self).assign_container(item, container)
    }

    fn link_child(
        &mut self,
        parent: &CreatedEntity,
        child: &CreatedEntity,
    ) -> Result<(), TrackerError> {
        (**self).link_child(parent, child)
    }

    fn normalize_priority(&self, priority: Priority) -> TrackerPriority {
        (**self).normalize_priority(priority)
    }
}

/// Label applied to GitHub epics.
pub const EPIC_LABEL: &str = "epic";

/// Color and description for each vocabulary label.
pub(crate) fn label_style(name: &str) -> (&'static str, &'static str) {
    match name {
        "feature" => ("a2eeef", "New feature or request"),
        "bug" => ("d73a4a", "Something isn't working"),
        "tech-debt" => ("fbca04", "Refactoring and cleanup"),
        "research" => ("c5def5", "Investigation or spike"),
        "design" => ("f9d0c4", "Design and UX work"),
        "devops" => ("0e8a16", "CI/CD and infrastructure"),
        "security" => ("b60205", "Security hardening"),
        "testing" => ("bfd4f2", "Test coverage"),
        "documentation" => ("0075ca", "Improvements or additions to documentation"),
        EPIC_LABEL => ("3e4b9e", "Groups related issues"),
        _ => ("ededed", ""),
    }
}

/// Extract the `data` member of a GraphQL response, turning `errors` into a
/// [`TrackerError`].
pub(crate) fn graphql_data(response: serde_json::Value) -> Result<serde_json::Value, TrackerError> {
    if let Some(errors) = response.get("errors").and_then(|e| e.as_array()) {
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .map(str::to_string)
                .collect();
            let joined = messages.join("; ");
            let lowered = joined.to_lowercase();
            if lowered.contains("authentication") || lowered.contains("unauthorized") {
                return Err(TrackerError::Auth(joined));
            }
            return Err(TrackerError::GraphQl(joined));
        }
    }

    response
        .get("data")
        .cloned()
        .filter(|data| !data.is_null())
        .ok_or_else(|| TrackerError::UnexpectedResponse("missing 'data' in GraphQL response".to_string()))
}

/// Deserialize a JSON value into a typed response.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, TrackerError> {
    serde_json::from_value(value)
        .map_err(|e| TrackerError::UnexpectedResponse(format!("{}: {}", what, e)))
}
