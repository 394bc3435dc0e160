//! Linear adapter (GraphQL).
//!
//! Labels map to team issue labels, containers to cycles, the top-level
//! entity to a project. Stories join the project at creation; sub-tasks are
//! attached afterwards with `issueUpdate(parentId)`.

use super::transport::{ApiRequest, Transport};
use super::{
    decode, graphql_data, label_style, CreatedEntity, EntityKind, IssueTracker, ItemDraft,
    ItemRole, TrackerError, TrackerKind, TrackerPriority,
};
use crate::domain::Phase;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://api.linear.app/graphql";

const VERIFY_QUERY: &str = "query Verify($key: String!) { viewer { id name } teams(filter: { key: { eq: $key } }) { nodes { id key name } } }";
const LABELS_QUERY: &str =
    "query TeamLabels($teamId: String!) { team(id: $teamId) { labels(first: 250) { nodes { id name } } } }";
const LABEL_CREATE: &str = "mutation LabelCreate($input: IssueLabelCreateInput!) { issueLabelCreate(input: $input) { success issueLabel { id name } } }";
const CYCLE_CREATE: &str = "mutation CycleCreate($input: CycleCreateInput!) { cycleCreate(input: $input) { success cycle { id number name } } }";
const PROJECT_CREATE: &str = "mutation ProjectCreate($input: ProjectCreateInput!) { projectCreate(input: $input) { success project { id name url } } }";
const ISSUE_CREATE: &str = "mutation IssueCreate($input: IssueCreateInput!) { issueCreate(input: $input) { success issue { id identifier title url } } }";
const ISSUE_UPDATE: &str = "mutation IssueUpdate($id: String!, $input: IssueUpdateInput!) { issueUpdate(id: $id, input: $input) { success } }";

/// Connection settings for one Linear team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearSettings {
    /// Team key, e.g. `ENG`
    pub team_key: String,
    pub api_url: String,
    /// Personal API key (sent verbatim in `Authorization`)
    pub api_key: String,
}

impl LinearSettings {
    pub fn new(team_key: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            team_key: team_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Node {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Nodes {
    nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct IssueNode {
    id: String,
    identifier: String,
    title: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectNode {
    id: String,
    name: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CycleNode {
    id: String,
    #[serde(default)]
    number: Option<u64>,
}

/// Linear tracker.
pub struct LinearTracker {
    settings: LinearSettings,
    transport: Box<dyn Transport>,
    team_id: Option<String>,
    /// Lowercased label name to label id
    labels: Option<HashMap<String, String>>,
}

impl LinearTracker {
    pub fn new(settings: LinearSettings, transport: Box<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            team_id: None,
            labels: None,
        }
    }

    fn execute(&self, query: &str, variables: Value) -> Result<Value, TrackerError> {
        let request = ApiRequest::post(
            self.settings.api_url.clone(),
            json!({ "query": query, "variables": variables }),
        )
        .header("Authorization", self.settings.api_key.clone());
        graphql_data(self.transport.send(&request)?)
    }

    /// Run a mutation and return its payload, failing when `success` is false.
    fn mutate(&self, query: &str, variables: Value, field: &str) -> Result<Value, TrackerError> {
        let mut data = self.execute(query, variables)?;
        let payload = data
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| TrackerError::UnexpectedResponse(format!("missing '{}' payload", field)))?;
        if payload.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(TrackerError::GraphQl(format!("{} was not successful", field)));
        }
        Ok(payload)
    }

    fn team_id(&self) -> Result<&str, TrackerError> {
        self.team_id.as_deref().ok_or_else(|| {
            TrackerError::NotConfigured("Linear team not resolved; run verification first".to_string())
        })
    }

    fn load_labels(&mut self) -> Result<&mut HashMap<String, String>, TrackerError> {
        if self.labels.is_none() {
            let team_id = self.team_id()?.to_string();
            let mut data = self.execute(LABELS_QUERY, json!({ "teamId": team_id }))?;
            let nodes: Nodes = decode(data["team"]["labels"].take(), "team labels")?;
            debug!(count = nodes.nodes.len(), "Loaded existing Linear labels");
            self.labels = Some(
                nodes
                    .nodes
                    .into_iter()
                    .filter_map(|n| n.name.map(|name| (name.to_lowercase(), n.id)))
                    .collect(),
            );
        }
        Ok(self.labels.get_or_insert_with(HashMap::new))
    }

    fn label_ids(&mut self, names: &[String]) -> Result<Vec<String>, TrackerError> {
        let known = self.load_labels()?;
        Ok(names
            .iter()
            .filter_map(|name| known.get(&name.to_lowercase()).cloned())
            .collect())
    }
}

fn timestamp(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

impl IssueTracker for LinearTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Linear
    }

    fn verify(&mut self) -> Result<(), TrackerError> {
        let mut data = self.execute(VERIFY_QUERY, json!({ "key": self.settings.team_key }))?;
        let teams: Nodes = decode(data["teams"].take(), "team list")?;
        let team = teams.nodes.into_iter().next().ok_or_else(|| {
            TrackerError::NotConfigured(format!("Linear team '{}' not found", self.settings.team_key))
        })?;

        info!(
            viewer = data["viewer"]["name"].as_str().unwrap_or("unknown"),
            team = %self.settings.team_key,
            "Connected to Linear"
        );
        self.team_id = Some(team.id);
        Ok(())
    }

    fn ensure_label(&mut self, name: &str) -> Result<CreatedEntity, TrackerError> {
        if let Some(id) = self.load_labels()?.get(&name.to_lowercase()) {
            return Ok(CreatedEntity::new(id.clone(), name, EntityKind::Label).reused());
        }

        let (color, description) = label_style(name);
        let payload = self.mutate(
            LABEL_CREATE,
            json!({ "input": {
                "name": name,
                "color": format!("#{}", color),
                "description": description,
                "teamId": self.team_id()?,
            }}),
            "issueLabelCreate",
        )?;
        let label: Node = decode(payload["issueLabel"].clone(), "issue label")?;
        self.load_labels()?.insert(name.to_lowercase(), label.id.clone());
        Ok(CreatedEntity::new(label.id, label.name.unwrap_or_else(|| name.to_string()), EntityKind::Label))
    }

    fn create_container(&mut self, phase: &Phase) -> Result<CreatedEntity, TrackerError> {
        let (Some(start), Some(end)) = (phase.start_date, phase.end_date) else {
            return Err(TrackerError::Unsupported(format!(
                "Linear cycles need start and end dates; phase '{}' has none",
                phase.name
            )));
        };

        let mut input = json!({
            "teamId": self.team_id()?,
            "name": phase.name,
            "startsAt": timestamp(start),
            "endsAt": timestamp(end),
        });
        if let Some(description) = &phase.description {
            input["description"] = json!(description);
        }

        let payload = self.mutate(CYCLE_CREATE, json!({ "input": input }), "cycleCreate")?;
        let cycle: CycleNode = decode(payload["cycle"].clone(), "cycle")?;
        let entity = CreatedEntity::new(cycle.id, phase.name.clone(), EntityKind::Container);
        Ok(match cycle.number {
            Some(number) => entity.with_key(format!("Cycle {}", number)),
            None => entity,
        })
    }

    fn create_top_level(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> Result<CreatedEntity, TrackerError> {
        let payload = self.mutate(
            PROJECT_CREATE,
            json!({ "input": {
                "name": name,
                "description": description.unwrap_or_default(),
                "teamIds": [self.team_id()?],
            }}),
            "projectCreate",
        )?;
        let project: ProjectNode = decode(payload["project"].clone(), "project")?;
        let entity = CreatedEntity::new(project.id, project.name, EntityKind::TopLevel);
        Ok(match project.url {
            Some(url) => entity.with_url(url),
            None => entity,
        })
    }

    fn create_item(&mut self, draft: &ItemDraft) -> Result<CreatedEntity, TrackerError> {
        let mut input = json!({
            "teamId": self.team_id()?,
            "title": draft.title,
            "description": draft.body(),
        });
        if let TrackerPriority::Level(level) = draft.priority {
            input["priority"] = json!(level);
        }
        if let Some(estimate) = &draft.estimate {
            input["estimate"] = json!(estimate.value().round() as i64);
        }
        if !draft.labels.is_empty() {
            input["labelIds"] = json!(self.label_ids(&draft.labels)?);
        }
        if let Some(container) = &draft.container {
            input["cycleId"] = json!(container.id);
        }
        if let Some(parent) = draft.parent.as_ref().filter(|p| p.kind == EntityKind::TopLevel) {
            input["projectId"] = json!(parent.id);
        }

        let payload = self.mutate(ISSUE_CREATE, json!({ "input": input }), "issueCreate")?;
        let issue: IssueNode = decode(payload["issue"].clone(), "issue")?;
        let kind = match draft.role {
            ItemRole::Story => EntityKind::Item,
            ItemRole::SubTask => EntityKind::SubTask,
        };
        let entity = CreatedEntity::new(issue.id, issue.title, kind).with_key(issue.identifier);
        Ok(match issue.url {
            Some(url) => entity.with_url(url),
            None => entity,
        })
    }

    fn link_child(
        &mut self,
        parent: &CreatedEntity,
        child: &CreatedEntity,
    ) -> Result<(), TrackerError> {
        let input = match parent.kind {
            // Stories already carry projectId from creation.
            EntityKind::TopLevel => return Ok(()),
            _ => json!({ "parentId": parent.id }),
        };
        self.mutate(ISSUE_UPDATE, json!({ "id": child.id, "input": input }), "issueUpdate")?;
        Ok(())
    }
}
