//! Jira Cloud adapter (REST v3 and Agile 1.0).
//!
//! Labels map to project components. Containers are fix versions, or sprints
//! on the configured board when `board_id` is set. The top-level entity is an
//! `Epic`; items are `Story` issues and children are `Sub-task` issues, which
//! Jira requires to name their parent at creation.

use super::transport::{ApiRequest, Transport};
use super::{
    decode, CreatedEntity, EntityKind, IssueTracker, ItemDraft, ItemRole, TrackerError,
    TrackerKind, TrackerPriority,
};
use crate::domain::Phase;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

pub const DEFAULT_STORY_POINTS_FIELD: &str = "customfield_10016";

/// Connection settings for one Jira project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraSettings {
    /// Site URL, e.g. `https://acme.atlassian.net`
    pub base_url: String,
    pub project_key: String,
    pub email: String,
    pub api_token: String,
    /// Scrum board to create sprints on; versions are used when unset
    pub board_id: Option<u64>,
    /// Custom field holding story points
    pub story_points_field: String,
}

impl JiraSettings {
    pub fn new(
        base_url: impl Into<String>,
        project_key: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            project_key: project_key.into(),
            email: email.into(),
            api_token: api_token.into(),
            board_id: None,
            story_points_field: DEFAULT_STORY_POINTS_FIELD.to_string(),
        }
    }

    pub fn with_board(mut self, board_id: u64) -> Self {
        self.board_id = Some(board_id);
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Myself {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(deserialize_with = "id_as_string")]
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    id: String,
    key: String,
}

/// Jira returns string ids for versions and components but numeric ids for
/// sprints.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

/// Render plain text as an Atlassian Document Format document, one
/// paragraph per blank-line separated block.
pub fn to_adf(text: &str) -> Value {
    let paragraphs: Vec<Value> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            json!({
                "type": "paragraph",
                "content": [{ "type": "text", "text": block }],
            })
        })
        .collect();
    json!({ "type": "doc", "version": 1, "content": paragraphs })
}

/// Jira duration string for a number of hours (`4h`, `90m`).
fn duration(hours: f64) -> String {
    let minutes = (hours * 60.0).round() as i64;
    if minutes % 60 == 0 {
        format!("{}h", minutes / 60)
    } else {
        format!("{}m", minutes)
    }
}

/// Jira Cloud tracker.
pub struct JiraTracker {
    settings: JiraSettings,
    transport: Box<dyn Transport>,
    project_id: Option<String>,
    /// Lowercased component name to component id
    components: Option<HashMap<String, String>>,
}

impl JiraTracker {
    pub fn new(settings: JiraSettings, transport: Box<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            project_id: None,
            components: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn send(&self, request: ApiRequest) -> Result<Value, TrackerError> {
        let credentials = STANDARD.encode(format!(
            "{}:{}",
            self.settings.email, self.settings.api_token
        ));
        let request = request
            .header("Authorization", format!("Basic {}", credentials))
            .header("Accept", "application/json");
        self.transport.send(&request)
    }

    fn project_id(&self) -> Result<&str, TrackerError> {
        self.project_id.as_deref().ok_or_else(|| {
            TrackerError::NotConfigured("Jira project not resolved; run verification first".to_string())
        })
    }

    fn load_components(&mut self) -> Result<&mut HashMap<String, String>, TrackerError> {
        if self.components.is_none() {
            let path = format!("/rest/api/3/project/{}/components", self.settings.project_key);
            let response = self.send(ApiRequest::get(self.url(&path)))?;
            let components: Vec<Named> = decode(response, "component list")?;
            debug!(count = components.len(), "Loaded existing Jira components");
            self.components = Some(
                components
                    .into_iter()
                    .map(|c| (c.name.to_lowercase(), c.id))
                    .collect(),
            );
        }
        Ok(self.components.get_or_insert_with(HashMap::new))
    }

    fn browse_url(&self, key: &str) -> String {
        self.url(&format!("/browse/{}", key))
    }

    fn create_issue(&self, fields: Value, kind: EntityKind, name: &str) -> Result<CreatedEntity, TrackerError> {
        let response = self.send(ApiRequest::post(
            self.url("/rest/api/3/issue"),
            json!({ "fields": fields }),
        ))?;
        let issue: CreatedIssue = decode(response, "issue")?;
        let url = self.browse_url(&issue.key);
        Ok(CreatedEntity::new(issue.id, name, kind)
            .with_key(issue.key)
            .with_url(url))
    }

    fn move_to_sprint(&self, sprint_id: &str, issue_key: &str) -> Result<(), TrackerError> {
        self.send(ApiRequest::post(
            self.url(&format!("/rest/agile/1.0/sprint/{}/issue", sprint_id)),
            json!({ "issues": [issue_key] }),
        ))?;
        Ok(())
    }
}

impl IssueTracker for JiraTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Jira
    }

    fn verify(&mut self) -> Result<(), TrackerError> {
        let me: Myself = decode(self.send(ApiRequest::get(self.url("/rest/api/3/myself")))?, "user")?;
        let path = format!("/rest/api/3/project/{}", self.settings.project_key);
        let project: Project = decode(self.send(ApiRequest::get(self.url(&path)))?, "project")?;

        info!(
            user = me.display_name.as_deref().unwrap_or("unknown"),
            project = %project.key,
            "Connected to Jira"
        );
        self.project_id = Some(project.id);
        Ok(())
    }

    fn ensure_label(&mut self, name: &str) -> Result<CreatedEntity, TrackerError> {
        if let Some(id) = self.load_components()?.get(&name.to_lowercase()) {
            return Ok(CreatedEntity::new(id.clone(), name, EntityKind::Label).reused());
        }

        let response = self.send(ApiRequest::post(
            self.url("/rest/api/3/component"),
            json!({
                "name": name,
                "description": format!("{} work", name),
                "project": self.settings.project_key,
            }),
        ))?;
        let component: Named = decode(response, "component")?;
        self.load_components()?
            .insert(component.name.to_lowercase(), component.id.clone());
        Ok(CreatedEntity::new(component.id, component.name, EntityKind::Label))
    }

    fn create_container(&mut self, phase: &Phase) -> Result<CreatedEntity, TrackerError> {
        let fmt_date = |d: chrono::NaiveDate| d.format("%Y-%m-%d").to_string();

        let request = match self.settings.board_id {
            Some(board_id) => {
                let mut body = json!({ "name": phase.name, "originBoardId": board_id });
                if let Some(start) = phase.start_date {
                    body["startDate"] = json!(format!("{}T00:00:00.000Z", fmt_date(start)));
                }
                if let Some(end) = phase.end_date {
                    body["endDate"] = json!(format!("{}T00:00:00.000Z", fmt_date(end)));
                }
                if let Some(goal) = &phase.description {
                    body["goal"] = json!(goal);
                }
                ApiRequest::post(self.url("/rest/agile/1.0/sprint"), body)
            }
            None => {
                let project_id = self.project_id()?;
                let project_id = project_id
                    .parse::<u64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| json!(project_id));
                let mut body = json!({ "name": phase.name, "projectId": project_id });
                if let Some(start) = phase.start_date {
                    body["startDate"] = json!(fmt_date(start));
                }
                if let Some(end) = phase.end_date {
                    body["releaseDate"] = json!(fmt_date(end));
                }
                if let Some(description) = &phase.description {
                    body["description"] = json!(description);
                }
                ApiRequest::post(self.url("/rest/api/3/version"), body)
            }
        };

        let container: Named = decode(self.send(request)?, "version or sprint")?;
        Ok(CreatedEntity::new(container.id, container.name, EntityKind::Container))
    }

    fn create_top_level(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> Result<CreatedEntity, TrackerError> {
        let mut fields = json!({
            "project": { "key": self.settings.project_key },
            "summary": name,
            "issuetype": { "name": "Epic" },
        });
        if let Some(description) = description {
            fields["description"] = to_adf(description);
        }
        self.create_issue(fields, EntityKind::TopLevel, name)
    }

    fn create_item(&mut self, draft: &ItemDraft) -> Result<CreatedEntity, TrackerError> {
        let (issue_type, kind) = match draft.role {
            ItemRole::Story => ("Story", EntityKind::Item),
            ItemRole::SubTask => ("Sub-task", EntityKind::SubTask),
        };

        let mut fields = json!({
            "project": { "key": self.settings.project_key },
            "summary": draft.title,
            "issuetype": { "name": issue_type },
            "description": to_adf(&draft.body()),
        });
        if let TrackerPriority::Named(name) = &draft.priority {
            fields["priority"] = json!({ "name": name });
        }
        if !draft.labels.is_empty() {
            let components: Vec<Value> = draft.labels.iter().map(|l| json!({ "name": l })).collect();
            fields["components"] = json!(components);
        }
        if let Some(estimate) = &draft.estimate {
            if estimate.unit.is_time() {
                fields["timetracking"] = json!({ "originalEstimate": duration(estimate.value()) });
            } else {
                fields[self.settings.story_points_field.as_str()] = json!(estimate.value());
            }
        }

        if draft.role == ItemRole::SubTask {
            let parent = draft.parent.as_ref().and_then(|p| p.key.as_deref()).ok_or_else(|| {
                TrackerError::Unsupported(format!("sub-task '{}' needs a parent issue", draft.title))
            })?;
            fields["parent"] = json!({ "key": parent });
        }

        // Sprints are assigned after creation.
        if let (Some(container), None) = (&draft.container, self.settings.board_id) {
            fields["fixVersions"] = json!([{ "id": container.id }]);
        }

        self.create_issue(fields, kind, &draft.title)
    }

    fn assign_container(
        &mut self,
        item: &CreatedEntity,
        container: &CreatedEntity,
    ) -> Result<(), TrackerError> {
        if self.settings.board_id.is_none() {
            return Ok(());
        }
        self.move_to_sprint(&container.id, item.display_key())
    }

    fn link_child(
        &mut self,
        parent: &CreatedEntity,
        child: &CreatedEntity,
    ) -> Result<(), TrackerError> {
        // Sub-tasks name their parent at creation.
        if child.kind == EntityKind::SubTask {
            return Ok(());
        }
        let parent_key = parent.display_key();
        self.send(ApiRequest::put(
            self.url(&format!("/rest/api/3/issue/{}", child.display_key())),
            json!({ "fields": { "parent": { "key": parent_key } } }),
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Estimate, EstimateUnit, Priority};
    use crate::tracker::transport::{Method, ScriptedTransport};
    use chrono::NaiveDate;

    const BASE: &str = "https://acme.atlassian.net";

    fn settings() -> JiraSettings {
        JiraSettings::new(BASE, "PROJ", "dev@acme.io", "secret")
    }

    fn scripted() -> ScriptedTransport {
        let transport = ScriptedTransport::new();
        transport.on(Method::Get, "/rest/api/3/myself", json!({"displayName": "Dev"}));
        transport.on(
            Method::Get,
            "/rest/api/3/project/PROJ",
            json!({"id": "10000", "key": "PROJ", "name": "Project"}),
        );
        transport.on(
            Method::Get,
            "/rest/api/3/project/PROJ/components",
            json!([{"id": "200", "name": "Security"}]),
        );
        transport
    }

    fn verified(transport: &ScriptedTransport, settings: JiraSettings) -> JiraTracker {
        let mut tracker = JiraTracker::new(settings, Box::new(transport.clone()));
        tracker.verify().unwrap();
        tracker
    }

    fn story(title: &str) -> ItemDraft {
        ItemDraft {
            title: title.to_string(),
            description: Some("Details".to_string()),
            source: "prd.md".to_string(),
            priority: TrackerKind::Jira.priority_value(Priority::None),
            estimate: None,
            labels: vec![],
            container: None,
            parent: None,
            role: ItemRole::Story,
        }
    }

    fn last_body(transport: &ScriptedTransport) -> Value {
        transport.requests().last().unwrap().body.clone().unwrap()
    }

    #[test]
    fn test_verify_uses_basic_auth() {
        let transport = scripted();
        let tracker = verified(&transport, settings());

        assert_eq!(tracker.project_id.as_deref(), Some("10000"));
        let expected = format!("Basic {}", STANDARD.encode("dev@acme.io:secret"));
        assert_eq!(
            transport.requests()[0].header_value("Authorization"),
            Some(expected.as_str())
        );
    }

    #[test]
    fn test_verify_auth_failure() {
        let transport = ScriptedTransport::new();
        transport.fail(
            Method::Get,
            "/myself",
            TrackerError::Auth("HTTP 401".to_string()),
        );
        let mut tracker = JiraTracker::new(settings(), Box::new(transport.clone()));
        assert!(matches!(tracker.verify(), Err(TrackerError::Auth(_))));
    }

    #[test]
    fn test_components_are_reused_case_insensitively() {
        let transport = scripted();
        transport.on(Method::Post, "/rest/api/3/component", json!({"id": "201", "name": "bug"}));
        let mut tracker = verified(&transport, settings());

        assert!(tracker.ensure_label("security").unwrap().reused);
        let bug = tracker.ensure_label("bug").unwrap();
        assert_eq!(bug.id, "201");
        assert_eq!(last_body(&transport)["project"], "PROJ");
        assert_eq!(transport.count(Method::Get, "/components"), 1);
    }

    #[test]
    fn test_version_container_without_board() {
        let transport = scripted();
        transport.on(Method::Post, "/rest/api/3/version", json!({"id": "300", "name": "Phase 1"}));
        let mut tracker = verified(&transport, settings());

        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        let version = tracker
            .create_container(&Phase::new("Phase 1").with_dates(start, end))
            .unwrap();

        assert_eq!(version.id, "300");
        let body = last_body(&transport);
        assert_eq!(body["projectId"], 10000);
        assert_eq!(body["releaseDate"], "2024-02-15");
    }

    #[test]
    fn test_sprint_container_with_board() {
        let transport = scripted();
        transport.on(Method::Post, "/rest/agile/1.0/sprint", json!({"id": 42, "name": "Sprint 1"}));
        let mut tracker = verified(&transport, settings().with_board(7));

        let sprint = tracker.create_container(&Phase::new("Sprint 1")).unwrap();
        assert_eq!(sprint.id, "42");
        assert_eq!(last_body(&transport)["originBoardId"], 7);
    }

    #[test]
    fn test_story_fields() {
        let transport = scripted();
        transport.on(Method::Post, "/rest/api/3/issue", json!({"id": "10001", "key": "PROJ-1"}));
        let mut tracker = verified(&transport, settings());

        let mut draft = story("Harden auth");
        draft.labels = vec!["security".to_string()];
        draft.estimate = Some(Estimate::new(5.0, EstimateUnit::Points));
        draft.container = Some(CreatedEntity::new("300", "Phase 1", EntityKind::Container));
        let issue = tracker.create_item(&draft).unwrap();

        assert_eq!(issue.display_key(), "PROJ-1");
        assert_eq!(issue.url.as_deref(), Some("https://acme.atlassian.net/browse/PROJ-1"));
        let fields = &last_body(&transport)["fields"];
        assert_eq!(fields["issuetype"]["name"], "Story");
        assert_eq!(fields["priority"]["name"], "Medium");
        assert_eq!(fields["components"], json!([{"name": "security"}]));
        assert_eq!(fields[DEFAULT_STORY_POINTS_FIELD], 5.0);
        assert_eq!(fields["fixVersions"], json!([{"id": "300"}]));
        assert_eq!(fields["description"]["type"], "doc");
    }

    #[test]
    fn test_time_estimate_uses_timetracking() {
        let transport = scripted();
        transport.on(Method::Post, "/rest/api/3/issue", json!({"id": "10002", "key": "PROJ-2"}));
        let mut tracker = verified(&transport, settings());

        let mut draft = story("Write docs");
        draft.estimate = Some(Estimate::new(2.0, EstimateUnit::Days));
        tracker.create_item(&draft).unwrap();

        let fields = &last_body(&transport)["fields"];
        assert_eq!(fields["timetracking"]["originalEstimate"], "16h");
        assert!(fields.get(DEFAULT_STORY_POINTS_FIELD).is_none());
    }

    #[test]
    fn test_story_is_moved_into_sprint() {
        let transport = scripted();
        transport.on(Method::Post, "/rest/api/3/issue", json!({"id": "10003", "key": "PROJ-3"}));
        transport.on(Method::Post, "/rest/agile/1.0/sprint/42/issue", Value::Null);
        let mut tracker = verified(&transport, settings().with_board(7));

        let mut draft = story("Ship it");
        let sprint = CreatedEntity::new("42", "Sprint 1", EntityKind::Container);
        draft.container = Some(sprint.clone());
        let issue = tracker.create_item(&draft).unwrap();
        assert!(last_body(&transport)["fields"].get("fixVersions").is_none());
        assert_eq!(transport.count(Method::Post, "/sprint/42/issue"), 0);

        tracker.assign_container(&issue, &sprint).unwrap();
        assert_eq!(last_body(&transport), json!({"issues": ["PROJ-3"]}));
    }

    #[test]
    fn test_versions_need_no_assignment() {
        let transport = scripted();
        let mut tracker = verified(&transport, settings());
        let issue = CreatedEntity::new("10003", "Ship it", EntityKind::Item).with_key("PROJ-3");
        let version = CreatedEntity::new("300", "Phase 1", EntityKind::Container);

        let before = transport.requests().len();
        tracker.assign_container(&issue, &version).unwrap();
        assert_eq!(transport.requests().len(), before);
    }

    #[test]
    fn test_sub_task_requires_parent() {
        let transport = scripted();
        let mut tracker = verified(&transport, settings());

        let mut draft = story("Add unit test");
        draft.role = ItemRole::SubTask;
        assert!(matches!(tracker.create_item(&draft), Err(TrackerError::Unsupported(_))));

        transport.on(Method::Post, "/rest/api/3/issue", json!({"id": "10004", "key": "PROJ-4"}));
        draft.parent = Some(CreatedEntity::new("10001", "Parent", EntityKind::Item).with_key("PROJ-1"));
        let sub = tracker.create_item(&draft).unwrap();
        assert_eq!(sub.kind, EntityKind::SubTask);
        let fields = &last_body(&transport)["fields"];
        assert_eq!(fields["parent"]["key"], "PROJ-1");
        assert_eq!(fields["issuetype"]["name"], "Sub-task");

        let before = transport.requests().len();
        tracker.link_child(&draft.parent.clone().unwrap(), &sub).unwrap();
        assert_eq!(transport.requests().len(), before);
    }

    #[test]
    fn test_link_story_to_epic() {
        let transport = scripted();
        transport.on(Method::Put, "/rest/api/3/issue/PROJ-2", Value::Null);
        let mut tracker = verified(&transport, settings());

        let epic = CreatedEntity::new("10000", "Launch", EntityKind::TopLevel).with_key("PROJ-1");
        let story = CreatedEntity::new("10002", "Story", EntityKind::Item).with_key("PROJ-2");
        tracker.link_child(&epic, &story).unwrap();

        assert_eq!(last_body(&transport)["fields"]["parent"]["key"], "PROJ-1");
    }

    #[test]
    fn test_adf_and_duration_helpers() {
        let adf = to_adf("First\n\nSecond\n\n");
        assert_eq!(adf["content"].as_array().unwrap().len(), 2);
        assert_eq!(adf["content"][1]["content"][0]["text"], "Second");
        assert_eq!(duration(3.0), "3h");
        assert_eq!(duration(1.5), "90m");
    }
}
