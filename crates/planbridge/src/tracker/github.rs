//! GitHub Issues adapter (REST v3).
//!
//! Labels map to repository labels, containers to milestones, the top-level
//! entity to an issue labelled `epic`, and children are attached through the
//! sub-issues endpoint.

use super::transport::{ApiRequest, Transport};
use super::{
    decode, label_style, CreatedEntity, EntityKind, IssueTracker, ItemDraft, ItemRole,
    TrackerError, TrackerKind, TrackerPriority, EPIC_LABEL,
};
use crate::domain::Phase;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const LABEL_PAGE_SIZE: usize = 100;

/// Connection settings for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubSettings {
    pub owner: String,
    pub repo: String,
    pub api_url: String,
    pub token: String,
}

impl GithubSettings {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
    #[serde(default)]
    has_issues: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
    #[serde(default)]
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Milestone {
    number: u64,
    title: String,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    id: u64,
    number: u64,
    title: String,
    #[serde(default)]
    html_url: Option<String>,
}

/// GitHub Issues tracker.
pub struct GithubTracker {
    settings: GithubSettings,
    transport: Box<dyn Transport>,
    existing_labels: Option<HashSet<String>>,
}

impl GithubTracker {
    pub fn new(settings: GithubSettings, transport: Box<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            existing_labels: None,
        }
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.owner,
            self.settings.repo,
            path
        )
    }

    fn authorize(&self, request: ApiRequest) -> ApiRequest {
        request
            .header("Authorization", format!("Bearer {}", self.settings.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn send(&self, request: ApiRequest) -> Result<serde_json::Value, TrackerError> {
        self.transport.send(&self.authorize(request))
    }

    /// All repository labels, following pages until a short one.
    fn load_labels(&mut self) -> Result<&mut HashSet<String>, TrackerError> {
        if self.existing_labels.is_none() {
            let mut names = HashSet::new();
            for page in 1.. {
                let path = format!("/labels?per_page={}&page={}", LABEL_PAGE_SIZE, page);
                let response = self.send(ApiRequest::get(self.repo_url(&path)))?;
                let labels: Vec<Label> = decode(response, "label list")?;
                let last = labels.len() < LABEL_PAGE_SIZE;
                names.extend(labels.into_iter().map(|l| l.name.to_lowercase()));
                if last {
                    break;
                }
            }
            debug!(count = names.len(), "Loaded existing GitHub labels");
            self.existing_labels = Some(names);
        }
        Ok(self.existing_labels.get_or_insert_with(HashSet::new))
    }
}

fn issue_entity(issue: Issue, kind: EntityKind) -> CreatedEntity {
    let entity = CreatedEntity::new(issue.id.to_string(), issue.title, kind)
        .with_key(format!("#{}", issue.number));
    match issue.html_url {
        Some(url) => entity.with_url(url),
        None => entity,
    }
}

/// Issue number from a `#12` key.
fn issue_number(entity: &CreatedEntity) -> Result<u64, TrackerError> {
    entity
        .key
        .as_deref()
        .map(|k| k.trim_start_matches('#'))
        .and_then(|k| k.parse().ok())
        .ok_or_else(|| {
            TrackerError::UnexpectedResponse(format!("'{}' has no issue number", entity.name))
        })
}

impl IssueTracker for GithubTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Github
    }

    fn verify(&mut self) -> Result<(), TrackerError> {
        let response = self.send(ApiRequest::get(self.repo_url("")))?;
        let repo: Repository = decode(response, "repository")?;
        if repo.has_issues == Some(false) {
            return Err(TrackerError::NotConfigured(format!(
                "issues are disabled for {}",
                repo.full_name
            )));
        }
        info!(repository = %repo.full_name, "Connected to GitHub");
        Ok(())
    }

    fn ensure_label(&mut self, name: &str) -> Result<CreatedEntity, TrackerError> {
        if self.load_labels()?.contains(&name.to_lowercase()) {
            return Ok(CreatedEntity::new(name, name, EntityKind::Label).reused());
        }

        let (color, description) = label_style(name);
        let response = self.send(ApiRequest::post(
            self.repo_url("/labels"),
            json!({ "name": name, "color": color, "description": description }),
        ))?;
        let label: Label = decode(response, "label")?;
        self.load_labels()?.insert(label.name.to_lowercase());

        let id = label.id.map(|id| id.to_string()).unwrap_or_else(|| label.name.clone());
        Ok(CreatedEntity::new(id, label.name, EntityKind::Label))
    }

    fn create_container(&mut self, phase: &Phase) -> Result<CreatedEntity, TrackerError> {
        let mut body = json!({ "title": phase.name, "state": "open" });
        if let Some(description) = &phase.description {
            body["description"] = json!(description);
        }
        if let Some(due) = phase.end_date {
            body["due_on"] = json!(format!("{}T00:00:00Z", due.format("%Y-%m-%d")));
        }

        let response = self.send(ApiRequest::post(self.repo_url("/milestones"), body))?;
        let milestone: Milestone = decode(response, "milestone")?;
        let entity = CreatedEntity::new(
            milestone.number.to_string(),
            milestone.title,
            EntityKind::Container,
        );
        Ok(match milestone.html_url {
            Some(url) => entity.with_url(url),
            None => entity,
        })
    }

    fn create_top_level(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> Result<CreatedEntity, TrackerError> {
        let response = self.send(ApiRequest::post(
            self.repo_url("/issues"),
            json!({
                "title": name,
                "body": description.unwrap_or_default(),
                "labels": [EPIC_LABEL],
            }),
        ))?;
        let issue: Issue = decode(response, "epic issue")?;
        Ok(issue_entity(issue, EntityKind::TopLevel))
    }

    fn create_item(&mut self, draft: &ItemDraft) -> Result<CreatedEntity, TrackerError> {
        let mut labels = draft.labels.clone();
        if let TrackerPriority::Label(label) = &draft.priority {
            labels.push(label.clone());
        }

        let mut body = json!({
            "title": draft.title,
            "body": draft.body(),
            "labels": labels,
        });
        if let Some(container) = &draft.container {
            if let Ok(number) = container.id.parse::<u64>() {
                body["milestone"] = json!(number);
            }
        }

        let response = self.send(ApiRequest::post(self.repo_url("/issues"), body))?;
        let issue: Issue = decode(response, "issue")?;
        let kind = match draft.role {
            ItemRole::Story => EntityKind::Item,
            ItemRole::SubTask => EntityKind::SubTask,
        };
        Ok(issue_entity(issue, kind))
    }

    fn link_child(
        &mut self,
        parent: &CreatedEntity,
        child: &CreatedEntity,
    ) -> Result<(), TrackerError> {
        let parent_number = issue_number(parent)?;
        let child_id: u64 = child.id.parse().map_err(|_| {
            TrackerError::UnexpectedResponse(format!("'{}' has no numeric issue id", child.name))
        })?;

        self.send(ApiRequest::post(
            self.repo_url(&format!("/issues/{}/sub_issues", parent_number)),
            json!({ "sub_issue_id": child_id }),
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use crate::tracker::transport::{Method, ScriptedTransport};
    use chrono::NaiveDate;

    fn tracker(transport: &ScriptedTransport) -> GithubTracker {
        GithubTracker::new(
            GithubSettings::new("acme", "app", "ghp_test"),
            Box::new(transport.clone()),
        )
    }

    fn draft(title: &str) -> ItemDraft {
        ItemDraft {
            title: title.to_string(),
            description: None,
            source: "prd.md".to_string(),
            priority: TrackerKind::Github.priority_value(Priority::High),
            estimate: None,
            labels: vec!["bug".to_string()],
            container: None,
            parent: None,
            role: ItemRole::Story,
        }
    }

    #[test]
    fn test_verify_sends_auth_headers() {
        let transport = ScriptedTransport::new();
        transport.on(Method::Get, "/repos/acme/app", json!({"full_name": "acme/app"}));

        tracker(&transport).verify().unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://api.github.com/repos/acme/app");
        assert_eq!(request.header_value("Authorization"), Some("Bearer ghp_test"));
        assert_eq!(request.header_value("X-GitHub-Api-Version"), Some(API_VERSION));
    }

    #[test]
    fn test_verify_rejects_disabled_issues() {
        let transport = ScriptedTransport::new();
        transport.on(
            Method::Get,
            "/repos/acme/app",
            json!({"full_name": "acme/app", "has_issues": false}),
        );
        assert!(matches!(
            tracker(&transport).verify(),
            Err(TrackerError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_labels_past_the_first_page_are_reused() {
        let transport = ScriptedTransport::new();
        let first: Vec<_> = (0..100)
            .map(|n| json!({"id": n, "name": format!("area/{}", n)}))
            .collect();
        transport.on(Method::Get, "/labels?per_page=100&page=1", json!(first));
        transport.on(Method::Get, "/labels?per_page=100&page=2", json!([{"id": 500, "name": "Security"}]));

        let mut gh = tracker(&transport);
        let security = gh.ensure_label("security").unwrap();

        assert!(security.reused);
        assert_eq!(transport.count(Method::Get, "/labels"), 2);
        assert_eq!(transport.count(Method::Post, "/labels"), 0);
    }

    #[test]
    fn test_ensure_label_reuses_existing() {
        let transport = ScriptedTransport::new();
        transport.on(Method::Get, "/labels", json!([{"id": 1, "name": "Bug"}]));
        transport.on(Method::Post, "/labels", json!({"id": 2, "name": "feature"}));

        let mut gh = tracker(&transport);
        let bug = gh.ensure_label("bug").unwrap();
        let feature = gh.ensure_label("feature").unwrap();
        let again = gh.ensure_label("feature").unwrap();

        assert!(bug.reused);
        assert!(!feature.reused);
        assert_eq!(feature.id, "2");
        assert!(again.reused);
        assert_eq!(transport.count(Method::Get, "/labels"), 1);
        assert_eq!(transport.count(Method::Post, "/labels"), 1);

        let create = transport
            .requests()
            .into_iter()
            .find(|r| r.method == Method::Post)
            .unwrap();
        assert_eq!(create.body.unwrap()["color"], "a2eeef");
    }

    #[test]
    fn test_create_milestone_with_due_date() {
        let transport = ScriptedTransport::new();
        transport.on(
            Method::Post,
            "/milestones",
            json!({"number": 3, "title": "Sprint 1", "html_url": "https://github.com/acme/app/milestone/3"}),
        );

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        let phase = Phase::new("Sprint 1").with_dates(start, end);
        let entity = tracker(&transport).create_container(&phase).unwrap();

        assert_eq!(entity.id, "3");
        assert_eq!(entity.kind, EntityKind::Container);
        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["due_on"], "2024-01-14T00:00:00Z");
    }

    #[test]
    fn test_create_item_maps_priority_and_milestone() {
        let transport = ScriptedTransport::new();
        transport.on(
            Method::Post,
            "/issues",
            json!({"id": 9001, "number": 12, "title": "Fix login", "html_url": "https://github.com/acme/app/issues/12"}),
        );

        let mut item = draft("Fix login");
        item.container = Some(CreatedEntity::new("3", "Sprint 1", EntityKind::Container));
        let entity = tracker(&transport).create_item(&item).unwrap();

        assert_eq!(entity.id, "9001");
        assert_eq!(entity.key.as_deref(), Some("#12"));
        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["labels"], json!(["bug", "priority: high"]));
        assert_eq!(body["milestone"], 3);
        assert!(body["body"].as_str().unwrap().contains("prd.md"));
    }

    #[test]
    fn test_link_child_uses_sub_issue_endpoint() {
        let transport = ScriptedTransport::new();
        transport.on(Method::Post, "/issues/12/sub_issues", json!({"id": 9001}));

        let parent = CreatedEntity::new("9001", "Parent", EntityKind::Item).with_key("#12");
        let child = CreatedEntity::new("9002", "Child", EntityKind::SubTask).with_key("#13");
        tracker(&transport).link_child(&parent, &child).unwrap();

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["sub_issue_id"], 9002);
    }

    #[test]
    fn test_top_level_is_labelled_epic() {
        let transport = ScriptedTransport::new();
        transport.on(Method::Post, "/issues", json!({"id": 1, "number": 1, "title": "Launch"}));

        let epic = tracker(&transport).create_top_level("Launch", None).unwrap();
        assert_eq!(epic.kind, EntityKind::TopLevel);
        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["labels"], json!(["epic"]));
    }
}
