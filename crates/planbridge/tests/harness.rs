//! Test harness for integration tests
//!
//! Provides isolated document directories and scripted tracker backends that
//! answer like the real APIs without touching the network.

#![allow(dead_code)]

use chrono::NaiveDate;
use planbridge::domain::Document;
use planbridge::export::ExportOptions;
use planbridge::tracker::{
    ApiRequest, GithubSettings, GithubTracker, JiraSettings, JiraTracker, LinearSettings,
    LinearTracker, Method, ScriptedTransport,
};
use serde_json::{json, Value};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use tempfile::TempDir;

pub const JIRA_BASE: &str = "https://acme.atlassian.net";

/// A roadmap with one dated sprint, a story with a sub-task and a plain story.
pub const ROADMAP: &str = "\
# Roadmap

## Sprint 1: Foundation
Kickoff 2024-01-01 to 2024-01-14

- [P0] Fix login bug [3pt] [bug]
    - Add unit test
- [feature] Add dark mode
";

/// Isolated directory for documents and config files
pub struct TestHarness {
    temp: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.temp.path().to_path_buf()
    }

    /// Write a Markdown document and return its path
    pub fn write_doc(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Write `planbridge.toml` into the harness directory
    pub fn write_config(&self, content: &str) -> PathBuf {
        self.write_doc("planbridge.toml", content)
    }
}

pub fn documents(content: &str) -> Vec<Document> {
    vec![Document::new("roadmap.md", content)]
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Export options with a pinned date and no top-level entity
pub fn options() -> ExportOptions {
    ExportOptions {
        today: Some(today()),
        ..Default::default()
    }
}

/// Field of the request body as an owned value
pub fn body_field(request: &ApiRequest, field: &str) -> Value {
    request
        .body
        .as_ref()
        .map(|body| body[field].clone())
        .unwrap_or(Value::Null)
}

fn counter() -> Rc<Cell<u64>> {
    Rc::new(Cell::new(0))
}

fn bump(counter: &Cell<u64>) -> u64 {
    counter.set(counter.get() + 1);
    counter.get()
}

// === GitHub ===

/// GitHub repo `acme/app` with an existing `bug` label.
///
/// Milestones and issues are numbered from 1; issue ids are `1000 + number`.
pub fn github_transport() -> ScriptedTransport {
    let transport = ScriptedTransport::new();
    transport.on(
        Method::Get,
        "/repos/acme/app",
        json!({"full_name": "acme/app", "has_issues": true}),
    );
    transport.on(Method::Get, "/labels", json!([{"id": 1, "name": "bug"}]));
    transport.respond_with(Method::Post, "/labels", None, |request| {
        Ok(json!({"id": 50, "name": body_field(request, "name")}))
    });

    let milestones = counter();
    transport.respond_with(Method::Post, "/milestones", None, move |request| {
        let number = bump(&milestones);
        Ok(json!({"number": number, "title": body_field(request, "title")}))
    });

    let issues = counter();
    transport.respond_with(Method::Post, "/issues", None, move |request| {
        let number = bump(&issues);
        Ok(json!({
            "id": 1000 + number,
            "number": number,
            "title": body_field(request, "title"),
            "html_url": format!("https://github.com/acme/app/issues/{}", number),
        }))
    });
    transport.on(Method::Post, "/sub_issues", json!({}));
    transport
}

pub fn github_tracker(transport: &ScriptedTransport) -> GithubTracker {
    GithubTracker::new(
        GithubSettings::new("acme", "app", "ghp_test"),
        Box::new(transport.clone()),
    )
}

// === Linear ===

fn linear_payload(field: &str, node: &str, value: Value) -> Value {
    json!({"data": {field: {"success": true, node: value}}})
}

fn linear_input(request: &ApiRequest, field: &str) -> Value {
    request
        .body
        .as_ref()
        .map(|body| body["variables"]["input"][field].clone())
        .unwrap_or(Value::Null)
}

/// Linear team `ENG` with an existing `Bug` label.
///
/// Issues get identifiers `ENG-1`, `ENG-2`, ... in creation order.
pub fn linear_transport() -> ScriptedTransport {
    let transport = ScriptedTransport::new();
    transport.on_body(
        Method::Post,
        "/graphql",
        "Verify",
        json!({"data": {
            "viewer": {"id": "user-1", "name": "Ada"},
            "teams": {"nodes": [{"id": "team-1", "key": "ENG", "name": "Engineering"}]}
        }}),
    );
    transport.on_body(
        Method::Post,
        "/graphql",
        "TeamLabels",
        json!({"data": {"team": {"labels": {"nodes": [{"id": "lbl-bug", "name": "Bug"}]}}}}),
    );
    transport.respond_with(Method::Post, "/graphql", Some("LabelCreate"), |request| {
        let name = linear_input(request, "name");
        Ok(linear_payload(
            "issueLabelCreate",
            "issueLabel",
            json!({"id": format!("lbl-{}", name.as_str().unwrap_or_default()), "name": name}),
        ))
    });

    let cycles = counter();
    transport.respond_with(Method::Post, "/graphql", Some("CycleCreate"), move |_| {
        let number = bump(&cycles);
        Ok(linear_payload(
            "cycleCreate",
            "cycle",
            json!({"id": format!("cyc-{}", number), "number": number}),
        ))
    });
    transport.respond_with(Method::Post, "/graphql", Some("ProjectCreate"), |request| {
        Ok(linear_payload(
            "projectCreate",
            "project",
            json!({"id": "proj-1", "name": linear_input(request, "name"), "url": "https://linear.app/acme/project/proj-1"}),
        ))
    });

    let issues = counter();
    transport.respond_with(Method::Post, "/graphql", Some("IssueCreate"), move |request| {
        let number = bump(&issues);
        Ok(linear_payload(
            "issueCreate",
            "issue",
            json!({
                "id": format!("iss-{}", number),
                "identifier": format!("ENG-{}", number),
                "title": linear_input(request, "title"),
            }),
        ))
    });
    transport.on_body(
        Method::Post,
        "/graphql",
        "IssueUpdate",
        json!({"data": {"issueUpdate": {"success": true}}}),
    );
    transport
}

pub fn linear_tracker(transport: &ScriptedTransport) -> LinearTracker {
    LinearTracker::new(
        LinearSettings::new("ENG", "lin_api_test"),
        Box::new(transport.clone()),
    )
}

/// GraphQL operations sent so far whose query contains `operation`
pub fn graphql_requests(transport: &ScriptedTransport, operation: &str) -> Vec<ApiRequest> {
    transport
        .requests()
        .into_iter()
        .filter(|r| {
            r.body
                .as_ref()
                .and_then(|b| b["query"].as_str())
                .is_some_and(|q| q.contains(operation))
        })
        .collect()
}

// === Jira ===

/// Jira project `PROJ` (id 10000) with an existing `Security` component.
///
/// Versions and sprints are numbered from 1; issues get keys `PROJ-1`, ...
pub fn jira_transport() -> ScriptedTransport {
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
    transport.respond_with(Method::Post, "/rest/api/3/component", None, |request| {
        Ok(json!({"id": "201", "name": body_field(request, "name")}))
    });

    let versions = counter();
    transport.respond_with(Method::Post, "/rest/api/3/version", None, move |request| {
        let id = bump(&versions);
        Ok(json!({"id": id.to_string(), "name": body_field(request, "name")}))
    });
    let sprints = counter();
    transport.respond_with(Method::Post, "/rest/agile/1.0/sprint", None, move |request| {
        let id = bump(&sprints);
        Ok(json!({"id": id, "name": body_field(request, "name"), "state": "future"}))
    });
    transport.on(Method::Post, "/rest/agile/1.0/sprint/", json!({}));

    let issues = counter();
    transport.respond_with(Method::Post, "/rest/api/3/issue", None, move |_| {
        let number = bump(&issues);
        Ok(json!({"id": (10100 + number).to_string(), "key": format!("PROJ-{}", number)}))
    });
    transport.on(Method::Put, "/rest/api/3/issue/", json!({}));
    transport
}

pub fn jira_tracker(transport: &ScriptedTransport, board: Option<u64>) -> JiraTracker {
    let settings = JiraSettings::new(JIRA_BASE, "PROJ", "dev@acme.io", "secret");
    let settings = match board {
        Some(id) => settings.with_board(id),
        None => settings,
    };
    JiraTracker::new(settings, Box::new(transport.clone()))
}

/// Bodies of created Jira issues, in creation order
pub fn jira_issue_fields(transport: &ScriptedTransport) -> Vec<Value> {
    transport
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::Post && r.url.ends_with("/rest/api/3/issue"))
        .filter_map(|r| r.body.map(|b| b["fields"].clone()))
        .collect()
}
