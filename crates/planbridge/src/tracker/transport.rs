//! HTTP transport seam for tracker adapters.
//!
//! Adapters build [`ApiRequest`] values and hand them to a [`Transport`].
//! [`UreqTransport`] performs real blocking HTTP calls; [`ScriptedTransport`]
//! answers from registered routes and records every request, which lets the
//! adapters and the exporter be tested without a network.

use super::TrackerError;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// HTTP method used by the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// A single JSON API request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value by case-insensitive name
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends API requests and returns the decoded JSON body.
///
/// Empty response bodies (e.g. `204 No Content`) decode to `Value::Null`.
pub trait Transport {
    fn send(&self, request: &ApiRequest) -> Result<Value, TrackerError>;
}

/// Shared HTTP agent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Overall request timeout; `None` keeps the agent default
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            user_agent: format!("planbridge/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Blocking HTTP transport backed by `ureq`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(settings: &HttpSettings) -> Self {
        let mut builder = ureq::AgentBuilder::new().user_agent(&settings.user_agent);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&HttpSettings::default())
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<Value, TrackerError> {
        debug!(method = request.method.as_str(), url = %request.url, "Sending request");

        let mut call = self.agent.request(request.method.as_str(), &request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let response = match &request.body {
            Some(body) => call
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => call.call(),
        };

        match response {
            Ok(resp) => {
                let text = resp
                    .into_string()
                    .map_err(|e| TrackerError::Transport(e.to_string()))?;
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                serde_json::from_str(&text).map_err(|e| {
                    TrackerError::UnexpectedResponse(format!("invalid JSON from {}: {}", request.url, e))
                })
            }
            Err(ureq::Error::Status(status, resp)) => {
                let message = resp.into_string().unwrap_or_default();
                Err(status_error(status, &request.url, message))
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(TrackerError::Transport(transport.to_string()))
            }
        }
    }
}

/// Map a non-2xx status to a tracker error.
pub fn status_error(status: u16, url: &str, message: String) -> TrackerError {
    match status {
        401 | 403 => TrackerError::Auth(format!("HTTP {} from {}", status, url)),
        _ => TrackerError::Http {
            status,
            url: url.to_string(),
            message: truncate(message.trim(), 300),
        },
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

type Handler = Rc<dyn Fn(&ApiRequest) -> Result<Value, TrackerError>>;

struct Route {
    method: Method,
    url_contains: String,
    body_contains: Option<String>,
    handler: Handler,
}

impl Route {
    fn matches(&self, request: &ApiRequest) -> bool {
        if self.method != request.method || !request.url.contains(&self.url_contains) {
            return false;
        }
        match &self.body_contains {
            Some(needle) => request
                .body
                .as_ref()
                .is_some_and(|body| body.to_string().contains(needle.as_str())),
            None => true,
        }
    }
}

/// In-memory transport answering from registered routes.
///
/// Routes match on method, a URL substring and optionally a body substring
/// (useful for GraphQL, where every request hits the same URL). The most
/// recently registered matching route wins. Clones share routes and the
/// request log. Unmatched requests fail with HTTP 404.
///
/// # Example
///
/// ```
/// use planbridge::tracker::{ApiRequest, Method, ScriptedTransport, Transport};
/// use serde_json::json;
///
/// let transport = ScriptedTransport::new();
/// transport.on(Method::Get, "/repos/acme/app", json!({"full_name": "acme/app"}));
///
/// let response = transport.send(&ApiRequest::get("https://api.github.com/repos/acme/app")).unwrap();
/// assert_eq!(response["full_name"], "acme/app");
/// assert_eq!(transport.requests().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    routes: Rc<RefCell<Vec<Route>>>,
    requests: Rc<RefCell<Vec<ApiRequest>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer matching requests with a fixed JSON value
    pub fn on(&self, method: Method, url_contains: &str, response: Value) -> &Self {
        self.respond_with(method, url_contains, None, move |_| Ok(response.clone()))
    }

    /// Answer matching requests whose body contains `body_contains`
    pub fn on_body(
        &self,
        method: Method,
        url_contains: &str,
        body_contains: &str,
        response: Value,
    ) -> &Self {
        self.respond_with(method, url_contains, Some(body_contains), move |_| {
            Ok(response.clone())
        })
    }

    /// Fail matching requests with `error`
    pub fn fail(&self, method: Method, url_contains: &str, error: TrackerError) -> &Self {
        self.respond_with(method, url_contains, None, move |_| Err(error.clone()))
    }

    /// Fail matching requests whose body contains `body_contains`
    pub fn fail_body(
        &self,
        method: Method,
        url_contains: &str,
        body_contains: &str,
        error: TrackerError,
    ) -> &Self {
        self.respond_with(method, url_contains, Some(body_contains), move |_| {
            Err(error.clone())
        })
    }

    /// Answer matching requests by calling `handler`
    pub fn respond_with<F>(
        &self,
        method: Method,
        url_contains: &str,
        body_contains: Option<&str>,
        handler: F,
    ) -> &Self
    where
        F: Fn(&ApiRequest) -> Result<Value, TrackerError> + 'static,
    {
        self.routes.borrow_mut().push(Route {
            method,
            url_contains: url_contains.to_string(),
            body_contains: body_contains.map(str::to_string),
            handler: Rc::new(handler),
        });
        self
    }

    /// All requests sent so far, in order
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.borrow().clone()
    }

    /// Number of requests matching a method and URL substring
    pub fn count(&self, method: Method, url_contains: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.method == method && r.url.contains(url_contains))
            .count()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &ApiRequest) -> Result<Value, TrackerError> {
        self.requests.borrow_mut().push(request.clone());

        let handler = self
            .routes
            .borrow()
            .iter()
            .rev()
            .find(|route| route.matches(request))
            .map(|route| Rc::clone(&route.handler));

        match handler {
            Some(handler) => handler(request),
            None => Err(status_error(
                404,
                &request.url,
                format!("no scripted response for {} {}", request.method.as_str(), request.url),
            )),
        }
    }
}
