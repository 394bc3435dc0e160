//! Configuration file loading and tracker settings resolution.
//!
//! planbridge reads `planbridge.toml` from the working directory (or the
//! file named by `--config` / `PLANBRIDGE_CONFIG`). Every section and key is
//! optional; missing values fall back to defaults. Tokens are never read
//! from the file, only from the environment variables it names.

use crate::errors::{self, Diagnosis};
use crate::export::ExportOptions;
use crate::extract::{NoPhasesFoundPolicy, StrategyKind};
use crate::tracker::{
    github, jira, linear, GithubSettings, GithubTracker, HttpSettings, IssueTracker,
    JiraSettings, JiraTracker, LinearSettings, LinearTracker, TrackerKind, UreqTransport,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "planbridge.toml";
/// Environment variable overriding the config path.
pub const CONFIG_ENV: &str = "PLANBRIDGE_CONFIG";

/// Upper bound for `[export] synthesized_phases`.
pub const MAX_SYNTHESIZED_PHASES: usize = 52;
/// Upper bound for `[export] phase_span_days`.
pub const MAX_PHASE_SPAN_DAYS: i64 = 366;

/// Errors raised while turning config + environment into tracker settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing config value: [{section}] {field}")]
    MissingField {
        section: &'static str,
        field: &'static str,
    },

    #[error("{tracker} token not found in ${env_var}")]
    MissingToken { tracker: TrackerKind, env_var: String },

    #[error("Invalid config value for [{section}] {field}: {message}")]
    InvalidValue {
        section: &'static str,
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    /// Same error with causes and fixes attached
    pub fn diagnose(&self) -> Diagnosis {
        match self {
            ConfigError::MissingField { section, field } => {
                errors::missing_config_field(section, field)
            }
            ConfigError::MissingToken { tracker, env_var } => errors::missing_token(*tracker, env_var),
            ConfigError::InvalidValue { .. } => {
                Diagnosis::new(self.to_string()).fix("Correct the value in planbridge.toml")
            }
        }
    }
}

/// Root configuration structure loaded from `planbridge.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanbridgeConfig {
    pub export: Option<ExportConfig>,
    pub github: Option<GithubConfig>,
    pub linear: Option<LinearConfig>,
    pub jira: Option<JiraConfig>,
    pub http: Option<HttpConfig>,
}

/// Defaults for export runs; CLI flags override them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportConfig {
    /// Epic/project name (optional; no top-level entity when unset).
    pub top_level: Option<String>,
    /// Create containers from phases (default: true).
    pub create_containers: Option<bool>,
    /// Sync labels/components before creating items (default: true).
    pub sync_labels: Option<bool>,
    /// Attach labels to items (default: true).
    pub attach_labels: Option<bool>,
    /// "synthesize", "empty" or "fail" (default: "synthesize").
    pub phase_policy: Option<String>,
    /// Number of synthesized phases (default: 2).
    pub synthesized_phases: Option<usize>,
    /// Length of each synthesized phase in days (default: 14).
    pub phase_span_days: Option<i64>,
    /// "heuristic" or "commonmark" (default: "heuristic").
    pub strategy: Option<String>,
}

impl ExportConfig {
    pub fn phase_policy(&self) -> Result<NoPhasesFoundPolicy, ConfigError> {
        let policy = match self.phase_policy.as_deref() {
            None => NoPhasesFoundPolicy::default(),
            Some(raw) => raw.parse().map_err(|e: crate::extract::PlanError| {
                ConfigError::InvalidValue {
                    section: "export",
                    field: "phase_policy",
                    message: e.to_string(),
                }
            })?,
        };

        Ok(match policy {
            NoPhasesFoundPolicy::SynthesizeDefaults { count, span_days } => {
                let count = self.synthesized_phases.unwrap_or(count);
                if count > MAX_SYNTHESIZED_PHASES {
                    return Err(ConfigError::InvalidValue {
                        section: "export",
                        field: "synthesized_phases",
                        message: format!("must be at most {}", MAX_SYNTHESIZED_PHASES),
                    });
                }
                let span_days = self.phase_span_days.unwrap_or(span_days);
                if !(1..=MAX_PHASE_SPAN_DAYS).contains(&span_days) {
                    return Err(ConfigError::InvalidValue {
                        section: "export",
                        field: "phase_span_days",
                        message: format!("must be between 1 and {}", MAX_PHASE_SPAN_DAYS),
                    });
                }
                NoPhasesFoundPolicy::SynthesizeDefaults { count, span_days }
            }
            other => other,
        })
    }

    pub fn strategy(&self) -> Result<StrategyKind, ConfigError> {
        match self.strategy.as_deref() {
            None => Ok(StrategyKind::default()),
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                section: "export",
                field: "strategy",
                message,
            }),
        }
    }
}

/// `[github]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    /// REST base URL (default: https://api.github.com).
    pub api_url: Option<String>,
    /// Environment variable holding the token (default: GITHUB_TOKEN).
    pub token_env: Option<String>,
}

impl GithubConfig {
    pub fn token_env(&self) -> String {
        self.token_env
            .clone()
            .unwrap_or_else(|| "GITHUB_TOKEN".to_string())
    }
}

/// `[linear]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinearConfig {
    pub team_key: Option<String>,
    /// GraphQL endpoint (default: https://api.linear.app/graphql).
    pub api_url: Option<String>,
    /// Environment variable holding the API key (default: LINEAR_API_KEY).
    pub token_env: Option<String>,
}

impl LinearConfig {
    pub fn token_env(&self) -> String {
        self.token_env
            .clone()
            .unwrap_or_else(|| "LINEAR_API_KEY".to_string())
    }
}

/// `[jira]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JiraConfig {
    /// Site URL, e.g. https://acme.atlassian.net
    pub base_url: Option<String>,
    pub project_key: Option<String>,
    /// Account email used for Basic auth
    pub email: Option<String>,
    /// Scrum board for sprints; versions are used when unset.
    pub board_id: Option<u64>,
    /// Story points custom field (default: customfield_10016).
    pub story_points_field: Option<String>,
    /// Environment variable holding the API token (default: JIRA_API_TOKEN).
    pub token_env: Option<String>,
}

impl JiraConfig {
    pub fn token_env(&self) -> String {
        self.token_env
            .clone()
            .unwrap_or_else(|| "JIRA_API_TOKEN".to_string())
    }

    pub fn story_points_field(&self) -> String {
        self.story_points_field
            .clone()
            .unwrap_or_else(|| jira::DEFAULT_STORY_POINTS_FIELD.to_string())
    }
}

/// `[http]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: agent default).
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

fn required(
    value: &Option<String>,
    section: &'static str,
    field: &'static str,
) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::MissingField { section, field })
}

fn token(
    tracker: TrackerKind,
    env_var: String,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    env(&env_var)
        .filter(|t| !t.trim().is_empty())
        .ok_or(ConfigError::MissingToken { tracker, env_var })
}

/// Pick the config file: explicit path, then `$PLANBRIDGE_CONFIG`, then
/// `planbridge.toml` in `cwd`. Returns whether the path was requested
/// explicitly.
pub fn resolve_path(
    explicit: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
    cwd: &Path,
) -> (PathBuf, bool) {
    if let Some(path) = explicit {
        return (path.to_path_buf(), true);
    }
    match env(CONFIG_ENV).filter(|p| !p.is_empty()) {
        Some(path) => (PathBuf::from(path), true),
        None => (cwd.join(CONFIG_FILE), false),
    }
}

impl PlanbridgeConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file yields the default (empty) config unless `required`
    /// is set. A malformed file is an error.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !path.exists() {
            if required {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: PlanbridgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Export options from `[export]`, before CLI overrides.
    pub fn export_options(&self) -> Result<ExportOptions, ConfigError> {
        let section = self.export.clone().unwrap_or_default();
        Ok(ExportOptions {
            top_level: section.top_level.clone(),
            create_containers: section.create_containers.unwrap_or(true),
            sync_labels: section.sync_labels.unwrap_or(true),
            attach_labels: section.attach_labels.unwrap_or(true),
            dry_run: false,
            phase_policy: section.phase_policy()?,
            strategy: section.strategy()?,
            today: None,
        })
    }

    pub fn http_settings(&self) -> HttpSettings {
        let section = self.http.clone().unwrap_or_default();
        let defaults = HttpSettings::default();
        HttpSettings {
            timeout: section.timeout_secs.map(Duration::from_secs),
            user_agent: section.user_agent.unwrap_or(defaults.user_agent),
        }
    }

    pub fn github_settings(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<GithubSettings, ConfigError> {
        let section = self.github.clone().unwrap_or_default();
        let mut settings = GithubSettings::new(
            required(&section.owner, "github", "owner")?,
            required(&section.repo, "github", "repo")?,
            token(TrackerKind::Github, section.token_env(), env)?,
        );
        settings.api_url = section
            .api_url
            .unwrap_or_else(|| github::DEFAULT_API_URL.to_string());
        Ok(settings)
    }

    pub fn linear_settings(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<LinearSettings, ConfigError> {
        let section = self.linear.clone().unwrap_or_default();
        let mut settings = LinearSettings::new(
            required(&section.team_key, "linear", "team_key")?,
            token(TrackerKind::Linear, section.token_env(), env)?,
        );
        settings.api_url = section
            .api_url
            .unwrap_or_else(|| linear::DEFAULT_API_URL.to_string());
        Ok(settings)
    }

    pub fn jira_settings(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<JiraSettings, ConfigError> {
        let section = self.jira.clone().unwrap_or_default();
        let mut settings = JiraSettings::new(
            required(&section.base_url, "jira", "base_url")?,
            required(&section.project_key, "jira", "project_key")?,
            required(&section.email, "jira", "email")?,
            token(TrackerKind::Jira, section.token_env(), env)?,
        );
        settings.board_id = section.board_id;
        settings.story_points_field = section.story_points_field();
        Ok(settings)
    }

    /// Build a live tracker for `kind` backed by a blocking HTTP agent.
    pub fn connect(
        &self,
        kind: TrackerKind,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Box<dyn IssueTracker>, ConfigError> {
        let transport = Box::new(UreqTransport::new(&self.http_settings()));
        Ok(match kind {
            TrackerKind::Github => Box::new(GithubTracker::new(self.github_settings(env)?, transport)),
            TrackerKind::Linear => Box::new(LinearTracker::new(self.linear_settings(env)?, transport)),
            TrackerKind::Jira => Box::new(JiraTracker::new(self.jira_settings(env)?, transport)),
        })
    }
}
