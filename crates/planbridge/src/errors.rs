//! Diagnoses for CLI misconfiguration.
//!
//! A [`Diagnosis`] pairs a one-line summary with likely causes and fixes so
//! a bad config or a missing token can be repaired without reading the
//! source.

use crate::tracker::TrackerKind;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Hint {
    Cause(String),
    Fix(String),
}

/// A user-facing error summary plus hints.
///
/// # Example
///
/// ```
/// use planbridge::errors::Diagnosis;
///
/// let diagnosis = Diagnosis::new("GitHub repository not configured")
///     .because("planbridge.toml has no [github] section")
///     .fix("Add owner and repo under [github] in planbridge.toml");
///
/// assert!(diagnosis.render().contains("Try:"));
/// ```
#[derive(Debug, Clone)]
pub struct Diagnosis {
    summary: String,
    hints: Vec<Hint>,
}

impl Diagnosis {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            hints: Vec::new(),
        }
    }

    pub fn because(mut self, cause: impl Into<String>) -> Self {
        self.hints.push(Hint::Cause(cause.into()));
        self
    }

    pub fn fix(mut self, step: impl Into<String>) -> Self {
        self.hints.push(Hint::Fix(step.into()));
        self
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Summary followed by a "Likely cause" block and a "Try" block, each
    /// omitted when empty.
    pub fn render(&self) -> String {
        let causes: Vec<&str> = self
            .hints
            .iter()
            .filter_map(|h| match h {
                Hint::Cause(c) => Some(c.as_str()),
                Hint::Fix(_) => None,
            })
            .collect();
        let fixes: Vec<&str> = self
            .hints
            .iter()
            .filter_map(|h| match h {
                Hint::Fix(f) => Some(f.as_str()),
                Hint::Cause(_) => None,
            })
            .collect();

        let mut out = self.summary.clone();
        out.push('\n');
        for (heading, lines) in [("Likely cause", causes), ("Try", fixes)] {
            if lines.is_empty() {
                continue;
            }
            out.push_str(&format!("\n{}:\n", heading));
            for line in lines {
                out.push_str("  - ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for Diagnosis {}

/// Token environment variable is unset or empty.
pub fn missing_token(kind: TrackerKind, env_var: &str) -> Diagnosis {
    Diagnosis::new(format!("{} token not found in ${}", kind, env_var))
        .because(format!("{} is not set in this shell", env_var))
        .because("planbridge.toml names another variable through token_env")
        .fix(format!("export {}=<token>", env_var))
        .fix("Or run without credentials: planbridge preview --target <target> <files>")
}

/// Required config key is absent.
pub fn missing_config_field(section: &str, field: &str) -> Diagnosis {
    Diagnosis::new(format!("Missing config value: [{}] {}", section, field))
        .because("No planbridge.toml was found, or it has no such key")
        .because("--config selects another file")
        .fix(format!("Set `{}` in the `[{}]` table of planbridge.toml", field, section))
}

/// Live verification failed; hints depend on what the tracker rejected.
pub fn verification_failed(kind: TrackerKind, message: &str) -> Diagnosis {
    let diagnosis = Diagnosis::new(message);
    let lowered = message.to_lowercase();
    if lowered.contains("authentication") {
        diagnosis
            .because("The token was rejected or lacks scopes")
            .fix("Issue a new token and export it again")
    } else if lowered.contains("transport error") {
        diagnosis
            .because(format!("{} API host is unreachable", kind))
            .fix("Check api_url or base_url in planbridge.toml")
    } else {
        diagnosis
            .because(format!("{} target in planbridge.toml does not exist", kind))
            .fix("Check owner/repo, team_key or project_key")
    }
}
