use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ProvisionError;
use crate::poll::{Backoff, PollPolicy};

/// Connection and polling parameters, supplied once per process.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub tfc: TfcConfig,
    /// Absent means files are staged locally but never committed.
    pub repository: Option<RepositoryConfig>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TfcConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub organization: String,
    pub token: Option<String>,
}

impl Default for TfcConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            organization: String::new(),
            token: None,
        }
    }
}

fn default_hostname() -> String {
    "app.terraform.io".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default = "default_gitlab_url")]
    pub url: String,
    pub project_id: String,
    pub token: Option<String>,
    /// Falls back to the project's default branch.
    pub branch: Option<String>,
}

fn default_gitlab_url() -> String {
    "https://gitlab.com".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
    /// Zero disables the deadline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub backoff: BackoffKind,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            timeout_secs: default_timeout_secs(),
            backoff: BackoffKind::default(),
            max_interval_secs: default_max_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    5
}
fn default_snapshot_interval_secs() -> u64 {
    2
}
fn default_timeout_secs() -> u64 {
    3600
}
fn default_max_interval_secs() -> u64 {
    30
}

/// Transport settings shared by both remote clients.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Upper bound on a single request, connect through body.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

impl PollingConfig {
    fn policy(&self, interval_secs: u64) -> PollPolicy {
        let timeout = (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs));
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                max: Duration::from_secs(self.max_interval_secs.max(interval_secs)),
            },
        };
        PollPolicy {
            interval: Duration::from_secs(interval_secs),
            timeout,
            backoff,
        }
    }

    /// Policy for run status polling (plan and apply phases).
    pub fn run_policy(&self) -> PollPolicy {
        self.policy(self.interval_secs)
    }

    /// Policy for configuration ingestion and state version polling.
    pub fn snapshot_policy(&self) -> PollPolicy {
        self.policy(self.snapshot_interval_secs)
    }
}

impl ProvisionConfig {
    pub fn from_file(path: &Path) -> Result<Self, ProvisionError> {
        let content = std::fs::read_to_string(path).map_err(ProvisionError::Io)?;
        Self::from_toml(&content)
            .map_err(|e| ProvisionError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self, ProvisionError> {
        toml::from_str(content)
            .map_err(|e| ProvisionError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load from `path` if given, otherwise the first config found in the
    /// standard locations, otherwise defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self, ProvisionError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::discover() {
                Some(p) => {
                    tracing::debug!(path = %p.display(), "Using discovered config file");
                    Self::from_file(&p)?
                }
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `./tfprov.toml`, then `~/.config/tfprov/tfprov.toml`.
    pub fn discover() -> Option<PathBuf> {
        let local = PathBuf::from("tfprov.toml");
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|d| d.join("tfprov").join("tfprov.toml"))
            .filter(|p| p.exists())
    }

    /// Overlay values from `TFE_*` and `GL_*` variables.
    ///
    /// `lookup` is injected so tests never touch the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("TFE_HOSTNAME") {
            self.tfc.hostname = host;
        }
        if let Some(org) = lookup("TFE_ORG") {
            self.tfc.organization = org;
        }
        if let Some(token) = lookup("TFE_TOKEN") {
            self.tfc.token = Some(token);
        }

        let project_id = lookup("GL_PROJECT_ID");
        if self.repository.is_none()
            && let Some(id) = &project_id
        {
            self.repository = Some(RepositoryConfig {
                url: default_gitlab_url(),
                project_id: id.clone(),
                token: None,
                branch: None,
            });
        }
        if let Some(repo) = self.repository.as_mut() {
            if let Some(id) = project_id {
                repo.project_id = id;
            }
            if let Some(url) = lookup("GL_URL") {
                repo.url = url;
            }
            if let Some(token) = lookup("GL_TOKEN") {
                repo.token = Some(token);
            }
            if let Some(branch) = lookup("GL_BRANCH") {
                repo.branch = Some(branch);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.tfc.organization.trim().is_empty() {
            return Err(ProvisionError::Config(
                "No organization: set TFE_ORG or tfc.organization in tfprov.toml".into(),
            ));
        }
        if self.tfc.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(ProvisionError::Config(
                "No API token: set TFE_TOKEN or tfc.token in tfprov.toml".into(),
            ));
        }
        if self.polling.interval_secs == 0 || self.polling.snapshot_interval_secs == 0 {
            return Err(ProvisionError::Config(
                "polling.interval_secs and polling.snapshot_interval_secs must be at least 1"
                    .into(),
            ));
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ProvisionError::Config(
                "http.request_timeout_secs must be at least 1".into(),
            ));
        }
        if let Some(repo) = &self.repository
            && repo.project_id.trim().is_empty()
        {
            return Err(ProvisionError::Config(
                "repository.project_id is empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_minimal_config() {
        let toml_str = r#"
[tfc]
organization = "acme"
"#;
        let config = ProvisionConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.tfc.hostname, "app.terraform.io");
        assert_eq!(config.tfc.organization, "acme");
        assert!(config.repository.is_none());
        assert_eq!(config.polling.interval_secs, 5);
        assert_eq!(config.polling.snapshot_interval_secs, 2);
        assert_eq!(config.polling.backoff, BackoffKind::Fixed);
    }

    #[test]
    fn parses_full_config() {
        let toml_str = r#"
[tfc]
hostname = "tfe.internal"
organization = "acme"
token = "t-123"

[repository]
url = "https://gitlab.internal"
project_id = "42"
branch = "trunk"

[polling]
interval_secs = 10
timeout_secs = 0
backoff = "exponential"
max_interval_secs = 60
"#;
        let config = ProvisionConfig::from_toml(toml_str).unwrap();
        let repo = config.repository.as_ref().unwrap();
        assert_eq!(repo.url, "https://gitlab.internal");
        assert_eq!(repo.project_id, "42");
        assert_eq!(repo.branch.as_deref(), Some("trunk"));

        let policy = config.polling.run_policy();
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert!(policy.timeout.is_none());
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                max: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ProvisionConfig::from_toml("[tfc\norganization=").unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = ProvisionConfig::from_toml(
            r#"
[tfc]
organization = "from-file"
"#,
        )
        .unwrap();
        config.apply_env(env(&[
            ("TFE_ORG", "from-env"),
            ("TFE_TOKEN", "secret"),
            ("TFE_HOSTNAME", "tfe.example.com"),
        ]));
        assert_eq!(config.tfc.organization, "from-env");
        assert_eq!(config.tfc.token.as_deref(), Some("secret"));
        assert_eq!(config.tfc.hostname, "tfe.example.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn gl_project_id_enables_repository() {
        let mut config = ProvisionConfig::default();
        config.apply_env(env(&[("GL_PROJECT_ID", "77"), ("GL_TOKEN", "glpat")]));
        let repo = config.repository.unwrap();
        assert_eq!(repo.project_id, "77");
        assert_eq!(repo.url, "https://gitlab.com");
        assert_eq!(repo.token.as_deref(), Some("glpat"));
    }

    #[test]
    fn validate_requires_org_and_token() {
        let config = ProvisionConfig::default();
        assert!(matches!(config.validate(), Err(ProvisionError::Config(_))));

        let mut config = ProvisionConfig::default();
        config.tfc.organization = "acme".into();
        assert!(matches!(config.validate(), Err(ProvisionError::Config(_))));
    }

    fn valid() -> ProvisionConfig {
        let mut config = ProvisionConfig::default();
        config.tfc.organization = "acme".into();
        config.tfc.token = Some("t".into());
        config
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.polling.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ProvisionError::Config(_))));

        let mut config = valid();
        config.polling.snapshot_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ProvisionError::Config(_))));

        let mut config = valid();
        config.http.request_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ProvisionError::Config(_))));
    }

    #[test]
    fn parses_http_timeout() {
        let config = ProvisionConfig::from_toml("[http]\nrequest_timeout_secs = 5\n").unwrap();
        assert_eq!(config.http.request_timeout(), Duration::from_secs(5));
        assert_eq!(
            ProvisionConfig::default().http.request_timeout(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn exponential_max_never_below_interval() {
        let polling = PollingConfig {
            interval_secs: 20,
            max_interval_secs: 5,
            backoff: BackoffKind::Exponential,
            ..PollingConfig::default()
        };
        assert_eq!(
            polling.run_policy().backoff,
            Backoff::Exponential {
                max: Duration::from_secs(20)
            }
        );
    }
}
