use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The workspace a provisioning invocation should create.
///
/// Input-only: the orchestrator reads it and never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSpec {
    /// Unique within the organization.
    pub name: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub vcs_binding: Option<VcsBinding>,
    #[serde(default)]
    pub variable_set_name: Option<String>,
}

/// Link between a workspace and a VCS repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsBinding {
    /// Repository reference in `:org/:repo` form.
    pub repo_identifier: String,
    pub oauth_token_id: String,
    pub working_directory: String,
    #[serde(default)]
    pub trigger_glob: Option<String>,
}

/// How a run receives its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// The remote ingests the committed configuration from the linked repository.
    Vcs,
    /// The caller packages and uploads the configuration itself.
    Api,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Vcs => write!(f, "vcs"),
            RunMode::Api => write!(f, "api"),
        }
    }
}

impl WorkspaceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project_name: None,
            vcs_binding: None,
            variable_set_name: None,
        }
    }

    pub fn with_project(mut self, project_name: Option<String>) -> Self {
        self.project_name = project_name;
        self
    }

    pub fn with_vcs(mut self, binding: Option<VcsBinding>) -> Self {
        self.vcs_binding = binding;
        self
    }

    pub fn with_variable_set(mut self, name: Option<String>) -> Self {
        self.variable_set_name = name;
        self
    }

    /// The two run paths are mutually exclusive; the binding alone decides.
    pub fn run_mode(&self) -> RunMode {
        if self.vcs_binding.is_some() {
            RunMode::Vcs
        } else {
            RunMode::Api
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidSpec("workspace name is empty".into()));
        }
        if let Some(binding) = &self.vcs_binding {
            if binding.repo_identifier.trim().is_empty() {
                return Err(CoreError::InvalidSpec("VCS repository is empty".into()));
            }
            if binding.oauth_token_id.trim().is_empty() {
                return Err(CoreError::InvalidSpec(
                    "VCS binding requires an OAuth token id".into(),
                ));
            }
        }
        Ok(())
    }
}
