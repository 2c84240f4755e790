use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tfprov_core::{ConfigurationStatus, RunStatus, StateOutput, StateSnapshotRef, VcsBinding};

use crate::error::ProvisionError;

/// Boxed future returned by the remote API traits.
///
/// Uses Pin<Box<dyn Future>> for dyn-compatibility.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProvisionError>> + Send + 'a>>;

/// HTTP client whose requests give up after `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProvisionError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// A triggered run. Lives for one invocation and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub workspace_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateWorkspace {
    pub name: String,
    pub project_id: Option<String>,
    /// VCS fields are only sent when present.
    pub vcs: Option<VcsBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRun {
    pub workspace_id: String,
    pub configuration_version_id: Option<String>,
    pub message: String,
    pub auto_apply: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationVersion {
    pub id: String,
    pub status: ConfigurationStatus,
    /// Only set on freshly created API-driven versions.
    pub upload_url: Option<String>,
}

/// Facade over the workspace-management service.
///
/// Resources that may not exist *yet* (the first configuration version of a
/// VCS workspace, the current state version) report
/// [`ProvisionError::TransientUnavailable`]; every other failure is final.
pub trait WorkspaceApi: Send + Sync {
    fn resolve_project<'a>(&'a self, name: &'a str) -> ApiFuture<'a, String>;

    fn create_workspace<'a>(&'a self, request: &'a CreateWorkspace) -> ApiFuture<'a, String>;

    fn resolve_variable_set<'a>(&'a self, name: &'a str) -> ApiFuture<'a, String>;

    fn attach_variable_set<'a>(
        &'a self,
        varset_id: &'a str,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, ()>;

    fn latest_configuration_version<'a>(
        &'a self,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, ConfigurationVersion>;

    fn create_configuration_version<'a>(
        &'a self,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, ConfigurationVersion>;

    fn upload_configuration<'a>(&'a self, upload_url: &'a str, archive: Vec<u8>)
    -> ApiFuture<'a, ()>;

    fn create_run<'a>(&'a self, request: &'a CreateRun) -> ApiFuture<'a, RunHandle>;

    fn run_status<'a>(&'a self, run_id: &'a str) -> ApiFuture<'a, RunStatus>;

    fn current_state_version<'a>(&'a self, workspace_id: &'a str)
    -> ApiFuture<'a, StateSnapshotRef>;

    fn state_version_outputs<'a>(
        &'a self,
        state_version_id: &'a str,
    ) -> ApiFuture<'a, Vec<StateOutput>>;
}

/// A call observed by [`StubWorkspaceApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ResolveProject(String),
    CreateWorkspace(CreateWorkspace),
    ResolveVariableSet(String),
    AttachVariableSet { varset_id: String, workspace_id: String },
    LatestConfigurationVersion(String),
    CreateConfigurationVersion(String),
    UploadConfiguration { upload_url: String, bytes: usize },
    CreateRun(CreateRun),
    RunStatus(String),
    CurrentStateVersion(String),
    StateVersionOutputs(String),
}

/// Scripted state version response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStep {
    /// 404: no state version yet.
    Missing,
    Processing,
    Processed,
    Fail(String),
}

/// Deterministic in-memory [`WorkspaceApi`] for tests.
///
/// Scripted sequences are consumed one entry per call; the last entry
/// repeats once the script is exhausted.
pub struct StubWorkspaceApi {
    projects: HashMap<String, String>,
    variable_sets: HashMap<String, String>,
    workspaces: Mutex<HashSet<String>>,
    run_statuses: Mutex<VecDeque<String>>,
    ingestion: Mutex<VecDeque<Option<String>>>,
    snapshots: Mutex<VecDeque<SnapshotStep>>,
    outputs: Vec<StateOutput>,
    calls: Mutex<Vec<ApiCall>>,
    next_id: Mutex<u32>,
}

impl Default for StubWorkspaceApi {
    fn default() -> Self {
        Self::new()
    }
}

impl StubWorkspaceApi {
    pub fn new() -> Self {
        Self {
            projects: HashMap::new(),
            variable_sets: HashMap::new(),
            workspaces: Mutex::new(HashSet::new()),
            run_statuses: Mutex::new(VecDeque::from(["applied".to_string()])),
            ingestion: Mutex::new(VecDeque::from([Some("uploaded".to_string())])),
            snapshots: Mutex::new(VecDeque::from([SnapshotStep::Processed])),
            outputs: Vec::new(),
            calls: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    pub fn with_project(mut self, name: &str, id: &str) -> Self {
        self.projects.insert(name.into(), id.into());
        self
    }

    pub fn with_variable_set(mut self, name: &str, id: &str) -> Self {
        self.variable_sets.insert(name.into(), id.into());
        self
    }

    /// A workspace name that already exists remotely.
    pub fn with_existing_workspace(self, name: &str) -> Self {
        lock(&self.workspaces).insert(name.into());
        self
    }

    pub fn with_run_statuses(self, statuses: &[&str]) -> Self {
        *lock(&self.run_statuses) = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    /// `None` entries answer as "no configuration version yet".
    pub fn with_ingestion(self, statuses: &[Option<&str>]) -> Self {
        *lock(&self.ingestion) = statuses.iter().map(|s| s.map(str::to_string)).collect();
        self
    }

    pub fn with_snapshots(self, steps: Vec<SnapshotStep>) -> Self {
        *lock(&self.snapshots) = steps.into();
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<StateOutput>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: ApiCall) {
        lock(&self.calls).push(call);
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut n = lock(&self.next_id);
        *n += 1;
        format!("{prefix}-{n}")
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn next_scripted<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut q = lock(queue);
    if q.len() > 1 { q.pop_front() } else { q.front().cloned() }
}

impl WorkspaceApi for StubWorkspaceApi {
    fn resolve_project<'a>(&'a self, name: &'a str) -> ApiFuture<'a, String> {
        Box::pin(async move {
            self.record(ApiCall::ResolveProject(name.into()));
            self.projects
                .get(name)
                .cloned()
                .ok_or_else(|| ProvisionError::not_found("project", name))
        })
    }

    fn create_workspace<'a>(&'a self, request: &'a CreateWorkspace) -> ApiFuture<'a, String> {
        Box::pin(async move {
            self.record(ApiCall::CreateWorkspace(request.clone()));
            if !lock(&self.workspaces).insert(request.name.clone()) {
                return Err(ProvisionError::Conflict(format!(
                    "workspace '{}'",
                    request.name
                )));
            }
            Ok(format!("ws-{}", request.name))
        })
    }

    fn resolve_variable_set<'a>(&'a self, name: &'a str) -> ApiFuture<'a, String> {
        Box::pin(async move {
            self.record(ApiCall::ResolveVariableSet(name.into()));
            self.variable_sets
                .get(name)
                .cloned()
                .ok_or_else(|| ProvisionError::not_found("variable set", name))
        })
    }

    fn attach_variable_set<'a>(
        &'a self,
        varset_id: &'a str,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.record(ApiCall::AttachVariableSet {
                varset_id: varset_id.into(),
                workspace_id: workspace_id.into(),
            });
            Ok(())
        })
    }

    fn latest_configuration_version<'a>(
        &'a self,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, ConfigurationVersion> {
        Box::pin(async move {
            self.record(ApiCall::LatestConfigurationVersion(workspace_id.into()));
            match next_scripted(&self.ingestion).flatten() {
                Some(status) => Ok(ConfigurationVersion {
                    id: "cv-vcs".into(),
                    status: ConfigurationStatus::parse(&status),
                    upload_url: None,
                }),
                None => Err(ProvisionError::TransientUnavailable(format!(
                    "configuration version for {workspace_id}"
                ))),
            }
        })
    }

    fn create_configuration_version<'a>(
        &'a self,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, ConfigurationVersion> {
        Box::pin(async move {
            self.record(ApiCall::CreateConfigurationVersion(workspace_id.into()));
            let id = self.next_id("cv");
            Ok(ConfigurationVersion {
                upload_url: Some(format!("stub://upload/{id}")),
                id,
                status: ConfigurationStatus::Pending,
            })
        })
    }

    fn upload_configuration<'a>(
        &'a self,
        upload_url: &'a str,
        archive: Vec<u8>,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.record(ApiCall::UploadConfiguration {
                upload_url: upload_url.into(),
                bytes: archive.len(),
            });
            Ok(())
        })
    }

    fn create_run<'a>(&'a self, request: &'a CreateRun) -> ApiFuture<'a, RunHandle> {
        Box::pin(async move {
            self.record(ApiCall::CreateRun(request.clone()));
            Ok(RunHandle {
                workspace_id: request.workspace_id.clone(),
                run_id: self.next_id("run"),
                created_at: Utc::now(),
            })
        })
    }

    fn run_status<'a>(&'a self, run_id: &'a str) -> ApiFuture<'a, RunStatus> {
        Box::pin(async move {
            self.record(ApiCall::RunStatus(run_id.into()));
            let raw = next_scripted(&self.run_statuses).unwrap_or_else(|| "pending".into());
            Ok(RunStatus::parse(&raw))
        })
    }

    fn current_state_version<'a>(
        &'a self,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, StateSnapshotRef> {
        Box::pin(async move {
            self.record(ApiCall::CurrentStateVersion(workspace_id.into()));
            let processed = match next_scripted(&self.snapshots) {
                Some(SnapshotStep::Missing) | None => {
                    return Err(ProvisionError::TransientUnavailable(format!(
                        "state version for {workspace_id}"
                    )));
                }
                Some(SnapshotStep::Fail(msg)) => return Err(ProvisionError::UnexpectedRemote(msg)),
                Some(SnapshotStep::Processing) => false,
                Some(SnapshotStep::Processed) => true,
            };
            Ok(StateSnapshotRef {
                state_version_id: "sv-1".into(),
                resources_processed: processed,
            })
        })
    }

    fn state_version_outputs<'a>(
        &'a self,
        state_version_id: &'a str,
    ) -> ApiFuture<'a, Vec<StateOutput>> {
        Box::pin(async move {
            self.record(ApiCall::StateVersionOutputs(state_version_id.into()));
            Ok(self.outputs.clone())
        })
    }
}
