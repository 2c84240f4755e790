use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tfprov_core::{RunPhase, RunStatus, Verdict, WorkspaceSpec};

use crate::api::{ConfigurationVersion, CreateRun, CreateWorkspace, RunHandle, WorkspaceApi};
use crate::config::PollingConfig;
use crate::error::ProvisionError;
use crate::metrics::ProvisionMetrics;
use crate::package;
use crate::poll::{CancelSignal, Poller, Probe};

pub const DEFAULT_RUN_MESSAGE: &str = "Triggered by tfprov.";

/// How a run obtains its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerMode {
    /// The workspace ingests from its linked repository.
    Vcs,
    /// Upload `source_dir` as a new configuration version.
    Api { source_dir: PathBuf },
}

/// Where a provisioned workspace ended up.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub workspace_id: String,
    pub run: RunHandle,
    pub status: RunStatus,
}

/// Drives a workspace from creation through an applied run.
///
/// Every wait goes through a [`Poller`], so all of them share the
/// configured deadline and the process-wide cancel signal.
pub struct Orchestrator {
    api: Arc<dyn WorkspaceApi>,
    run_poller: Poller,
    ingest_poller: Poller,
    metrics: Option<Arc<ProvisionMetrics>>,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn WorkspaceApi>, polling: &PollingConfig, cancel: CancelSignal) -> Self {
        Self {
            api,
            run_poller: Poller::new(polling.run_policy(), cancel.clone()),
            ingest_poller: Poller::new(polling.snapshot_policy(), cancel),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ProvisionMetrics>) -> Self {
        self.run_poller = self.run_poller.with_metrics(metrics.clone());
        self.ingest_poller = self.ingest_poller.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Create the workspace described by `spec`, returning its id.
    pub async fn create_workspace(&self, spec: &WorkspaceSpec) -> Result<String, ProvisionError> {
        let project_id = match &spec.project_name {
            Some(name) => Some(self.api.resolve_project(name).await?),
            None => None,
        };

        let request = CreateWorkspace {
            name: spec.name.clone(),
            project_id,
            vcs: spec.vcs_binding.clone(),
        };
        let workspace_id = self.api.create_workspace(&request).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_workspace_created();
        }
        tracing::info!(
            workspace = %spec.name,
            workspace_id = %workspace_id,
            mode = %spec.run_mode(),
            "Workspace created"
        );
        Ok(workspace_id)
    }

    pub async fn attach_variable_set(
        &self,
        workspace_id: &str,
        set_name: &str,
    ) -> Result<(), ProvisionError> {
        let varset_id = self.api.resolve_variable_set(set_name).await?;
        self.api.attach_variable_set(&varset_id, workspace_id).await?;
        tracing::info!(workspace_id, variable_set = set_name, "Variable set attached");
        Ok(())
    }

    /// Start an auto-applying run once configuration is available.
    pub async fn trigger_run(
        &self,
        workspace_id: &str,
        mode: &TriggerMode,
    ) -> Result<RunHandle, ProvisionError> {
        let configuration = match mode {
            TriggerMode::Vcs => self.await_ingestion(workspace_id).await?,
            TriggerMode::Api { source_dir } => self.upload(workspace_id, source_dir).await?,
        };

        let request = CreateRun {
            workspace_id: workspace_id.to_string(),
            configuration_version_id: Some(configuration.id),
            message: DEFAULT_RUN_MESSAGE.into(),
            auto_apply: true,
        };
        let run = self.api.create_run(&request).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_run_started();
        }
        tracing::info!(workspace_id, run_id = %run.run_id, "Run triggered");
        Ok(run)
    }

    async fn await_ingestion(
        &self,
        workspace_id: &str,
    ) -> Result<ConfigurationVersion, ProvisionError> {
        let api = self.api.as_ref();
        self.ingest_poller
            .until("configuration ingestion", move || async move {
                let cv = match api.latest_configuration_version(workspace_id).await {
                    Ok(cv) => cv,
                    Err(e) if e.is_transient() => return Ok(Probe::Pending(e.to_string())),
                    Err(e) => return Err(e),
                };
                match cv.status.verdict() {
                    Verdict::Success => Ok(Probe::Ready(cv)),
                    Verdict::Continue => Ok(Probe::Pending(cv.status.to_string())),
                    Verdict::Failure => Err(ProvisionError::ConfigurationFailed {
                        status: cv.status.to_string(),
                        id: cv.id,
                    }),
                }
            })
            .await
    }

    async fn upload(
        &self,
        workspace_id: &str,
        source_dir: &std::path::Path,
    ) -> Result<ConfigurationVersion, ProvisionError> {
        let archive = package::package(source_dir.to_path_buf()).await?;
        let cv = self.api.create_configuration_version(workspace_id).await?;
        let url = cv.upload_url.as_deref().ok_or_else(|| {
            ProvisionError::UnexpectedRemote(format!(
                "Configuration version {} has no upload URL",
                cv.id
            ))
        })?;
        let bytes = archive.len();
        self.api.upload_configuration(url, archive).await?;
        tracing::info!(
            workspace_id,
            configuration_version = %cv.id,
            bytes,
            "Configuration uploaded"
        );
        Ok(cv)
    }

    /// Wait through the plan and apply phases, returning the terminal status.
    pub async fn await_run_completion(&self, run: &RunHandle) -> Result<RunStatus, ProvisionError> {
        let result = self.await_phases(&run.run_id).await;
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(_) => metrics.record_run_succeeded(),
                Err(ProvisionError::RunFailed { .. }) => metrics.record_run_failed(),
                Err(_) => {}
            }
        }
        result
    }

    async fn await_phases(&self, run_id: &str) -> Result<RunStatus, ProvisionError> {
        let planned = self.await_phase(run_id, RunPhase::Plan).await?;
        tracing::info!(run_id, status = %planned, "Plan phase complete");

        if RunPhase::Apply.classify(&planned) == Verdict::Success {
            return Ok(planned);
        }

        let applied = self.await_phase(run_id, RunPhase::Apply).await?;
        tracing::info!(run_id, status = %applied, "Apply phase complete");
        Ok(applied)
    }

    async fn await_phase(
        &self,
        run_id: &str,
        phase: RunPhase,
    ) -> Result<RunStatus, ProvisionError> {
        let api = self.api.as_ref();
        let what = format!("run {run_id} {phase}");
        self.run_poller
            .until(&what, move || async move {
                let status = api.run_status(run_id).await?;
                match phase.classify(&status) {
                    Verdict::Success => Ok(Probe::Ready(status)),
                    Verdict::Continue => Ok(Probe::Pending(status.to_string())),
                    Verdict::Failure => {
                        tracing::error!(run_id, %phase, status = %status, "Run failed");
                        Err(ProvisionError::RunFailed {
                            run_id: run_id.to_string(),
                            phase,
                            status: status.to_string(),
                        })
                    }
                }
            })
            .await
    }

    /// Create, configure, trigger and await a workspace's first run.
    ///
    /// `source_dir` is the upload source for API-driven workspaces and is
    /// ignored when the workspace has a VCS binding.
    pub async fn provision(
        &self,
        spec: &WorkspaceSpec,
        source_dir: PathBuf,
    ) -> Result<RunOutcome, ProvisionError> {
        spec.validate()?;

        let workspace_id = self.create_workspace(spec).await?;
        if let Some(set_name) = &spec.variable_set_name {
            self.attach_variable_set(&workspace_id, set_name).await?;
        }

        let mode = match spec.vcs_binding {
            Some(_) => TriggerMode::Vcs,
            None => TriggerMode::Api { source_dir },
        };
        let run = self.trigger_run(&workspace_id, &mode).await?;
        let status = self.await_run_completion(&run).await?;

        Ok(RunOutcome {
            workspace_id,
            run,
            status,
        })
    }
}
