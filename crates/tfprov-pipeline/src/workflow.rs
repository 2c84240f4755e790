use std::sync::Arc;

use serde::Serialize;
use tfprov_core::{OutputSet, RunStatus, WorkspaceSpec};

use crate::api::WorkspaceApi;
use crate::config::PollingConfig;
use crate::error::ProvisionError;
use crate::gitlab::CommitInfo;
use crate::metrics::{MetricsSnapshot, ProvisionMetrics};
use crate::orchestrator::Orchestrator;
use crate::outputs::OutputExtractor;
use crate::poll::CancelSignal;
use crate::stage::{RepositoryStager, StageRequest};

/// Everything one invocation provisions.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub spec: WorkspaceSpec,
    pub stage: StageRequest,
    /// Output names to return; empty skips extraction.
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub workspace: String,
    pub workspace_id: String,
    pub run_id: String,
    pub status: RunStatus,
    pub destination: String,
    pub files: Vec<String>,
    pub commit: Option<CommitInfo>,
    pub outputs: OutputSet,
    pub metrics: MetricsSnapshot,
}

/// Stage, provision, then extract outputs, stopping at the first error.
pub struct ProvisionWorkflow {
    stager: RepositoryStager,
    orchestrator: Orchestrator,
    extractor: OutputExtractor,
    metrics: Arc<ProvisionMetrics>,
}

impl ProvisionWorkflow {
    pub fn new(
        stager: RepositoryStager,
        api: Arc<dyn WorkspaceApi>,
        polling: &PollingConfig,
        cancel: CancelSignal,
        metrics: Arc<ProvisionMetrics>,
    ) -> Self {
        Self {
            stager,
            orchestrator: Orchestrator::new(api.clone(), polling, cancel.clone())
                .with_metrics(metrics.clone()),
            extractor: OutputExtractor::new(api, polling, cancel).with_metrics(metrics.clone()),
            metrics,
        }
    }

    pub async fn run(&self, request: &ProvisionRequest) -> Result<ProvisionReport, ProvisionError> {
        request.spec.validate()?;

        let staged = self.stager.stage(&request.stage).await?;
        let outcome = self
            .orchestrator
            .provision(&request.spec, staged.local_dir.clone())
            .await?;
        let outputs = self
            .extractor
            .extract(&outcome.workspace_id, &request.outputs)
            .await?;

        let metrics = self.metrics.snapshot();
        tracing::info!(
            workspace = %request.spec.name,
            status = %outcome.status,
            polls = metrics.status_polls,
            outputs = outputs.len(),
            "Provisioning complete"
        );

        Ok(ProvisionReport {
            workspace: request.spec.name.clone(),
            workspace_id: outcome.workspace_id,
            run_id: outcome.run.run_id,
            status: outcome.status,
            destination: staged.destination,
            files: staged.files,
            commit: staged.commit,
            outputs,
            metrics,
        })
    }
}
