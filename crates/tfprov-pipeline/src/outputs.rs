use std::sync::Arc;

use tfprov_core::{OutputSet, StateSnapshotRef};

use crate::api::WorkspaceApi;
use crate::config::PollingConfig;
use crate::error::ProvisionError;
use crate::metrics::ProvisionMetrics;
use crate::poll::{CancelSignal, Poller, Probe};

/// Reads selected outputs from a workspace's current state once it exists.
pub struct OutputExtractor {
    api: Arc<dyn WorkspaceApi>,
    poller: Poller,
    metrics: Option<Arc<ProvisionMetrics>>,
}

impl OutputExtractor {
    pub fn new(api: Arc<dyn WorkspaceApi>, polling: &PollingConfig, cancel: CancelSignal) -> Self {
        Self {
            api,
            poller: Poller::new(polling.snapshot_policy(), cancel),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ProvisionMetrics>) -> Self {
        self.poller = self.poller.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Outputs named in `allow_list`. An empty list queries nothing.
    pub async fn extract(
        &self,
        workspace_id: &str,
        allow_list: &[String],
    ) -> Result<OutputSet, ProvisionError> {
        if allow_list.is_empty() {
            return Ok(OutputSet::default());
        }

        let snapshot = self.await_snapshot(workspace_id).await?;
        let outputs = self
            .api
            .state_version_outputs(&snapshot.state_version_id)
            .await?;

        for output in &outputs {
            if output.sensitive && allow_list.contains(&output.name) {
                tracing::warn!(output = %output.name, "Returning sensitive output");
            }
        }

        let selected = OutputSet::filter(outputs, allow_list);
        for name in allow_list {
            if selected.get(name).is_none() {
                tracing::warn!(output = %name, "Requested output not present in state");
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_outputs(selected.len());
        }
        tracing::info!(workspace_id, count = selected.len(), "Outputs extracted");
        Ok(selected)
    }

    /// Poll until the current state version exists and is processed.
    pub async fn await_snapshot(
        &self,
        workspace_id: &str,
    ) -> Result<StateSnapshotRef, ProvisionError> {
        let api = self.api.as_ref();
        self.poller
            .until("state version", move || async move {
                match api.current_state_version(workspace_id).await {
                    Ok(snapshot) if snapshot.resources_processed => Ok(Probe::Ready(snapshot)),
                    Ok(snapshot) => Ok(Probe::Pending(format!(
                        "{} processing",
                        snapshot.state_version_id
                    ))),
                    Err(e) if e.is_transient() => Ok(Probe::Pending(e.to_string())),
                    Err(e) => Err(e),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tfprov_core::StateOutput;

    use super::*;
    use crate::api::{ApiCall, SnapshotStep, StubWorkspaceApi};

    fn output(name: &str, value: serde_json::Value, sensitive: bool) -> StateOutput {
        StateOutput {
            name: name.into(),
            value,
            sensitive,
        }
    }

    fn extractor(api: Arc<StubWorkspaceApi>) -> OutputExtractor {
        let polling = PollingConfig {
            timeout_secs: 30,
            ..PollingConfig::default()
        };
        OutputExtractor::new(api, &polling, CancelSignal::never())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn empty_allow_list_queries_nothing() {
        let api = Arc::new(StubWorkspaceApi::new());
        let set = extractor(api.clone()).extract("ws-1", &[]).await.unwrap();
        assert!(set.is_empty());
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_snapshot_to_appear_and_process() {
        let api = Arc::new(
            StubWorkspaceApi::new()
                .with_snapshots(vec![
                    SnapshotStep::Missing,
                    SnapshotStep::Missing,
                    SnapshotStep::Processing,
                    SnapshotStep::Processed,
                ])
                .with_outputs(vec![
                    output("vpc_id", json!("vpc-123"), false),
                    output("subnet_ids", json!(["a", "b"]), false),
                ]),
        );
        let metrics = Arc::new(ProvisionMetrics::new());

        let set = extractor(api.clone())
            .with_metrics(metrics.clone())
            .extract("ws-1", &names(&["vpc_id"]))
            .await
            .unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("vpc_id"), Some(&json!("vpc-123")));
        assert_eq!(api.count(|c| matches!(c, ApiCall::CurrentStateVersion(_))), 4);
        assert_eq!(metrics.snapshot().outputs_returned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_names_yield_empty_success() {
        let api = Arc::new(
            StubWorkspaceApi::new().with_outputs(vec![output("vpc_id", json!("v"), false)]),
        );
        let set = extractor(api).extract("ws-1", &names(&["nope"])).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_aborts() {
        let api = Arc::new(
            StubWorkspaceApi::new()
                .with_snapshots(vec![SnapshotStep::Missing, SnapshotStep::Fail("500".into())]),
        );
        let err = extractor(api.clone())
            .extract("ws-1", &names(&["vpc_id"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::UnexpectedRemote(_)));
        assert_eq!(api.count(|c| matches!(c, ApiCall::StateVersionOutputs(_))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn never_processed_snapshot_times_out() {
        let api = Arc::new(StubWorkspaceApi::new().with_snapshots(vec![SnapshotStep::Processing]));
        let err = extractor(api)
            .extract("ws-1", &names(&["vpc_id"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn sensitive_outputs_are_returned() {
        let api = Arc::new(StubWorkspaceApi::new().with_outputs(vec![output(
            "db_password",
            json!("hunter2"),
            true,
        )]));
        let set = extractor(api)
            .extract("ws-1", &names(&["db_password"]))
            .await
            .unwrap();
        assert_eq!(set.get("db_password"), Some(&json!("hunter2")));
    }
}
