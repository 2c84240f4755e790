//! Remote side of tfprov: stages configuration into a repository, drives a
//! workspace through its first run, and reads back selected outputs.

pub mod api;
pub mod config;
pub mod error;
pub mod gitlab;
pub mod metrics;
pub mod orchestrator;
pub mod outputs;
pub mod package;
pub mod poll;
pub mod stage;
pub mod tfc;
pub mod workflow;

pub use api::{RunHandle, StubWorkspaceApi, WorkspaceApi};
pub use config::ProvisionConfig;
pub use error::ProvisionError;
pub use gitlab::{GitLabClient, RepositoryApi, StubRepositoryApi};
pub use metrics::{LoggingMetricsBackend, MetricsBackend, ProvisionMetrics};
pub use orchestrator::{Orchestrator, RunOutcome, TriggerMode};
pub use outputs::OutputExtractor;
pub use poll::{CancelHandle, CancelSignal, Poller};
pub use stage::{RepositoryStager, StageRequest, StagedConfig};
pub use tfc::TfcClient;
pub use workflow::{ProvisionReport, ProvisionRequest, ProvisionWorkflow};
