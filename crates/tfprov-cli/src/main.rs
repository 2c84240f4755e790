use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tfprov_core::{VarValue, Variables, VcsBinding, WorkspaceSpec};
use tfprov_pipeline::{
    CancelSignal, GitLabClient, LoggingMetricsBackend, ProvisionConfig, ProvisionMetrics,
    ProvisionRequest, ProvisionWorkflow, RepositoryStager, StageRequest, TfcClient,
};
use tracing_subscriber::{EnvFilter, fmt};

mod report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "tfprov",
    version,
    about = "Create a Terraform workspace from templates, apply it, and print its outputs"
)]
struct Cli {
    /// Workspace name
    #[arg(long)]
    name: String,

    /// Destination directory in the repository (defaults to the workspace name)
    #[arg(long)]
    working_dir: Option<String>,

    /// Project to create the workspace in
    #[arg(long)]
    project_name: Option<String>,

    /// VCS repository identifier (`org/repo`); enables VCS-driven runs
    #[arg(long, requires = "oauth_token_id")]
    vcs_repo: Option<String>,

    /// OAuth token id of the VCS connection
    #[arg(long)]
    oauth_token_id: Option<String>,

    /// Glob of paths that trigger runs
    #[arg(long, requires = "vcs_repo")]
    trigger_glob: Option<String>,

    /// Variable set to attach before the first run
    #[arg(long)]
    varset_name: Option<String>,

    #[arg(long, default_value = "templates")]
    templates_dir: PathBuf,

    #[arg(long, default_value = "staging")]
    staging_dir: PathBuf,

    /// Template variable; VALUE is parsed as JSON, falling back to a string
    #[arg(
        long = "var",
        num_args = 2,
        value_names = ["KEY", "VALUE"],
        action = ArgAction::Append
    )]
    vars: Vec<String>,

    /// Outputs to print once the run has applied
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    outputs: Vec<String>,

    /// Config file (default: ./tfprov.toml, then ~/.config/tfprov/tfprov.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Stage files locally without committing them
    #[arg(long)]
    skip_commit: bool,
}

impl Cli {
    fn destination(&self) -> String {
        self.working_dir.clone().unwrap_or_else(|| self.name.clone())
    }

    /// `None` when no `--var` was given.
    fn variables(&self) -> Option<Variables> {
        if self.vars.is_empty() {
            return None;
        }
        let vars = self
            .vars
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), VarValue::parse_cli(&pair[1])))
            .collect();
        Some(vars)
    }

    fn output_names(&self) -> Vec<String> {
        self.outputs
            .iter()
            .map(|name| name.trim().trim_end_matches(',').to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    fn spec(&self) -> WorkspaceSpec {
        let vcs = match (&self.vcs_repo, &self.oauth_token_id) {
            (Some(repo), Some(token)) => Some(VcsBinding {
                repo_identifier: repo.clone(),
                oauth_token_id: token.clone(),
                working_directory: self.destination(),
                trigger_glob: self.trigger_glob.clone(),
            }),
            _ => None,
        };
        WorkspaceSpec::new(&self.name)
            .with_project(self.project_name.clone())
            .with_vcs(vcs)
            .with_variable_set(self.varset_name.clone())
    }

    fn request(&self) -> ProvisionRequest {
        ProvisionRequest {
            spec: self.spec(),
            stage: StageRequest {
                templates_dir: self.templates_dir.clone(),
                destination: self.destination(),
                variables: self.variables(),
            },
            outputs: self.output_names(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the report.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TFPROV_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ProvisionConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    config.validate()?;

    let api = Arc::new(TfcClient::from_config(&config.tfc, &config.http)?);

    let mut stager = RepositoryStager::local(&cli.staging_dir);
    match (&config.repository, cli.skip_commit) {
        (Some(repo), false) => {
            stager = stager.with_repository(
                Arc::new(GitLabClient::from_config(repo, &config.http)?),
                repo.project_id.clone(),
                repo.branch.clone(),
            );
        }
        (Some(_), true) => tracing::info!("--skip-commit set, staging locally only"),
        (None, _) => tracing::info!("No repository configured, staging locally only"),
    }

    let (cancel_handle, cancel) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            cancel_handle.cancel();
        }
    });

    let metrics = Arc::new(ProvisionMetrics::with_backend(Arc::new(LoggingMetricsBackend)));
    let workflow = ProvisionWorkflow::new(stager, api, &config.polling, cancel, metrics);

    tracing::info!(
        workspace = %cli.name,
        organization = %config.tfc.organization,
        host = %config.tfc.hostname,
        "Provisioning workspace"
    );
    let report = workflow.run(&cli.request()).await?;

    match cli.format {
        Format::Text => print!("{}", report::text(&report)),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
