//! Materializes a workspace's configuration from templates, locally and in
//! the configuration repository.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tfprov_core::template::render_tfvars_file;
use tfprov_core::{RenderedTemplate, Variables};

use crate::error::ProvisionError;
use crate::gitlab::{CommitInfo, CommitRequest, FileAction, RepositoryApi};

pub const MAIN_TEMPLATE: &str = "main.tf";
pub const TFVARS_TEMPLATE: &str = "template.tfvars.tpl";
pub const TFVARS_FILE: &str = "terraform.auto.tfvars";

#[derive(Debug, Clone)]
pub struct StageRequest {
    pub templates_dir: PathBuf,
    /// Relative directory inside the repository, also the staging subdir.
    pub destination: String,
    /// `None` skips the tfvars file.
    pub variables: Option<Variables>,
}

#[derive(Debug, Clone)]
pub struct StagedConfig {
    pub destination: String,
    pub local_dir: PathBuf,
    /// Repository-relative paths, e.g. `network/main.tf`.
    pub files: Vec<String>,
    pub commit: Option<CommitInfo>,
    pub rendered: Option<RenderedTemplate>,
}

struct RepositoryTarget {
    api: Arc<dyn RepositoryApi>,
    project_id: String,
    branch: Option<String>,
}

pub struct RepositoryStager {
    staging_root: PathBuf,
    repository: Option<RepositoryTarget>,
}

impl RepositoryStager {
    /// A stager that only writes under `staging_root`.
    pub fn local(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            repository: None,
        }
    }

    /// Also commit staged files to `project_id`. Without `branch` the
    /// project's default branch is used.
    pub fn with_repository(
        mut self,
        api: Arc<dyn RepositoryApi>,
        project_id: impl Into<String>,
        branch: Option<String>,
    ) -> Self {
        self.repository = Some(RepositoryTarget {
            api,
            project_id: project_id.into(),
            branch,
        });
        self
    }

    pub async fn stage(&self, request: &StageRequest) -> Result<StagedConfig, ProvisionError> {
        validate_destination(&request.destination)?;
        let dest = request.destination.trim_end_matches('/');

        let main_path = request.templates_dir.join(MAIN_TEMPLATE);
        if !main_path.exists() {
            return Err(ProvisionError::not_found(
                "template",
                main_path.display().to_string(),
            ));
        }
        let main_tf = tokio::fs::read_to_string(&main_path).await?;
        let mut contents = vec![(MAIN_TEMPLATE, main_tf)];

        let rendered = match &request.variables {
            Some(vars) => {
                let rendered =
                    render_tfvars_file(&request.templates_dir.join(TFVARS_TEMPLATE), vars)?;
                for key in &rendered.missing {
                    tracing::debug!(key = %key, "No value supplied for template variable");
                }
                contents.push((TFVARS_FILE, rendered.text.clone()));
                Some(rendered)
            }
            None => {
                tracing::info!(destination = %dest, "No variables given, skipping {TFVARS_FILE}");
                None
            }
        };

        let local_dir = self.staging_root.join(dest);
        tokio::fs::create_dir_all(&local_dir).await?;
        for (file, content) in &contents {
            tokio::fs::write(local_dir.join(file), content).await?;
        }
        tracing::info!(dir = %local_dir.display(), files = contents.len(), "Staged configuration");

        let files: Vec<String> = contents
            .iter()
            .map(|(file, _)| format!("{dest}/{file}"))
            .collect();

        let commit = match &self.repository {
            Some(target) => Some(commit(target, dest, &files, &contents).await?),
            None => None,
        };

        Ok(StagedConfig {
            destination: dest.to_string(),
            local_dir,
            files,
            commit,
            rendered,
        })
    }
}

async fn commit(
    target: &RepositoryTarget,
    dest: &str,
    files: &[String],
    contents: &[(&str, String)],
) -> Result<CommitInfo, ProvisionError> {
    let project = target.api.get_project(&target.project_id).await?;
    let branch = target
        .branch
        .clone()
        .or(project.default_branch)
        .unwrap_or_else(|| "main".into());

    let request = CommitRequest {
        branch: branch.clone(),
        commit_message: format!("Creating new '{dest}' config."),
        actions: files
            .iter()
            .zip(contents)
            .map(|(path, (_, content))| FileAction::create(path.clone(), content.clone()))
            .collect(),
    };
    let info = target.api.commit_files(&target.project_id, &request).await?;
    tracing::info!(
        project = %project.path_with_namespace,
        branch = %branch,
        commit = %info.id,
        "Committed configuration"
    );
    Ok(info)
}

fn validate_destination(destination: &str) -> Result<(), ProvisionError> {
    let trimmed = destination.trim_end_matches('/');
    if trimmed.trim().is_empty() {
        return Err(ProvisionError::Config("Destination directory is empty".into()));
    }
    let path = Path::new(trimmed);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(ProvisionError::Config(format!(
            "Destination '{destination}' must be a relative path without '..'"
        )));
    }
    Ok(())
}
