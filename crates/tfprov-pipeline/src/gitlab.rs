//! GitLab REST v4 access for committing staged configuration.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::api::{ApiFuture, http_client};
use crate::config::{HttpConfig, RepositoryConfig};
use crate::error::ProvisionError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryProject {
    pub id: u64,
    pub path_with_namespace: String,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAction {
    pub action: FileActionKind,
    pub file_path: String,
    pub content: String,
}

impl FileAction {
    pub fn create(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            action: FileActionKind::Create,
            file_path: file_path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileActionKind {
    Create,
}

/// One atomic commit of several file actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRequest {
    pub branch: String,
    pub commit_message: String,
    pub actions: Vec<FileAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
    #[serde(default)]
    pub web_url: Option<String>,
}

pub trait RepositoryApi: Send + Sync {
    fn get_project<'a>(&'a self, project_id: &'a str) -> ApiFuture<'a, RepositoryProject>;

    fn commit_files<'a>(
        &'a self,
        project_id: &'a str,
        request: &'a CommitRequest,
    ) -> ApiFuture<'a, CommitInfo>;
}

pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitLabClient {
    pub fn new(
        url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: format!("{}/api/v4", url.trim_end_matches('/')),
            token,
        })
    }

    pub fn from_config(
        config: &RepositoryConfig,
        http: &HttpConfig,
    ) -> Result<Self, ProvisionError> {
        Self::new(&config.url, config.token.clone(), http.request_timeout())
    }

    fn project_url(&self, project_id: &str) -> String {
        // Namespaced paths are accepted in place of numeric ids once encoded.
        format!("{}/projects/{}", self.base_url, project_id.replace('/', "%2F"))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.header("PRIVATE-TOKEN", token),
            None => req,
        }
    }
}

impl RepositoryApi for GitLabClient {
    fn get_project<'a>(&'a self, project_id: &'a str) -> ApiFuture<'a, RepositoryProject> {
        Box::pin(async move {
            let resp = self
                .authed(self.http.get(self.project_url(project_id)))
                .send()
                .await?;
            match resp.status() {
                s if s.is_success() => Ok(resp.json().await?),
                StatusCode::NOT_FOUND => {
                    Err(ProvisionError::not_found("repository project", project_id))
                }
                status => {
                    let body = resp.text().await.unwrap_or_default();
                    Err(ProvisionError::UnexpectedRemote(format!(
                        "GitLab returned {status}: {body}"
                    )))
                }
            }
        })
    }

    fn commit_files<'a>(
        &'a self,
        project_id: &'a str,
        request: &'a CommitRequest,
    ) -> ApiFuture<'a, CommitInfo> {
        Box::pin(async move {
            let url = format!("{}/repository/commits", self.project_url(project_id));
            let resp = self.authed(self.http.post(url)).json(request).send().await?;
            let status = resp.status();
            if status.is_success() {
                return Ok(resp.json().await?);
            }
            let body = resp.text().await.unwrap_or_default();
            if body.contains("already exists") {
                let paths: Vec<&str> = request
                    .actions
                    .iter()
                    .map(|a| a.file_path.as_str())
                    .collect();
                return Err(ProvisionError::Conflict(format!(
                    "file in [{}]",
                    paths.join(", ")
                )));
            }
            if status == StatusCode::NOT_FOUND {
                return Err(ProvisionError::not_found("repository project", project_id));
            }
            Err(ProvisionError::UnexpectedRemote(format!(
                "GitLab commit failed with {status}: {body}"
            )))
        })
    }
}

/// In-memory repository for tests. Records every commit.
#[derive(Default)]
pub struct StubRepositoryApi {
    projects: Vec<String>,
    commits: Mutex<Vec<(String, CommitRequest)>>,
}

impl StubRepositoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project_id: &str) -> Self {
        self.projects.push(project_id.into());
        self
    }

    pub fn commits(&self) -> Vec<(String, CommitRequest)> {
        self.commits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RepositoryApi for StubRepositoryApi {
    fn get_project<'a>(&'a self, project_id: &'a str) -> ApiFuture<'a, RepositoryProject> {
        Box::pin(async move {
            let idx = self
                .projects
                .iter()
                .position(|p| p == project_id)
                .ok_or_else(|| ProvisionError::not_found("repository project", project_id))?;
            Ok(RepositoryProject {
                id: idx as u64 + 1,
                path_with_namespace: format!("stub/{project_id}"),
                default_branch: Some("main".into()),
            })
        })
    }

    fn commit_files<'a>(
        &'a self,
        project_id: &'a str,
        request: &'a CommitRequest,
    ) -> ApiFuture<'a, CommitInfo> {
        Box::pin(async move {
            let mut commits = self.commits.lock().unwrap_or_else(|e| e.into_inner());
            let taken = commits.iter().any(|(p, c)| {
                p == project_id
                    && c.actions
                        .iter()
                        .any(|old| request.actions.iter().any(|new| new.file_path == old.file_path))
            });
            if taken {
                return Err(ProvisionError::Conflict("file".into()));
            }
            commits.push((project_id.to_string(), request.clone()));
            Ok(CommitInfo {
                id: format!("commit-{}", commits.len()),
                web_url: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn gitlab(server: &MockServer, token: Option<&str>) -> GitLabClient {
        GitLabClient::new(&server.uri(), token.map(String::from), Duration::from_secs(5)).unwrap()
    }

    fn request() -> CommitRequest {
        CommitRequest {
            branch: "main".into(),
            commit_message: "Creating new 'network' config.".into(),
            actions: vec![FileAction::create("network/main.tf", "terraform {}\n")],
        }
    }

    #[tokio::test]
    async fn fetches_project_by_encoded_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Finfra"))
            .and(header("private-token", "glpat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42,
                "path_with_namespace": "acme/infra",
                "default_branch": "main"
            })))
            .mount(&server)
            .await;

        let client = gitlab(&server, Some("glpat"));
        let project = client.get_project("acme/infra").await.unwrap();
        assert_eq!(project.id, 42);
        assert_eq!(project.default_branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = gitlab(&server, None)
            .get_project("404")
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NotFound { kind: "repository project", .. }));
    }

    #[tokio::test]
    async fn commit_posts_create_actions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/42/repository/commits"))
            .and(body_json(json!({
                "branch": "main",
                "commit_message": "Creating new 'network' config.",
                "actions": [{
                    "action": "create",
                    "file_path": "network/main.tf",
                    "content": "terraform {}\n"
                }]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "abc123",
                "web_url": "https://gitlab.example/acme/infra/-/commit/abc123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = gitlab(&server, None)
            .commit_files("42", &request())
            .await
            .unwrap();
        assert_eq!(info.id, "abc123");
    }

    #[tokio::test]
    async fn existing_file_is_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/42/repository/commits"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "A file with this name already exists"
            })))
            .mount(&server)
            .await;

        let err = gitlab(&server, None)
            .commit_files("42", &request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Conflict(ref what) if what.contains("network/main.tf")
        ));
    }

    #[tokio::test]
    async fn slow_server_hits_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": 42, "path_with_namespace": "acme/infra"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = GitLabClient::new(&server.uri(), None, Duration::from_millis(200)).unwrap();
        let err = client.get_project("42").await.unwrap_err();
        assert!(matches!(err, ProvisionError::UnexpectedRemote(ref msg) if msg.contains("HTTP")));
    }

    #[tokio::test]
    async fn stub_rejects_recommitting_same_path() {
        let stub = StubRepositoryApi::new().with_project("42");
        stub.commit_files("42", &request()).await.unwrap();
        let err = stub.commit_files("42", &request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Conflict(_)));
        assert_eq!(stub.commits().len(), 1);
    }
}
