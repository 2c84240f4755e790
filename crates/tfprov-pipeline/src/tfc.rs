//! Terraform Cloud / Enterprise client over the JSON:API v2 surface.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use tfprov_core::{ConfigurationStatus, RunStatus, StateOutput, StateSnapshotRef};

use crate::api::{
    ApiFuture, ConfigurationVersion, CreateRun, CreateWorkspace, RunHandle, WorkspaceApi,
    http_client,
};
use crate::config::{HttpConfig, TfcConfig};
use crate::error::ProvisionError;

const JSON_API: &str = "application/vnd.api+json";
const PAGE_SIZE: u32 = 100;

pub struct TfcClient {
    http: reqwest::Client,
    base_url: String,
    organization: String,
    token: String,
}

impl TfcClient {
    pub fn new(
        hostname: &str,
        organization: String,
        token: String,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        Self::with_base_url(format!("https://{hostname}/api/v2"), organization, token, timeout)
    }

    pub fn from_config(config: &TfcConfig, http: &HttpConfig) -> Result<Self, ProvisionError> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProvisionError::Config("No API token configured".into()))?;
        Self::new(
            &config.hostname,
            config.organization.clone(),
            token,
            http.request_timeout(),
        )
    }

    /// Point the client at an arbitrary API root, e.g. a mock server.
    pub fn with_base_url(
        base_url: String,
        organization: String,
        token: String,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            organization,
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, JSON_API)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value, ProvisionError> {
        let resp = req.send().await?;
        let resp = check(resp).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Collect `data` across every page of a list endpoint.
    async fn list_all(&self, path: &str) -> Result<Vec<Value>, ProvisionError> {
        let mut items = Vec::new();
        let mut page = 1u64;
        loop {
            let req = self.request(Method::GET, path).query(&[
                ("page[number]", page.to_string()),
                ("page[size]", PAGE_SIZE.to_string()),
            ]);
            let body = self.send(req).await?;
            if let Some(data) = body["data"].as_array() {
                items.extend(data.iter().cloned());
            }
            match body["meta"]["pagination"]["next-page"].as_u64() {
                Some(next) if next > page => page = next,
                _ => return Ok(items),
            }
        }
    }

    async fn find_by_name(
        &self,
        path: &str,
        kind: &'static str,
        name: &str,
    ) -> Result<String, ProvisionError> {
        self.list_all(path)
            .await?
            .iter()
            .find(|item| item["attributes"]["name"].as_str() == Some(name))
            .and_then(|item| item["id"].as_str())
            .map(str::to_string)
            .ok_or_else(|| ProvisionError::not_found(kind, name))
    }
}

/// Map non-success statuses to the error taxonomy.
async fn check(resp: Response) -> Result<Response, ProvisionError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().path().to_string();
    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => ProvisionError::not_found("resource", url),
        StatusCode::CONFLICT => ProvisionError::Conflict(url),
        StatusCode::UNPROCESSABLE_ENTITY if body.contains("already been taken") => {
            ProvisionError::Conflict(url)
        }
        _ => ProvisionError::UnexpectedRemote(format!("{status} from {url}: {body}")),
    })
}

fn str_field(value: &Value, pointer: &str) -> Result<String, ProvisionError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProvisionError::UnexpectedRemote(format!("Response missing {pointer}")))
}

fn configuration_version(data: &Value) -> Result<ConfigurationVersion, ProvisionError> {
    Ok(ConfigurationVersion {
        id: str_field(data, "/id")?,
        status: ConfigurationStatus::parse(&str_field(data, "/attributes/status")?),
        upload_url: data["attributes"]["upload-url"].as_str().map(str::to_string),
    })
}

fn workspace_body(request: &CreateWorkspace) -> Value {
    let mut attributes = json!({ "name": request.name });
    if let Some(vcs) = &request.vcs {
        attributes["working-directory"] = json!(vcs.working_directory);
        attributes["vcs-repo"] = json!({
            "identifier": vcs.repo_identifier,
            "oauth-token-id": vcs.oauth_token_id,
        });
        if let Some(glob) = &vcs.trigger_glob {
            attributes["file-triggers-enabled"] = json!(true);
            attributes["trigger-patterns"] = json!([glob]);
        }
    }
    let mut data = json!({ "type": "workspaces", "attributes": attributes });
    if let Some(project_id) = &request.project_id {
        data["relationships"] = json!({
            "project": { "data": { "type": "projects", "id": project_id } }
        });
    }
    json!({ "data": data })
}

fn run_body(request: &CreateRun) -> Value {
    let mut relationships = json!({
        "workspace": { "data": { "type": "workspaces", "id": request.workspace_id } }
    });
    if let Some(cv) = &request.configuration_version_id {
        relationships["configuration-version"] =
            json!({ "data": { "type": "configuration-versions", "id": cv } });
    }
    json!({
        "data": {
            "type": "runs",
            "attributes": {
                "message": request.message,
                "auto-apply": request.auto_apply,
            },
            "relationships": relationships,
        }
    })
}

impl WorkspaceApi for TfcClient {
    fn resolve_project<'a>(&'a self, name: &'a str) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let path = format!("/organizations/{}/projects", self.organization);
            self.find_by_name(&path, "project", name).await
        })
    }

    fn create_workspace<'a>(&'a self, request: &'a CreateWorkspace) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let path = format!("/organizations/{}/workspaces", self.organization);
            let req = self.request(Method::POST, &path).json(&workspace_body(request));
            let body = self.send(req).await.map_err(|e| match e {
                ProvisionError::Conflict(_) => {
                    ProvisionError::Conflict(format!("workspace '{}'", request.name))
                }
                other => other,
            })?;
            str_field(&body, "/data/id")
        })
    }

    fn resolve_variable_set<'a>(&'a self, name: &'a str) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let path = format!("/organizations/{}/varsets", self.organization);
            self.find_by_name(&path, "variable set", name).await
        })
    }

    fn attach_variable_set<'a>(
        &'a self,
        varset_id: &'a str,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let path = format!("/varsets/{varset_id}/relationships/workspaces");
            let body = json!({ "data": [{ "type": "workspaces", "id": workspace_id }] });
            self.send(self.request(Method::POST, &path).json(&body)).await?;
            Ok(())
        })
    }

    fn latest_configuration_version<'a>(
        &'a self,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, ConfigurationVersion> {
        Box::pin(async move {
            let path = format!("/workspaces/{workspace_id}/configuration-versions");
            let req = self
                .request(Method::GET, &path)
                .query(&[("page[size]", "1")]);
            let body = self.send(req).await?;
            match body["data"].as_array().and_then(|d| d.first()) {
                Some(latest) => configuration_version(latest),
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
            let path = format!("/workspaces/{workspace_id}/configuration-versions");
            let body = json!({
                "data": {
                    "type": "configuration-versions",
                    "attributes": { "auto-queue-runs": false }
                }
            });
            let resp = self.send(self.request(Method::POST, &path).json(&body)).await?;
            configuration_version(&resp["data"])
        })
    }

    fn upload_configuration<'a>(
        &'a self,
        upload_url: &'a str,
        archive: Vec<u8>,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            // Upload URLs are pre-signed; no bearer token.
            let resp = self
                .http
                .put(upload_url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(archive)
                .send()
                .await?;
            check(resp).await?;
            Ok(())
        })
    }

    fn create_run<'a>(&'a self, request: &'a CreateRun) -> ApiFuture<'a, RunHandle> {
        Box::pin(async move {
            let req = self.request(Method::POST, "/runs").json(&run_body(request));
            let body = self.send(req).await?;
            Ok(RunHandle {
                workspace_id: request.workspace_id.clone(),
                run_id: str_field(&body, "/data/id")?,
                created_at: Utc::now(),
            })
        })
    }

    fn run_status<'a>(&'a self, run_id: &'a str) -> ApiFuture<'a, RunStatus> {
        Box::pin(async move {
            let body = self
                .send(self.request(Method::GET, &format!("/runs/{run_id}")))
                .await?;
            Ok(RunStatus::parse(&str_field(&body, "/data/attributes/status")?))
        })
    }

    fn current_state_version<'a>(
        &'a self,
        workspace_id: &'a str,
    ) -> ApiFuture<'a, StateSnapshotRef> {
        Box::pin(async move {
            let path = format!("/workspaces/{workspace_id}/current-state-version");
            let body = match self.send(self.request(Method::GET, &path)).await {
                Ok(body) => body,
                Err(ProvisionError::NotFound { .. }) => {
                    return Err(ProvisionError::TransientUnavailable(format!(
                        "state version for {workspace_id}"
                    )));
                }
                Err(e) => return Err(e),
            };
            Ok(StateSnapshotRef {
                state_version_id: str_field(&body, "/data/id")?,
                resources_processed: body["data"]["attributes"]["resources-processed"]
                    .as_bool()
                    .unwrap_or(false),
            })
        })
    }

    fn state_version_outputs<'a>(
        &'a self,
        state_version_id: &'a str,
    ) -> ApiFuture<'a, Vec<StateOutput>> {
        Box::pin(async move {
            let path = format!("/state-versions/{state_version_id}/outputs");
            self.list_all(&path)
                .await?
                .iter()
                .map(|item| {
                    Ok(StateOutput {
                        name: str_field(item, "/attributes/name")?,
                        value: item["attributes"]["value"].clone(),
                        sensitive: item["attributes"]["sensitive"].as_bool().unwrap_or(false),
                    })
                })
                .collect::<Result<Vec<_>, ProvisionError>>()
        })
    }
}
