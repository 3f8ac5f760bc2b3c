//! HTTPS client for the resource management API.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode, header};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::config::Settings;

use super::{
    AliasDocumentSource, DeploymentCreator, DeploymentValidator, OperationHandle, OperationState,
    OperationStatus, RemoteDiagnostic, RemoteError, ResourceReader, ValidationReport,
};

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

#[derive(Debug, Clone)]
pub struct ArmClient {
    http: Client,
    endpoint: Url,
    access_token: String,
    subscription_id: String,
    deployments_api_version: String,
    alias_document_url: Url,
    poll_interval: Duration,
}

impl ArmClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: Client::new(),
            endpoint: settings.endpoint.clone(),
            access_token: settings.access_token.clone(),
            subscription_id: settings.subscription_id.clone(),
            deployments_api_version: settings.api_versions.deployments.clone(),
            alias_document_url: settings.alias_document_url.clone(),
            poll_interval: settings.poll_interval,
        }
    }

    fn url(&self, path: &str, api_version: &str) -> Result<Url, RemoteError> {
        let mut url = self
            .endpoint
            .join(path.trim_start_matches('/'))
            .map_err(|e| RemoteError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    fn deployment_path(&self, resource_group: &str, deployment_name: &str) -> String {
        format!(
            "/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}",
            self.subscription_id, resource_group, deployment_name
        )
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Response, RemoteError> {
        let path = url.path().to_string();
        trace!(%method, %url, "sending request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|source| RemoteError::Transport { path, source })
    }

    async fn read_json(path: &str, response: Response) -> Result<Value, RemoteError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| RemoteError::Transport {
                path: path.to_string(),
                source,
            })?;
        trace!(%path, %status, "received response");

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(RemoteError::Api {
                path: path.to_string(),
                status: status.as_u16(),
                diagnostic: RemoteDiagnostic::from_body(&body),
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| RemoteError::Malformed {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

fn header_url(response: &Response, name: impl header::AsHeaderName) -> Option<Url> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Url::parse(value).ok())
}

fn diagnostic_at(value: &Value, pointer: &str) -> Option<RemoteDiagnostic> {
    value
        .pointer(pointer)
        .cloned()
        .and_then(|error| serde_json::from_value(error).ok())
}

#[async_trait]
impl ResourceReader for ArmClient {
    async fn get(&self, path: &str, api_version: &str) -> Result<Value, RemoteError> {
        let url = self.url(path, api_version)?;
        let response = self.send(Method::GET, url, None).await?;
        Self::read_json(path, response).await
    }

    async fn list(&self, path: &str, api_version: &str) -> Result<Vec<Value>, RemoteError> {
        let mut items = Vec::new();
        let mut next = Some(self.url(path, api_version)?);

        while let Some(url) = next.take() {
            let response = self.send(Method::GET, url, None).await?;
            match Self::read_json(path, response).await? {
                Value::Array(page) => items.extend(page),
                Value::Object(mut page) => {
                    if let Some(Value::Array(values)) = page.remove("value") {
                        items.extend(values);
                    }
                    if let Some(Value::String(link)) = page.remove("nextLink") {
                        next = Some(Url::parse(&link).map_err(|e| RemoteError::Malformed {
                            path: path.to_string(),
                            reason: format!("invalid nextLink: {e}"),
                        })?);
                    }
                }
                other => {
                    return Err(RemoteError::Malformed {
                        path: path.to_string(),
                        reason: format!("expected a collection, got {other}"),
                    });
                }
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl DeploymentValidator for ArmClient {
    async fn validate_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        body: &Value,
    ) -> Result<ValidationReport, RemoteError> {
        let path = format!(
            "{}/validate",
            self.deployment_path(resource_group, deployment_name)
        );
        let url = self.url(&path, &self.deployments_api_version)?;
        let mut response = self.send(Method::POST, url, Some(body)).await?;

        // Validation may itself run as a long-running operation.
        while response.status() == StatusCode::ACCEPTED {
            let location =
                header_url(&response, header::LOCATION).ok_or_else(|| RemoteError::Malformed {
                    path: path.clone(),
                    reason: "accepted without a Location header".to_string(),
                })?;
            tokio::time::sleep(self.poll_interval).await;
            response = self.send(Method::GET, location, None).await?;
        }

        // A rejected template comes back as 400 with the diagnostic as body.
        if response.status() == StatusCode::BAD_REQUEST {
            let body = response
                .text()
                .await
                .map_err(|source| RemoteError::Transport {
                    path: path.clone(),
                    source,
                })?;
            return Ok(ValidationReport {
                provisioning_state: Some(OperationState::Failed.to_string()),
                error: Some(RemoteDiagnostic::from_body(&body)),
            });
        }

        let value = Self::read_json(&path, response).await?;
        Ok(ValidationReport {
            provisioning_state: value
                .pointer("/properties/provisioningState")
                .and_then(Value::as_str)
                .map(str::to_string),
            error: diagnostic_at(&value, "/error"),
        })
    }
}

#[async_trait]
impl DeploymentCreator for ArmClient {
    async fn begin_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        body: &Value,
    ) -> Result<OperationHandle, RemoteError> {
        let path = self.deployment_path(resource_group, deployment_name);
        let url = self.url(&path, &self.deployments_api_version)?;
        let response = self.send(Method::PUT, url.clone(), Some(body)).await?;

        // Without an async-operation header the deployment itself carries the provisioning state.
        let status_url = header_url(&response, ASYNC_OPERATION_HEADER).unwrap_or(url);
        Self::read_json(&path, response).await?;
        debug!(%deployment_name, %status_url, "deployment accepted");

        Ok(OperationHandle {
            deployment_name: deployment_name.to_string(),
            resource_group: resource_group.to_string(),
            status_url: status_url.to_string(),
        })
    }

    async fn operation_status(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus, RemoteError> {
        let url = Url::parse(&handle.status_url).map_err(|e| RemoteError::Malformed {
            path: handle.status_url.clone(),
            reason: e.to_string(),
        })?;
        let path = url.path().to_string();
        let response = self.send(Method::GET, url, None).await?;
        let value = Self::read_json(&path, response).await?;

        let state = value
            .pointer("/status")
            .or_else(|| value.pointer("/properties/provisioningState"))
            .and_then(Value::as_str)
            .map(OperationState::from_remote)
            .ok_or_else(|| RemoteError::Malformed {
                path: path.clone(),
                reason: "no operation status in response".to_string(),
            })?;

        Ok(OperationStatus {
            state,
            error: diagnostic_at(&value, "/error")
                .or_else(|| diagnostic_at(&value, "/properties/error")),
        })
    }

    async fn deployment_outputs(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<Value, RemoteError> {
        let path = self.deployment_path(resource_group, deployment_name);
        let deployment = self.get(&path, &self.deployments_api_version).await?;

        Ok(deployment
            .pointer("/properties/outputs")
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl AliasDocumentSource for ArmClient {
    async fn fetch_alias_document(&self) -> Result<String, RemoteError> {
        let path = self.alias_document_url.to_string();
        let response = self
            .http
            .get(self.alias_document_url.clone())
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                path: path.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| RemoteError::Transport {
                path: path.clone(),
                source,
            })?;
        if !status.is_success() {
            return Err(RemoteError::Api {
                path,
                status: status.as_u16(),
                diagnostic: RemoteDiagnostic::from_body(&body),
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiVersions;

    fn client() -> ArmClient {
        ArmClient::new(&Settings {
            subscription_id: "sub".to_string(),
            access_token: "token".to_string(),
            endpoint: Url::parse("https://management.example.com/").unwrap(),
            alias_document_url: Url::parse("https://aliases.example.com/aliases.json").unwrap(),
            poll_interval: Duration::from_millis(10),
            api_versions: ApiVersions::default(),
        })
    }

    #[test]
    fn test_url_appends_api_version() {
        let url = client()
            .url("/subscriptions/sub/resourceGroups/rg", "2022-09-01")
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://management.example.com/subscriptions/sub/resourceGroups/rg?api-version=2022-09-01"
        );
    }

    #[test]
    fn test_url_keeps_existing_query() {
        let url = client()
            .url(
                "/subscriptions/sub/providers/Microsoft.Authorization/roleDefinitions?$filter=roleName eq 'Reader'",
                "2022-04-01",
            )
            .unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("$filter".to_string(), "roleName eq 'Reader'".to_string()),
                ("api-version".to_string(), "2022-04-01".to_string()),
            ]
        );
    }

    #[test]
    fn test_deployment_path() {
        assert_eq!(
            client().deployment_path("rg", "vm_deploy_1"),
            "/subscriptions/sub/resourcegroups/rg/providers/Microsoft.Resources/deployments/vm_deploy_1"
        );
    }
}
