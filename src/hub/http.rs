//! reqwest-backed hub client

use super::{HubApi, HubError, HubResult};
use async_trait::async_trait;
use golem_protocol::{Command, DeploymentSpec, HubInfo, PeerHardware, PeerInfo, APP_NAME_HEADER};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client for the hub REST API
#[derive(Debug, Clone)]
pub struct HttpHub {
    client: Client,
    base_url: String,
}

impl HttpHub {
    /// Every request carries `X-GU-APPNAME: Bearer <app_name>`
    pub fn new(base_url: &str, app_name: &str) -> HubResult<Self> {
        Url::parse(base_url).map_err(|e| HubError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", app_name))
            .map_err(|_| HubError::InvalidAppName(app_name.to_string()))?;
        headers.insert(APP_NAME_HEADER, value);

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn deployment_url(&self, node_id: &str, deployment_id: &str) -> String {
        self.url(&format!("/peers/{}/deployments/{}", node_id, deployment_id))
    }

    async fn check(response: Response, operation: &'static str) -> HubResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(HubError::Status {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(response: Response, operation: &'static str) -> HubResult<T> {
        let body = Self::check(response, operation).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| HubError::Malformed {
            operation,
            reason: e.to_string(),
        })
    }
}

/// Deployment ids come back as a JSON string or a bare, possibly quoted, token
pub fn parse_deployment_id(body: &str) -> Option<String> {
    let id = serde_json::from_str::<String>(body)
        .unwrap_or_else(|_| body.trim().trim_matches('"').to_string());
    let id = id.trim().to_string();
    (!id.is_empty()).then_some(id)
}

#[async_trait]
impl HubApi for HttpHub {
    async fn hub_info(&self) -> HubResult<HubInfo> {
        let response = self.client.get(self.url("/")).send().await?;
        Self::json(response, "hub_info").await
    }

    async fn list_peers(&self) -> HubResult<Vec<PeerInfo>> {
        let response = self.client.get(self.url("/peers")).send().await?;
        Self::json(response, "list_peers").await
    }

    async fn peer_hardware(&self, node_id: &str) -> HubResult<PeerHardware> {
        let response = self
            .client
            .get(self.url(&format!("/peers/{}/hardware", node_id)))
            .send()
            .await?;
        Self::json(response, "peer_hardware").await
    }

    async fn create_deployment(&self, node_id: &str, spec: &DeploymentSpec) -> HubResult<String> {
        let response = self
            .client
            .post(self.url(&format!("/peers/{}/deployments", node_id)))
            .json(spec)
            .send()
            .await?;
        let body = Self::check(response, "create_deployment").await?.text().await?;
        let id = parse_deployment_id(&body).ok_or(HubError::Malformed {
            operation: "create_deployment",
            reason: "empty deployment id".to_string(),
        })?;
        debug!(node_id, deployment_id = %id, "Created deployment");
        Ok(id)
    }

    async fn update_deployment(
        &self,
        node_id: &str,
        deployment_id: &str,
        commands: &[Command],
    ) -> HubResult<Vec<String>> {
        let response = self
            .client
            .patch(self.deployment_url(node_id, deployment_id))
            .json(commands)
            .send()
            .await?;
        Self::json(response, "update_deployment").await
    }

    async fn drop_deployment(&self, node_id: &str, deployment_id: &str) -> HubResult<()> {
        let response = self
            .client
            .delete(self.deployment_url(node_id, deployment_id))
            .send()
            .await?;
        Self::check(response, "drop_deployment").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deployment_id() {
        assert_eq!(parse_deployment_id(r#""dep-42""#).as_deref(), Some("dep-42"));
        assert_eq!(parse_deployment_id("dep-42\n").as_deref(), Some("dep-42"));
        assert_eq!(parse_deployment_id(r#"  "dep-42"  "#).as_deref(), Some("dep-42"));
        assert_eq!(parse_deployment_id(r#""""#), None);
        assert_eq!(parse_deployment_id(""), None);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = HttpHub::new("not a url", "GolemCompiler").unwrap_err();
        assert!(matches!(err, HubError::InvalidUrl { .. }));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let hub = HttpHub::new("http://127.0.0.1:6162/", "GolemCompiler").unwrap();
        assert_eq!(hub.base_url(), "http://127.0.0.1:6162");
        assert_eq!(hub.url("/peers"), "http://127.0.0.1:6162/peers");
    }
}
