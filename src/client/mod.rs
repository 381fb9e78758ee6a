//! Client Module
//!
//! Talks to a running daemon over its HTTP control API. CLI commands use
//! this module instead of opening the store, which the daemon holds.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::HttpConfig;
use crate::types::{CampaignId, NewCampaign};

/// Errors that can occur when talking to the daemon
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon is not reachable at {0}. Start it with: recrawl serve")]
    DaemonNotRunning(String),

    #[error("Daemon rejected the API key")]
    Unauthorized,

    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid daemon address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// HTTP client for `/api/v1`
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: url::Url,
    api_key: Option<String>,
}

impl ApiClient {
    /// Client for the daemon described by `config`.
    ///
    /// A wildcard listen address is reached through loopback.
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let addr = config.listen_addr.replace("0.0.0.0", "127.0.0.1");
        Self::new(&format!("http://{}", addr), config.api_keys.first().cloned())
    }

    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base = url::Url::parse(base_url)
            .and_then(|u| u.join("api/v1/"))
            .map_err(|e| ClientError::InvalidAddress(format!("{}: {}", base_url, e)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            api_key,
        })
    }

    async fn send<B: Serialize>(&self, method: Method, path: &str, body: Option<&B>) -> Result<reqwest::Response> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ClientError::InvalidAddress(e.to_string()))?;
        let mut request = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ClientError::DaemonNotRunning(self.base.to_string())
            } else {
                ClientError::RequestFailed(e)
            }
        })?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                Err(ClientError::Api {
                    code: body["code"].as_str().unwrap_or(status.as_str()).to_string(),
                    message: body["message"].as_str().unwrap_or_default().to_string(),
                })
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.send::<()>(Method::GET, path, None).await?.json().await?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: Option<&B>) -> Result<T> {
        Ok(self.send(Method::POST, path, body).await?.json().await?)
    }

    pub async fn health(&self) -> Result<Value> {
        self.get("health").await
    }

    pub async fn create_campaign(&self, request: &NewCampaign) -> Result<Value> {
        self.post("campaigns", Some(request)).await
    }

    pub async fn list_campaigns(&self) -> Result<Value> {
        self.get("campaigns").await
    }

    pub async fn campaign(&self, id: CampaignId) -> Result<Value> {
        self.get(&format!("campaigns/{}", id)).await
    }

    pub async fn iterations(&self, id: CampaignId) -> Result<Value> {
        self.get(&format!("campaigns/{}/iterations", id)).await
    }

    pub async fn cancel(&self, id: CampaignId) -> Result<Value> {
        self.post::<(), _>(&format!("campaigns/{}/cancel", id), None).await
    }

    pub async fn reset_recovery(&self, id: CampaignId) -> Result<Value> {
        self.post::<(), _>(&format!("campaigns/{}/recovery/reset", id), None).await
    }

    /// Dataset export body (`json` or `csv`)
    pub async fn dataset(&self, id: CampaignId, format: &str) -> Result<String> {
        let path = format!("campaigns/{}/dataset?format={}", id, format);
        Ok(self.send::<()>(Method::GET, &path, None).await?.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_config() {
        let mut config = HttpConfig::default();
        config.listen_addr = "0.0.0.0:9000".to_string();
        let client = ApiClient::from_config(&config).unwrap();
        assert_eq!(client.base.as_str(), "http://127.0.0.1:9000/api/v1/");
        assert_eq!(client.base.join("campaigns/3").unwrap().as_str(), "http://127.0.0.1:9000/api/v1/campaigns/3");
    }

    #[tokio::test]
    async fn test_api_error_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/campaigns/9")
            .match_header("authorization", "Bearer k1")
            .with_status(404)
            .with_body(r#"{"code":"NOT_FOUND","message":"campaign 9 not found"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), Some("k1".to_string())).unwrap();
        let err = client.campaign(9).await.unwrap_err();
        assert!(matches!(err, ClientError::Api { ref code, .. } if code == "NOT_FOUND"));
        mock.assert_async().await;
    }
}
