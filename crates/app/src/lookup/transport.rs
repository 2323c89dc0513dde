//! HTTP transport seam.

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde_json::Value;

use super::TransportError;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[automock]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError>;

    async fn post_json(&self, url: &str, body: &Value)
    -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        let response = self.http.get(url).send().await?;
        let status = response.status().as_u16();

        Ok(TransportResponse {
            status,
            body: response.text().await?,
        })
    }

    async fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<TransportResponse, TransportError> {
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status().as_u16();

        Ok(TransportResponse {
            status,
            body: response.text().await?,
        })
    }
}
