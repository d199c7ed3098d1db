use std::fmt;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct ValueBody {
    value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetValueResponse {
    pub message: String,
    pub tx_hash: String,
    pub block_number: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum StorageClientError {
    /// Transport or decoding failure.
    Http(reqwest::Error),
    /// The relay answered with a non-success status.
    Api { status: StatusCode, message: String },
}

impl fmt::Display for StorageClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "request failed: {}", e),
            Self::Api { status, message } => write!(f, "relay returned {}: {}", status, message),
        }
    }
}

impl std::error::Error for StorageClientError {}

impl From<reqwest::Error> for StorageClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

impl StorageClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
        }
    }
}

pub struct StorageClient {
    client: Client,
    base_url: String,
}

impl StorageClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn value_url(&self) -> String {
        format!("{}/api/v1/storage/value", self.base_url)
    }

    /// Current stored value as a decimal string.
    pub async fn get_value(&self) -> Result<String, StorageClientError> {
        let resp = self.client.get(self.value_url()).send().await?;
        let body: ValueBody = Self::decode(resp).await?;
        Ok(body.value)
    }

    /// Store `value` (a decimal string) and wait for it to be mined.
    pub async fn set_value(&self, value: &str) -> Result<SetValueResponse, StorageClientError> {
        let resp = self
            .client
            .post(self.value_url())
            .json(&ValueBody {
                value: value.to_string(),
            })
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Whether the relay answers its health check.
    pub async fn health(&self) -> Result<bool, StorageClientError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
    ) -> Result<T, StorageClientError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            return Err(StorageClientError::Api { status, message });
        }
        Ok(resp.json().await?)
    }
}
