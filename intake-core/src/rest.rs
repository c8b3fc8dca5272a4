// Thin reqwest wrapper around the hosted `generateContent` REST call.

use thiserror::Error;
use tracing::debug;

use crate::wire::{ErrorEnvelope, GenerateContentRequest, GenerateContentResponse};

#[derive(Debug, Error)]
pub enum RestError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("response carried no usable content")]
    Empty,

    #[error("undecodable payload: {0}")]
    Decode(String),
}

impl RestError {
    /// The service's way of saying the key (or the project behind it) is not
    /// usable.
    pub fn is_credential_rejection(&self) -> bool {
        match self {
            Self::Api { status, message } => {
                matches!(status, 401 | 403 | 404)
                    || message.contains("Requested entity was not found")
                    || message.contains("API key not valid")
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RestClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RestClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_owned(),
        }
    }

    pub fn url_for(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.endpoint)
    }

    pub async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, RestError> {
        let url = self.url_for(model);
        debug!("POST {url}");

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(RestError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}
