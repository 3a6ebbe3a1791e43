//! API client for the ageplane server

use ageplane_common::api::ApiResponse;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Build request with authentication header
    fn build_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        request
    }

    /// Send a request and unwrap the response envelope
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<ApiResponse<T>> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            anyhow::bail!(error_message(status.as_u16(), &text));
        }

        serde_json::from_str(&text).context("Unexpected response from server")
    }

    async fn data<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .data
            .context("Response carried no data")
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.data(self.build_request(reqwest::Method::GET, path)).await
    }

    /// GET a path that answers with a bare JSON document rather than an envelope
    pub async fn get_raw<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .build_request(reqwest::Method::GET, path)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!(error_message(status.as_u16(), &text));
        }

        serde_json::from_str(&text).context("Unexpected response from server")
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.data(self.build_request(reqwest::Method::POST, path).json(body))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.data(self.build_request(reqwest::Method::PUT, path).json(body))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.data(self.build_request(reqwest::Method::DELETE, path))
            .await
    }
}

/// Human-readable message for a failed response, using the error envelope when present
fn error_message(status: u16, body: &str) -> String {
    let Ok(envelope) = serde_json::from_str::<ApiResponse<serde_json::Value>>(body) else {
        return format!("API request failed: {} - {}", status, body);
    };

    match envelope.error {
        Some(error) => {
            let mut message = format!("{} ({})", error.message, error.code);
            for detail in &error.details {
                message.push_str(&format!("\n  {}: {}", detail.field, detail.message));
            }
            message
        }
        None => format!("API request failed: {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_envelope() {
        let body = r#"{
            "success": false,
            "error": {
                "code": "VALIDATION_FAILED",
                "message": "Request validation failed",
                "details": [{"field": "name", "message": "Name is required"}]
            }
        }"#;

        let message = error_message(400, body);
        assert!(message.starts_with("Request validation failed (VALIDATION_FAILED)"));
        assert!(message.contains("name: Name is required"));
    }

    #[test]
    fn test_error_message_plain_body() {
        assert_eq!(
            error_message(502, "Bad Gateway"),
            "API request failed: 502 - Bad Gateway"
        );
    }

    #[test]
    fn test_trailing_slash_and_empty_key() {
        let client = ApiClient::new("http://localhost:8080/", Some(String::new())).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
        assert!(client.api_key.is_none());
    }
}
