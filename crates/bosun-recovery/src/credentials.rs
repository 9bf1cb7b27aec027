//! HTTP client for the device credential refresh endpoint.

use bosun_core::{BosunError, BosunResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    device_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Requests fresh device tokens.
#[derive(Clone)]
pub struct CredentialClient {
    client: Client,
}

impl CredentialClient {
    /// Creates a client with the given request timeout.
    pub fn new(timeout: Duration) -> BosunResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BosunError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Creates a client around an existing `reqwest` client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// POSTs `{deviceId}` to `url`.
    ///
    /// Returns the token when the response is successful and carries a
    /// non-empty `token`, `None` when it carries none.
    pub async fn refresh(&self, url: &str, device_id: &str) -> BosunResult<Option<String>> {
        debug!(device_id = %device_id, url = %url, "Requesting credential refresh");

        let response = self
            .client
            .post(url)
            .json(&RefreshRequest { device_id })
            .send()
            .await
            .map_err(|e| BosunError::external("credential-refresh", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BosunError::external(
                "credential-refresh",
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| BosunError::external("credential-refresh", format!("Invalid response: {}", e)))?;

        Ok(body.token.filter(|t| !t.is_empty()))
    }
}
