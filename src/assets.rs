// src/assets.rs
// Asset reference resolution. Campaign stills live behind the asset service;
// generation providers need short-lived externally reachable URLs.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

#[async_trait]
pub trait AssetResolver: Send + Sync {
    async fn resolve(&self, asset_id: &str) -> Result<String, String>;
}

pub struct HttpAssetResolver {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SignedUrlResponse {
    url: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl HttpAssetResolver {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl AssetResolver for HttpAssetResolver {
    async fn resolve(&self, asset_id: &str) -> Result<String, String> {
        let url = format!(
            "{}/api/assets/{}/signed-url",
            self.base_url.trim_end_matches('/'),
            asset_id
        );

        let mut request = self.client.get(&url);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Asset service error: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("Asset service error ({}): {}", status, error_text));
        }

        let signed: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse asset service response: {}", e))?;

        tracing::debug!(
            "Resolved asset {} (expires in {:?}s)",
            asset_id,
            signed.expires_in
        );
        Ok(signed.url)
    }
}
