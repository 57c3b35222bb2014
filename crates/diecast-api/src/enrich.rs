use std::time::Duration;

use serde_json::json;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the external text-generation lookup that fills the "more info"
/// panel on a car's detail view.
///
/// Enrichment is strictly best-effort: missing configuration or an upstream
/// failure degrades to a human-readable fallback string, never an error, so
/// it can never block or fail the primary flow.
pub struct EnrichClient {
    http: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl EnrichClient {
    pub fn new(api_url: Option<String>, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_url,
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }

    /// Descriptive text for a car name. Always returns a string.
    pub async fn describe(&self, name: &str) -> String {
        let (Some(url), Some(key)) = (self.api_url.as_deref(), self.api_key.as_deref()) else {
            return "Enrichment lookup is not configured.".to_string();
        };

        let payload = json!({
            "prompt": format!("Tell me about the diecast model car '{}'.", name),
            "max_tokens": 400,
        });

        let result = self
            .http
            .post(url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await;

        let response = match result.and_then(|r| r.error_for_status()) {
            Ok(r) => r,
            Err(e) => {
                warn!("Enrichment lookup for '{}' failed: {}", name, e);
                return format!("Lookup failed: {}", e);
            }
        };

        match response.json::<serde_json::Value>().await {
            Ok(body) => extract_text(&body),
            Err(e) => {
                warn!("Enrichment response for '{}' was not JSON: {}", name, e);
                format!("Lookup failed: {}", e)
            }
        }
    }
}

/// Providers disagree on the response shape; try the common keys before
/// falling back to the raw body.
fn extract_text(body: &serde_json::Value) -> String {
    body.get("text")
        .or_else(|| body.get("output"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_client_returns_fallback_text() {
        let client = EnrichClient::new(None, None);
        assert!(!client.is_configured());

        let info = client.describe("Mustang").await;
        assert_eq!(info, "Enrichment lookup is not configured.");
    }

    #[tokio::test]
    async fn url_without_key_still_counts_as_unconfigured() {
        let client = EnrichClient::new(Some("http://localhost:9".into()), None);
        let info = client.describe("Mustang").await;
        assert_eq!(info, "Enrichment lookup is not configured.");
    }

    #[test]
    fn extract_text_tries_common_keys() {
        assert_eq!(extract_text(&json!({ "text": "a classic" })), "a classic");
        assert_eq!(extract_text(&json!({ "output": "a racer" })), "a racer");
        assert_eq!(extract_text(&json!({ "other": 1 })), r#"{"other":1}"#);
    }
}
