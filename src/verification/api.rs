//! Person lookup over an HTTP API keyed by email address.

use super::IdentityVerifier;
use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::IdentityRecord;

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Queries `GET {base_url}/{address}` with a bearer token.
///
/// A 200 response with a JSON body is a positive identification. Any other
/// status, a timeout, or an unparseable body is treated as "no information"
/// (`Ok(None)`), so a flaky service never fails contact resolution.
pub struct PersonLookupApi {
    client: Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl PersonLookupApi {
    pub fn new(client: Client, base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Builds the client from configuration. Returns `Ok(None)` when no API
    /// key is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let key = match config.verification_api_key.as_ref() {
            Some(k) if !k.is_empty() => k.expose().to_string(),
            _ => {
                tracing::info!(target: "verification_api",
                    "No verification API key configured; candidates stay unverified.");
                return Ok(None);
            }
        };
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Initialization(format!("Failed to build HTTP client: {}", e)))?;
        Self::new(client, &config.verification_api_url, key, config.request_timeout).map(Some)
    }

    fn lookup_url(&self, address: &str) -> Result<Url> {
        Ok(self.base_url.join(address)?)
    }
}

fn identity_from_json(raw: serde_json::Value) -> IdentityRecord {
    let full_name = raw
        .pointer("/name/fullName")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let title = raw
        .pointer("/employment/title")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    IdentityRecord {
        full_name,
        title,
        raw,
    }
}

#[async_trait]
impl IdentityVerifier for PersonLookupApi {
    async fn verify(&self, address: &str) -> Result<Option<IdentityRecord>> {
        let task_label = format!("[Person lookup: {}]", address);
        let url = self.lookup_url(address)?;
        tracing::debug!(target: "verification_api", "{} Sending GET request", task_label);

        let response = match self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!(target: "verification_api", "{} Request timed out: {}", task_label, e);
                } else {
                    tracing::warn!(target: "verification_api", "{} Request failed: {}", task_label, e);
                }
                return Ok(None);
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::info!(target: "verification_api", "{} Status {} is inconclusive.", task_label, status);
            return Ok(None);
        }

        match response.json::<serde_json::Value>().await {
            Ok(raw) => {
                let record = identity_from_json(raw);
                tracing::info!(target: "verification_api",
                    "{} Identity confirmed (name: {})",
                    task_label,
                    record.full_name.as_deref().unwrap_or("N/A"));
                Ok(Some(record))
            }
            Err(e) => {
                tracing::warn!(target: "verification_api", "{} Unreadable response body: {}", task_label, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Secret;

    #[test]
    fn test_lookup_url_appends_address() {
        let api = PersonLookupApi::new(
            Client::new(),
            "https://person.clearbit.com/v1/people/email",
            "k",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            api.lookup_url("hr@acme.com").unwrap().as_str(),
            "https://person.clearbit.com/v1/people/email/hr@acme.com"
        );
    }

    #[test]
    fn test_from_config_without_key_is_none() {
        assert!(PersonLookupApi::from_config(&Config::default()).unwrap().is_none());
        let config = Config {
            verification_api_key: Some(Secret::new("  ")),
            ..Config::default()
        };
        assert!(PersonLookupApi::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_identity_from_json() {
        let record = identity_from_json(serde_json::json!({
            "name": {"fullName": "Ada Lovelace"},
            "employment": {"title": "Head of Talent"}
        }));
        assert_eq!(record.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(record.title.as_deref(), Some("Head of Talent"));

        let empty = identity_from_json(serde_json::json!({}));
        assert!(empty.full_name.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_inconclusive() {
        let api = PersonLookupApi::new(
            Client::new(),
            "http://127.0.0.1:9/v1/people/email",
            "k",
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(api.verify("hr@acme.com").await.unwrap().is_none());
    }
}
