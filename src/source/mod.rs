//! Listing source collaborator.
//!
//! The pipeline only needs `fetch(query) -> postings` and a `close()` that
//! releases whatever session the source holds. `JsonFeedSource` reads a JSON
//! array of listings from an HTTP endpoint or a local file.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::Posting;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};

#[async_trait]
pub trait PostingSource: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<Vec<Posting>>;

    /// Releases the session opened by `fetch`. Safe to call more than once;
    /// a later `fetch` opens a new session.
    async fn close(&self) -> Result<()>;
}

/// One listing as it appears in the feed. Field names follow the scraper
/// output (`company`, `posted_date`) as well as the canonical names.
#[derive(Debug, Deserialize)]
struct FeedRecord {
    title: Option<String>,
    #[serde(alias = "company")]
    organization: Option<String>,
    location: Option<String>,
    url: Option<String>,
    #[serde(alias = "posted_date")]
    posted_at: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "N/A")
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl FeedRecord {
    fn into_posting(self, observed_at: DateTime<Utc>) -> Option<Posting> {
        let title = present(self.title)?;
        let organization = present(self.organization)?;
        let posted_at = present(self.posted_at).and_then(|raw| {
            let parsed = parse_timestamp(&raw);
            if parsed.is_none() {
                tracing::debug!(target: "listing_source", "Ignoring unparseable posted date '{}'", raw);
            }
            parsed
        });
        Some(Posting {
            title,
            organization,
            location: present(self.location).unwrap_or_default(),
            url: present(self.url).unwrap_or_default(),
            posted_at,
            observed_at,
        })
    }
}

pub struct JsonFeedSource {
    client: Client,
    max_postings: usize,
    open: AtomicBool,
}

impl JsonFeedSource {
    pub fn new(client: Client, max_postings: usize) -> Self {
        Self {
            client,
            max_postings,
            open: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Initialization(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(client, config.max_postings_per_run))
    }

    async fn read_feed(&self, query: &str) -> Result<String> {
        if query.starts_with("http://") || query.starts_with("https://") {
            tracing::debug!(target: "listing_source", "Fetching listings from {}", query);
            let response = self
                .client
                .get(query)
                .send()
                .await
                .map_err(|e| AppError::Fetch(format!("GET {} failed: {}", query, e)))?;
            let status = response.status();
            if !status.is_success() {
                return Err(AppError::Fetch(format!("GET {} returned {}", query, status)));
            }
            response
                .text()
                .await
                .map_err(|e| AppError::Fetch(format!("Reading body from {} failed: {}", query, e)))
        } else {
            tracing::debug!(target: "listing_source", "Reading listings from file {}", query);
            tokio::fs::read_to_string(query)
                .await
                .map_err(|e| AppError::Fetch(format!("Cannot read listings file '{}': {}", query, e)))
        }
    }

    pub(crate) fn parse_feed(&self, body: &str) -> Result<Vec<Posting>> {
        let records: Vec<FeedRecord> = serde_json::from_str(body)
            .map_err(|e| AppError::Fetch(format!("Listing feed is not a JSON array of postings: {}", e)))?;
        let observed_at = Utc::now();
        let total = records.len();

        let postings: Vec<Posting> = records
            .into_iter()
            .enumerate()
            .filter_map(|(i, record)| {
                let posting = record.into_posting(observed_at);
                if posting.is_none() {
                    tracing::warn!(target: "listing_source",
                        "Skipping listing #{}: missing title or organization", i + 1);
                }
                posting
            })
            .take(self.max_postings)
            .collect();

        if total > postings.len() {
            tracing::info!(target: "listing_source",
                "Kept {} of {} listings (limit {})", postings.len(), total, self.max_postings);
        }
        Ok(postings)
    }
}

#[async_trait]
impl PostingSource for JsonFeedSource {
    async fn fetch(&self, query: &str) -> Result<Vec<Posting>> {
        if !self.open.swap(true, Ordering::SeqCst) {
            tracing::debug!(target: "listing_source", "Listing source session opened.");
        }
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Fetch("no listing query configured".to_string()));
        }
        let body = self.read_feed(query).await?;
        let postings = self.parse_feed(&body)?;
        tracing::info!(target: "listing_source", "Fetched {} postings", postings.len());
        Ok(postings)
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::debug!(target: "listing_source", "Listing source closed.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"[
        {"title": "Backend Engineer", "company": "Acme, Inc.", "location": "Berlin",
         "url": "https://jobs.example.com/1", "posted_date": "2024-03-01"},
        {"title": "N/A", "company": "Ghost"},
        {"title": "Designer", "organization": "Globex", "location": "N/A",
         "posted_at": "2024-03-02T10:00:00Z"},
        {"title": "SRE", "company": "Initech"}
    ]"#;

    #[test]
    fn test_parse_feed_handles_aliases_and_missing_values() {
        let source = JsonFeedSource::new(Client::new(), 50);
        let postings = source.parse_feed(FEED).unwrap();
        assert_eq!(postings.len(), 3);
        assert_eq!(postings[0].organization, "Acme, Inc.");
        assert_eq!(
            postings[0].posted_at.map(|d| d.to_rfc3339()),
            Some("2024-03-01T00:00:00+00:00".to_string())
        );
        assert_eq!(postings[1].title, "Designer");
        assert_eq!(postings[1].location, "");
        assert!(postings[1].posted_at.is_some());
        assert!(postings[2].posted_at.is_none());
    }

    #[test]
    fn test_parse_feed_caps_results() {
        let source = JsonFeedSource::new(Client::new(), 2);
        assert_eq!(source.parse_feed(FEED).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_feed_rejects_non_array() {
        let source = JsonFeedSource::new(Client::new(), 10);
        assert!(matches!(source.parse_feed("{\"a\": 1}"), Err(AppError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_fetch_from_file_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, FEED).unwrap();

        let source = JsonFeedSource::new(Client::new(), 50);
        let postings = source.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(postings.len(), 3);

        source.close().await.unwrap();
        source.close().await.unwrap();
        assert_eq!(source.fetch(path.to_str().unwrap()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let source = JsonFeedSource::new(Client::new(), 50);
        assert!(matches!(
            source.fetch("/definitely/not/here.json").await,
            Err(AppError::Fetch(_))
        ));
    }
}
