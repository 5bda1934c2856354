//! Records that flow through one pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single job listing as produced by the listing source. Never mutated after fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub title: String,
    pub organization: String,
    pub location: String,
    pub url: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

impl Posting {
    /// Deduplication identity: exact, case-sensitive (organization, title).
    pub fn key(&self) -> PostingKey {
        PostingKey::new(&self.organization, &self.title)
    }
}

/// The (organization, title) pair identifying one opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostingKey {
    pub organization: String,
    pub title: String,
}

impl PostingKey {
    pub fn new(organization: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            title: title.into(),
        }
    }
}

impl fmt::Display for PostingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.organization, self.title)
    }
}

/// A synthesized contact address. Lower rank is preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCandidate {
    pub address: String,
    pub rank: usize,
    /// Set only when an external identity check positively confirmed the address.
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Resolved,
    Unresolved,
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStatus::Resolved => write!(f, "RESOLVED"),
            ResolutionStatus::Unresolved => write!(f, "UNRESOLVED"),
        }
    }
}

/// What the resolver learned about one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactResolution {
    pub domain: Option<String>,
    pub candidates: Vec<ContactCandidate>,
    pub status: ResolutionStatus,
}

impl ContactResolution {
    pub fn unresolved() -> Self {
        Self {
            domain: None,
            candidates: Vec::new(),
            status: ResolutionStatus::Unresolved,
        }
    }

    pub fn resolved(domain: String, candidates: Vec<ContactCandidate>) -> Self {
        if candidates.is_empty() {
            return Self::unresolved();
        }
        Self {
            domain: Some(domain),
            candidates,
            status: ResolutionStatus::Resolved,
        }
    }
}

/// A posting together with the outcome of contact resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedPosting {
    pub posting: Posting,
    pub domain: Option<String>,
    pub candidates: Vec<ContactCandidate>,
    pub resolution_status: ResolutionStatus,
}

impl EnrichedPosting {
    pub fn new(posting: Posting, resolution: ContactResolution) -> Self {
        Self {
            posting,
            domain: resolution.domain,
            candidates: resolution.candidates,
            resolution_status: resolution.status,
        }
    }

    pub fn is_dispatchable(&self) -> bool {
        self.resolution_status == ResolutionStatus::Resolved && !self.candidates.is_empty()
    }

    /// The lowest-ranked candidate, regardless of the order the list is stored in.
    pub fn primary_candidate(&self) -> Option<&ContactCandidate> {
        self.candidates.iter().min_by_key(|c| c.rank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchOutcome {
    Sent,
    Failed,
}

/// One delivery attempt. Only `Sent` records are persisted to the SentLog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub organization: String,
    pub title: String,
    pub address: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub outcome: DispatchOutcome,
    pub reason: Option<String>,
}

impl DispatchRecord {
    pub fn sent(posting: &Posting, address: &str) -> Self {
        Self {
            organization: posting.organization.clone(),
            title: posting.title.clone(),
            address: Some(address.to_string()),
            sent_at: Utc::now(),
            outcome: DispatchOutcome::Sent,
            reason: None,
        }
    }

    pub fn failed(posting: &Posting, address: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            organization: posting.organization.clone(),
            title: posting.title.clone(),
            address: address.map(str::to_string),
            sent_at: Utc::now(),
            outcome: DispatchOutcome::Failed,
            reason: Some(reason.into()),
        }
    }

    pub fn key(&self) -> PostingKey {
        PostingKey::new(&self.organization, &self.title)
    }

    pub fn is_sent(&self) -> bool {
        self.outcome == DispatchOutcome::Sent
    }
}

/// Structured identity data returned by a verification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub full_name: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// File attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// A fully rendered message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MessageAttachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(org: &str, title: &str) -> Posting {
        Posting {
            title: title.to_string(),
            organization: org.to_string(),
            location: "Remote".to_string(),
            url: "https://example.com/jobs/1".to_string(),
            posted_at: None,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_key_is_case_sensitive() {
        assert_ne!(posting("Acme", "Engineer").key(), posting("acme", "Engineer").key());
        assert_eq!(posting("Acme", "Engineer").key(), PostingKey::new("Acme", "Engineer"));
    }

    #[test]
    fn test_primary_candidate_uses_rank_not_position() {
        let enriched = EnrichedPosting {
            posting: posting("Acme", "Engineer"),
            domain: Some("acme.com".to_string()),
            candidates: vec![
                ContactCandidate {
                    address: "jobs@acme.com".to_string(),
                    rank: 2,
                    verified: false,
                },
                ContactCandidate {
                    address: "hr@acme.com".to_string(),
                    rank: 0,
                    verified: false,
                },
            ],
            resolution_status: ResolutionStatus::Resolved,
        };
        assert_eq!(enriched.primary_candidate().unwrap().address, "hr@acme.com");
        assert!(enriched.is_dispatchable());
    }

    #[test]
    fn test_resolved_without_candidates_degrades_to_unresolved() {
        let res = ContactResolution::resolved("acme.com".to_string(), Vec::new());
        assert_eq!(res.status, ResolutionStatus::Unresolved);
        assert!(res.domain.is_none());
    }
}
