//! Scripted collaborators shared by the unit tests.

use crate::core::error::{AppError, Result};
use crate::core::models::{IdentityRecord, OutboundMessage, Posting};
use crate::source::PostingSource;
use crate::utils::dns::{DnsChecker, RecordKind};
use crate::utils::smtp::MessageTransport;
use crate::verification::IdentityVerifier;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) fn posting(org: &str, title: &str) -> Posting {
    Posting {
        title: title.to_string(),
        organization: org.to_string(),
        location: "Remote".to_string(),
        url: format!("https://jobs.example.com/{}", title.to_lowercase().replace(' ', "-")),
        posted_at: None,
        observed_at: Utc::now(),
    }
}

#[derive(Default)]
pub(crate) struct ScriptedDns {
    mx: HashSet<String>,
    a: HashSet<String>,
    mx_errors: HashSet<String>,
    a_errors: HashSet<String>,
    lookups: Mutex<Vec<(String, RecordKind)>>,
}

impl ScriptedDns {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_mx(mut self, domain: &str) -> Self {
        self.mx.insert(domain.to_string());
        self
    }

    pub(crate) fn with_a(mut self, domain: &str) -> Self {
        self.a.insert(domain.to_string());
        self
    }

    pub(crate) fn failing_mx(mut self, domain: &str) -> Self {
        self.mx_errors.insert(domain.to_string());
        self
    }

    /// Both lookups for `domain` fail.
    pub(crate) fn failing(mut self, domain: &str) -> Self {
        self.mx_errors.insert(domain.to_string());
        self.a_errors.insert(domain.to_string());
        self
    }

    pub(crate) fn lookups(&self) -> Vec<(String, RecordKind)> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsChecker for ScriptedDns {
    async fn exists(&self, domain: &str, kind: RecordKind) -> Result<bool> {
        self.lookups.lock().unwrap().push((domain.to_string(), kind));
        let (records, errors) = match kind {
            RecordKind::Mx => (&self.mx, &self.mx_errors),
            RecordKind::A => (&self.a, &self.a_errors),
        };
        if errors.contains(domain) {
            return Err(AppError::Dns(format!("scripted {:?} failure for {}", kind, domain)));
        }
        Ok(records.contains(domain))
    }
}

#[derive(Default)]
pub(crate) struct ScriptedVerifier {
    known: HashSet<String>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedVerifier {
    pub(crate) fn knowing(addresses: &[&str]) -> Self {
        Self {
            known: addresses.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityVerifier for ScriptedVerifier {
    async fn verify(&self, address: &str) -> Result<Option<IdentityRecord>> {
        self.calls.lock().unwrap().push(address.to_string());
        if self.fail {
            return Err(AppError::Verification("scripted outage".to_string()));
        }
        Ok(self.known.contains(address).then(|| IdentityRecord {
            full_name: Some("Pat Recruiter".to_string()),
            title: None,
            raw: serde_json::Value::Null,
        }))
    }
}

#[derive(Default)]
pub(crate) struct RecordingTransport {
    rejected: HashSet<String>,
    sent: Mutex<Vec<OutboundMessage>>,
    attempts: AtomicUsize,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rejecting(addresses: &[&str]) -> Self {
        Self {
            rejected: addresses.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.rejected.contains(&message.recipient) {
            return Err(AppError::Transport(format!(
                "Recipient rejected: {}",
                message.recipient
            )));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) enum SourceScript {
    Postings(Vec<Posting>),
    Error,
    Panic,
}

pub(crate) struct StaticSource {
    script: SourceScript,
    pub(crate) closes: AtomicUsize,
}

impl StaticSource {
    pub(crate) fn new(script: SourceScript) -> Self {
        Self {
            script,
            closes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostingSource for StaticSource {
    async fn fetch(&self, _query: &str) -> Result<Vec<Posting>> {
        match &self.script {
            SourceScript::Postings(p) => Ok(p.clone()),
            SourceScript::Error => Err(AppError::Fetch("listing site unreachable".to_string())),
            SourceScript::Panic => panic!("scripted source panic"),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
