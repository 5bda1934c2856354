use async_trait::async_trait;
use chrono::Utc;
use job_outreach_core::{
    filter_new_postings, AppError, AuditExporter, Config, ContactResolver, CsvSentLog,
    DedupStore, DispatchEngine, DispatchOutcome, DnsChecker, EnrichedPosting, MemoryDedupStore,
    MessageTemplate, MessageTransport, OutboundMessage, PipelineOrchestrator, Posting,
    PostingKey, PostingSource, RecordKind, ResolutionStatus, Result, RunExit,
    ContactResolution, DispatchRecord,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn posting(org: &str, title: &str) -> Posting {
    Posting {
        title: title.to_string(),
        organization: org.to_string(),
        location: "Remote".to_string(),
        url: "https://jobs.example.com/1".to_string(),
        posted_at: None,
        observed_at: Utc::now(),
    }
}

fn quiet_config() -> Config {
    Config {
        dry_run: true,
        attachment_path: None,
        raw_postings_path: None,
        enriched_postings_path: None,
        sleep_between_resolutions: (0.0, 0.0),
        sleep_between_dispatches: (0.0, 0.0),
        schedule_enabled: false,
        ..Config::default()
    }
}

struct FakeDns {
    existing: HashSet<String>,
    broken: HashSet<String>,
}

impl FakeDns {
    fn new(existing: &[&str], broken: &[&str]) -> Self {
        Self {
            existing: existing.iter().map(|s| s.to_string()).collect(),
            broken: broken.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DnsChecker for FakeDns {
    async fn exists(&self, domain: &str, kind: RecordKind) -> Result<bool> {
        if self.broken.contains(domain) {
            return Err(AppError::Dns(format!("SERVFAIL for {} ({:?})", domain, kind)));
        }
        Ok(kind == RecordKind::Mx && self.existing.contains(domain))
    }
}

#[derive(Default)]
struct FakeTransport {
    reject: Mutex<HashSet<String>>,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl FakeTransport {
    fn sent_to(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.recipient.clone()).collect()
    }
}

#[async_trait]
impl MessageTransport for FakeTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if self.reject.lock().unwrap().contains(&message.recipient) {
            return Err(AppError::Transport("421 try again later".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}

struct FakeSource {
    postings: Vec<Posting>,
}

#[async_trait]
impl PostingSource for FakeSource {
    async fn fetch(&self, _query: &str) -> Result<Vec<Posting>> {
        Ok(self.postings.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn orchestrator(
    postings: Vec<Posting>,
    dns: FakeDns,
    transport: Arc<dyn MessageTransport>,
    store: Box<dyn DedupStore>,
) -> PipelineOrchestrator {
    let config = quiet_config();
    PipelineOrchestrator::new(
        "feed.json",
        Arc::new(FakeSource { postings }),
        ContactResolver::new(&config, Arc::new(dns), None),
        DispatchEngine::new(&config, transport),
        store,
        AuditExporter::disabled(),
        config.template().unwrap(),
    )
}

fn sent_log_rows(path: &Path) -> Vec<(String, String)> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            (r[0].to_string(), r[1].to_string())
        })
        .collect()
}

#[tokio::test]
async fn second_run_with_same_postings_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("sent_emails.csv");
    let postings = vec![posting("Acme", "Engineer"), posting("Globex", "Designer")];
    let transport = Arc::new(FakeTransport::default());

    for _ in 0..2 {
        let mut run = orchestrator(
            postings.clone(),
            FakeDns::new(&["acme.com", "globex.com"], &[]),
            transport.clone(),
            Box::new(CsvSentLog::open(&log_path)),
        );
        run.run().await;
        run.shutdown().await;
    }

    assert_eq!(transport.sent_to(), vec!["hr@acme.com", "hr@globex.com"]);
    let rows = sent_log_rows(&log_path);
    assert_eq!(rows.len(), 2);
    let unique: HashSet<_> = rows.iter().collect();
    assert_eq!(unique.len(), rows.len());
}

#[tokio::test]
async fn failed_send_stays_eligible_for_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("sent_emails.csv");
    let transport = Arc::new(FakeTransport::default());
    transport.reject.lock().unwrap().insert("hr@acme.com".to_string());

    let mut first = orchestrator(
        vec![posting("Acme", "Engineer")],
        FakeDns::new(&["acme.com"], &[]),
        transport.clone(),
        Box::new(CsvSentLog::open(&log_path)),
    );
    let summary = first.run().await;
    assert_eq!((summary.sent, summary.failed), (0, 1));
    assert!(!log_path.exists());

    transport.reject.lock().unwrap().clear();
    let mut second = orchestrator(
        vec![posting("Acme", "Engineer")],
        FakeDns::new(&["acme.com"], &[]),
        transport.clone(),
        Box::new(CsvSentLog::open(&log_path)),
    );
    let summary = second.run().await;
    assert_eq!(summary.exit, RunExit::Completed);
    assert_eq!(summary.sent, 1);
    assert_eq!(sent_log_rows(&log_path), vec![("Acme".to_string(), "Engineer".to_string())]);
}

#[test]
fn known_key_is_filtered_out() {
    let mut store = MemoryDedupStore::new();
    store
        .record(&DispatchRecord::sent(&posting("Acme", "Engineer"), "hr@acme.com"))
        .unwrap();

    let fresh = filter_new_postings(
        &store,
        vec![posting("Acme", "Engineer"), posting("Acme", "Manager")],
    );
    let keys: Vec<PostingKey> = fresh.iter().map(Posting::key).collect();
    assert_eq!(keys, vec![PostingKey::new("Acme", "Manager")]);
}

#[tokio::test]
async fn com_is_preferred_and_hr_ranks_first() {
    let config = quiet_config();
    let mut resolver = ContactResolver::new(
        &config,
        Arc::new(FakeDns::new(&["acme.io", "acme.com"], &[])),
        None,
    );
    let resolution = resolver.resolve("Acme").await;
    assert_eq!(resolution.domain.as_deref(), Some("acme.com"));
    assert_eq!(resolution.candidates[0].address, "hr@acme.com");
    assert_eq!(resolution.candidates[0].rank, 0);
    assert!(resolution
        .candidates
        .windows(2)
        .all(|w| w[0].rank < w[1].rank));
}

#[tokio::test]
async fn dns_failure_for_one_organization_does_not_stop_the_run() {
    let transport = Arc::new(FakeTransport::default());
    let mut run = orchestrator(
        vec![
            posting("Acme", "Engineer"),
            posting("Broken", "Engineer"),
            posting("Globex", "Engineer"),
        ],
        FakeDns::new(&["acme.com", "globex.com"], &["broken.com"]),
        transport.clone(),
        Box::new(MemoryDedupStore::new()),
    );

    let summary = run.run().await;
    assert_eq!(summary.exit, RunExit::Completed);
    assert_eq!(summary.new_postings, 3);
    assert_eq!(summary.resolved, 2);
    assert_eq!(transport.sent_to(), vec!["hr@acme.com", "hr@globex.com"]);
}

#[tokio::test]
async fn unresolved_posting_never_reaches_the_transport() {
    let config = quiet_config();
    let transport = Arc::new(FakeTransport::default());
    let engine = DispatchEngine::new(&config, transport.clone());
    let mut store = MemoryDedupStore::new();
    let unresolved = EnrichedPosting::new(posting("Acme", "Engineer"), ContactResolution::unresolved());
    assert_eq!(unresolved.resolution_status, ResolutionStatus::Unresolved);

    let template = MessageTemplate::parse("Application for {job_title}", "Hello {company}").unwrap();
    let record = engine.dispatch(&unresolved, &template, &mut store).await;

    assert_eq!(record.outcome, DispatchOutcome::Failed);
    assert!(transport.sent_to().is_empty());
    assert!(store.is_empty());
}

/// Delivers from a blocking thread, the way the SMTP mailer does.
#[derive(Default)]
struct SlowBlockingTransport {
    delivered: Arc<AtomicUsize>,
}

#[async_trait]
impl MessageTransport for SlowBlockingTransport {
    async fn send(&self, _message: &OutboundMessage) -> Result<()> {
        let delivered = self.delivered.clone();
        tokio::task::spawn_blocking(move || {
            std::thread::sleep(Duration::from_millis(300));
            delivered.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .map_err(|e| AppError::Transport(e.to_string()))
    }

    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn shutdown_during_send_still_records_the_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("sent_emails.csv");
    let transport = Arc::new(SlowBlockingTransport::default());

    let mut run = orchestrator(
        vec![posting("Acme", "Engineer"), posting("Globex", "Engineer")],
        FakeDns::new(&["acme.com", "globex.com"], &[]),
        transport.clone(),
        Box::new(CsvSentLog::open(&log_path)),
    );
    let shutdown = run.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
    });

    let summary = run.run().await;
    run.shutdown().await;

    assert_eq!(summary.exit, RunExit::Interrupted);
    assert_eq!(transport.delivered.load(Ordering::SeqCst), 1);
    let reopened = CsvSentLog::open(&log_path);
    assert!(reopened.contains(&PostingKey::new("Acme", "Engineer")));
    assert!(!reopened.contains(&PostingKey::new("Globex", "Engineer")));
}
