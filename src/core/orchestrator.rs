//! One pipeline run: fetch, drop known keys, resolve, drop unresolved, dispatch.

use crate::core::dispatch::DispatchEngine;
use crate::core::models::{EnrichedPosting, Posting, PostingKey};
use crate::core::resolver::ContactResolver;
use crate::source::PostingSource;
use crate::store::{AuditExporter, DedupStore};
use crate::utils::template::MessageTemplate;

use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    Fetching,
    FilteringDuplicates,
    ResolvingContacts,
    FilteringResolved,
    Dispatching,
    Done,
}

/// Why a run ended. Only `Completed` reaches the dispatch stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Completed,
    NoPostings,
    NoNewPostings,
    NoResolvedPostings,
    FetchFailed,
    /// Shutdown was requested; every completed send is recorded.
    Interrupted,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub exit: RunExit,
    pub fetched: usize,
    pub new_postings: usize,
    pub resolved: usize,
    pub sent: usize,
    pub failed: usize,
}

impl RunSummary {
    fn started() -> Self {
        Self {
            exit: RunExit::Aborted,
            fetched: 0,
            new_postings: 0,
            resolved: 0,
            sent: 0,
            failed: 0,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: fetched={} new={} resolved={} sent={} failed={}",
            self.exit, self.fetched, self.new_postings, self.resolved, self.sent, self.failed
        )
    }
}

/// Keeps postings whose key is not in `store`, collapsing repeated keys
/// within the batch to their first occurrence.
pub fn filter_new_postings(store: &dyn DedupStore, postings: Vec<Posting>) -> Vec<Posting> {
    let total = postings.len();
    let mut seen: HashSet<PostingKey> = HashSet::new();
    let fresh: Vec<Posting> = postings
        .into_iter()
        .filter(|p| {
            let key = p.key();
            !store.contains(&key) && seen.insert(key)
        })
        .collect();
    tracing::info!(target: "pipeline", "Filtered {} new jobs from {} total jobs", fresh.len(), total);
    fresh
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct PipelineOrchestrator {
    query: String,
    source: Arc<dyn PostingSource>,
    resolver: ContactResolver,
    engine: DispatchEngine,
    store: Box<dyn DedupStore>,
    exporter: AuditExporter,
    template: MessageTemplate,
    stage: RunStage,
    shutdown: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(
        query: impl Into<String>,
        source: Arc<dyn PostingSource>,
        resolver: ContactResolver,
        engine: DispatchEngine,
        store: Box<dyn DedupStore>,
        exporter: AuditExporter,
        template: MessageTemplate,
    ) -> Self {
        Self {
            query: query.into(),
            source,
            resolver,
            engine,
            store,
            exporter,
            template,
            stage: RunStage::Idle,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn store(&self) -> &dyn DedupStore {
        self.store.as_ref()
    }

    pub fn resolver_mut(&mut self) -> &mut ContactResolver {
        &mut self.resolver
    }

    /// Token that asks the current and any later run to stop.
    ///
    /// Cancelling it never drops a send in flight: the run finishes that
    /// delivery, records it, and returns [`RunExit::Interrupted`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Executes one run. Never returns an error and never panics: failures
    /// are logged and reflected in [`RunSummary::exit`]. The source is closed
    /// before returning on every path.
    pub async fn run(&mut self) -> RunSummary {
        tracing::info!(target: "pipeline", "Starting job application run");
        self.stage = RunStage::Idle;
        self.resolver.clear_cache();

        let mut summary = RunSummary::started();
        let outcome = AssertUnwindSafe(self.execute(&mut summary))
            .catch_unwind()
            .await;

        summary.exit = match outcome {
            Ok(exit) => exit,
            Err(payload) => {
                tracing::error!(target: "pipeline",
                    "Run aborted in stage {:?}: {}", self.stage, panic_message(payload.as_ref()));
                RunExit::Aborted
            }
        };

        self.close_source().await;
        self.stage = RunStage::Done;
        tracing::info!(target: "pipeline", "Run finished ({})", summary);
        summary
    }

    async fn execute(&mut self, summary: &mut RunSummary) -> RunExit {
        let shutdown = self.shutdown.clone();
        if shutdown.is_cancelled() {
            return RunExit::Interrupted;
        }

        self.stage = RunStage::Fetching;
        let fetched = tokio::select! {
            fetched = self.source.fetch(&self.query) => fetched,
            _ = shutdown.cancelled() => return RunExit::Interrupted,
        };
        let postings = match fetched {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(target: "pipeline", "Fetching postings failed: {}", e);
                return RunExit::FetchFailed;
            }
        };
        summary.fetched = postings.len();
        if postings.is_empty() {
            tracing::warn!(target: "pipeline", "No jobs found");
            return RunExit::NoPostings;
        }
        if let Err(e) = self.exporter.export_raw(&postings) {
            tracing::error!(target: "pipeline", "Could not export raw postings: {}", e);
        }

        self.stage = RunStage::FilteringDuplicates;
        let fresh = filter_new_postings(self.store.as_ref(), postings);
        summary.new_postings = fresh.len();
        if fresh.is_empty() {
            tracing::info!(target: "pipeline", "No new jobs to process");
            return RunExit::NoNewPostings;
        }

        self.stage = RunStage::ResolvingContacts;
        let enriched = tokio::select! {
            enriched = self.resolver.enrich_all(fresh) => enriched,
            _ = shutdown.cancelled() => return RunExit::Interrupted,
        };
        if let Err(e) = self.exporter.export_enriched(&enriched) {
            tracing::error!(target: "pipeline", "Could not export enriched postings: {}", e);
        }

        self.stage = RunStage::FilteringResolved;
        let dispatchable: Vec<EnrichedPosting> =
            enriched.into_iter().filter(|e| e.is_dispatchable()).collect();
        summary.resolved = dispatchable.len();
        if dispatchable.is_empty() {
            tracing::warn!(target: "pipeline", "No jobs with valid contact emails found");
            return RunExit::NoResolvedPostings;
        }

        self.stage = RunStage::Dispatching;
        let result = self
            .engine
            .dispatch_all(&dispatchable, &self.template, self.store.as_mut(), &shutdown)
            .await;
        summary.sent = result.sent;
        summary.failed = result.failed;
        if result.interrupted {
            RunExit::Interrupted
        } else {
            RunExit::Completed
        }
    }

    async fn close_source(&self) {
        if let Err(e) = self.source.close().await {
            tracing::warn!(target: "pipeline", "Closing listing source failed: {}", e);
        }
    }

    /// Releases collaborators. Safe to call repeatedly and after an
    /// interrupted run.
    pub async fn shutdown(&mut self) {
        tracing::info!(target: "pipeline", "Shutting down pipeline");
        self.close_source().await;
        self.stage = RunStage::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigBuilder;
    use crate::core::models::DispatchRecord;
    use crate::store::MemoryDedupStore;
    use crate::testing::{posting, RecordingTransport, ScriptedDns, SourceScript, StaticSource};

    struct Harness {
        source: Arc<StaticSource>,
        transport: Arc<RecordingTransport>,
        orchestrator: PipelineOrchestrator,
    }

    fn harness(script: SourceScript, dns: ScriptedDns, store: MemoryDedupStore) -> Harness {
        let config = ConfigBuilder::for_tests();
        let source = Arc::new(StaticSource::new(script));
        let transport = Arc::new(RecordingTransport::new());
        let orchestrator = PipelineOrchestrator::new(
            "jobs.json",
            source.clone(),
            ContactResolver::new(&config, Arc::new(dns), None),
            DispatchEngine::new(&config, transport.clone()),
            Box::new(store),
            AuditExporter::disabled(),
            config.template().unwrap(),
        );
        Harness {
            source,
            transport,
            orchestrator,
        }
    }

    #[test]
    fn test_filter_new_postings() {
        let mut store = MemoryDedupStore::new();
        store
            .record(&DispatchRecord::sent(&posting("Acme", "Engineer"), "hr@acme.com"))
            .unwrap();
        let fresh = filter_new_postings(
            &store,
            vec![
                posting("Acme", "Engineer"),
                posting("Acme", "Manager"),
                posting("Acme", "Manager"),
            ],
        );
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].key(), PostingKey::new("Acme", "Manager"));
    }

    #[tokio::test]
    async fn test_full_run_then_idempotent_rerun() {
        let postings = vec![posting("Acme", "Engineer"), posting("Globex", "Designer")];
        let dns = ScriptedDns::new().with_mx("acme.com").with_mx("globex.com");
        let mut h = harness(SourceScript::Postings(postings), dns, MemoryDedupStore::new());

        let first = h.orchestrator.run().await;
        assert_eq!(first.exit, RunExit::Completed);
        assert_eq!((first.fetched, first.new_postings, first.resolved), (2, 2, 2));
        assert_eq!(first.sent, 2);

        let second = h.orchestrator.run().await;
        assert_eq!(second.exit, RunExit::NoNewPostings);
        assert_eq!(h.transport.sent().len(), 2);
        assert_eq!(h.source.closes(), 2);
        assert_eq!(h.orchestrator.stage(), RunStage::Done);
    }

    #[tokio::test]
    async fn test_short_circuit_exits() {
        let mut empty = harness(
            SourceScript::Postings(Vec::new()),
            ScriptedDns::new(),
            MemoryDedupStore::new(),
        );
        assert_eq!(empty.orchestrator.run().await.exit, RunExit::NoPostings);

        let mut unresolved = harness(
            SourceScript::Postings(vec![posting("Nowhere", "Engineer")]),
            ScriptedDns::new(),
            MemoryDedupStore::new(),
        );
        let summary = unresolved.orchestrator.run().await;
        assert_eq!(summary.exit, RunExit::NoResolvedPostings);
        assert_eq!(unresolved.transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_and_panic_are_contained() {
        let mut failing = harness(SourceScript::Error, ScriptedDns::new(), MemoryDedupStore::new());
        assert_eq!(failing.orchestrator.run().await.exit, RunExit::FetchFailed);
        assert_eq!(failing.source.closes(), 1);

        let mut panicking = harness(SourceScript::Panic, ScriptedDns::new(), MemoryDedupStore::new());
        let summary = panicking.orchestrator.run().await;
        assert_eq!(summary.exit, RunExit::Aborted);
        assert_eq!(panicking.source.closes(), 1);

        panicking.orchestrator.shutdown().await;
        assert_eq!(panicking.source.closes(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_ends_run_before_fetch() {
        let postings = vec![posting("Acme", "Engineer")];
        let dns = ScriptedDns::new().with_mx("acme.com");
        let mut h = harness(SourceScript::Postings(postings), dns, MemoryDedupStore::new());
        h.orchestrator.shutdown_token().cancel();

        let summary = h.orchestrator.run().await;
        assert_eq!(summary.exit, RunExit::Interrupted);
        assert_eq!(summary.fetched, 0);
        assert_eq!(h.transport.attempts(), 0);
        assert_eq!(h.source.closes(), 1);
    }
}
