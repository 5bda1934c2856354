//! # Job Outreach Core Library
//!
//! Discovers job postings, skips the ones already contacted, infers a contact
//! address for each posting's organization, and sends one paced application
//! email per (organization, title) pair.
//!
//! It is designed to be used either directly as a library or via the
//! `job-outreach` command-line tool (which uses this library).

mod core;
mod source;
mod store;
mod utils;
mod verification;

#[cfg(test)]
mod testing;

pub use crate::core::config::{
    get_random_sleep_duration, Config, ConfigBuilder, ConfigFile, Secret, SuffixStripping,
};
pub use crate::core::dispatch::{DispatchEngine, DispatchSummary, REASON_ALREADY_SENT, REASON_NO_ADDRESS};
pub use crate::core::error::{AppError, Result};
pub use crate::core::models::{
    ContactCandidate, ContactResolution, DispatchOutcome, DispatchRecord, EnrichedPosting,
    IdentityRecord, MessageAttachment, OutboundMessage, Posting, PostingKey, ResolutionStatus,
};
pub use crate::core::orchestrator::{
    filter_new_postings, PipelineOrchestrator, RunExit, RunStage, RunSummary,
};
pub use crate::core::resolver::ContactResolver;
pub use crate::source::{JsonFeedSource, PostingSource};
pub use crate::store::{AuditExporter, CsvSentLog, DedupStore, MemoryDedupStore};
pub use crate::utils::dns::{create_resolver, DnsChecker, RecordKind, ResolverDnsChecker};
pub use crate::utils::smtp::{DryRunTransport, MessageTransport, SmtpMailer};
pub use crate::utils::template::{MessageTemplate, RenderedMessage, PLACEHOLDERS};
pub use crate::verification::{IdentityVerifier, PersonLookupApi};

use std::sync::Arc;

/// Wires the concrete collaborators described by `config` into a ready
/// orchestrator.
///
/// In dry-run mode messages are logged instead of sent, and the sent log is
/// read but never written: an in-memory store is seeded from it.
pub fn build_orchestrator(config: &Config) -> Result<PipelineOrchestrator> {
    let template = config.template()?;

    let source: Arc<dyn PostingSource> = Arc::new(JsonFeedSource::from_config(config)?);

    let dns: Arc<dyn DnsChecker> = Arc::new(ResolverDnsChecker::new(create_resolver(config)?));
    let verifier = PersonLookupApi::from_config(config)?
        .map(|api| Arc::new(api) as Arc<dyn IdentityVerifier>);
    let resolver = ContactResolver::new(config, dns, verifier);

    let transport: Arc<dyn MessageTransport> = if config.dry_run {
        tracing::info!("Dry-run mode: messages will be logged, not sent.");
        Arc::new(DryRunTransport::new())
    } else {
        Arc::new(SmtpMailer::new(config)?)
    };
    let engine = DispatchEngine::new(config, transport);

    let sent_log = CsvSentLog::open(&config.sent_log_path);
    let store: Box<dyn DedupStore> = if config.dry_run {
        Box::new(MemoryDedupStore::with_keys(sent_log.keys().cloned()))
    } else {
        Box::new(sent_log)
    };

    let exporter = AuditExporter::new(
        config.raw_postings_path.clone(),
        config.enriched_postings_path.clone(),
    );

    let query = config
        .search_query
        .clone()
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| AppError::Config("No listing query configured.".to_string()))?;

    Ok(PipelineOrchestrator::new(
        query, source, resolver, engine, store, exporter, template,
    ))
}

/// Performs an early check that the configured SMTP relay accepts our login.
pub async fn check_smtp_connectivity(config: &Config) -> Result<()> {
    crate::utils::smtp::test_smtp_connectivity(config).await
}
