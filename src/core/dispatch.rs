//! Sends one message per resolved posting, paced and recorded.

use crate::core::config::{get_random_sleep_duration, Config};
use crate::core::models::{
    DispatchRecord, EnrichedPosting, MessageAttachment, OutboundMessage,
};
use crate::store::DedupStore;
use crate::utils::smtp::MessageTransport;
use crate::utils::template::MessageTemplate;

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const REASON_NO_ADDRESS: &str = "no address";
pub const REASON_ALREADY_SENT: &str = "already sent";

/// Totals for one `dispatch_all` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub records: Vec<DispatchRecord>,
    /// Set when shutdown stopped the batch before every posting was tried.
    pub interrupted: bool,
}

pub struct DispatchEngine {
    transport: Arc<dyn MessageTransport>,
    attachment_path: Option<PathBuf>,
    pause_bounds: (f32, f32),
}

impl DispatchEngine {
    pub fn new(config: &Config, transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            transport,
            attachment_path: config.attachment_path.clone(),
            pause_bounds: config.sleep_between_dispatches,
        }
    }

    async fn load_attachment(&self) -> Option<MessageAttachment> {
        let path = self.attachment_path.as_ref()?;
        match tokio::fs::read(path).await {
            Ok(content) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "attachment".to_string());
                Some(MessageAttachment { filename, content })
            }
            Err(e) => {
                tracing::warn!(target: "dispatch",
                    "Attachment {} unavailable ({}); sending without it", path.display(), e);
                None
            }
        }
    }

    /// Attempts delivery to the top-ranked candidate of one posting.
    ///
    /// Postings that are unresolved or already in `store` are refused without
    /// touching the transport or the pacing delay. A successful send is
    /// written to `store` before the pause.
    pub async fn dispatch(
        &self,
        enriched: &EnrichedPosting,
        template: &MessageTemplate,
        store: &mut dyn DedupStore,
    ) -> DispatchRecord {
        let (record, attempted) = self.deliver(enriched, template, store).await;
        if attempted {
            self.pause(&CancellationToken::new()).await;
        }
        record
    }

    /// Runs every step up to and including persistence. The flag reports
    /// whether the transport was called, which is what earns a pause.
    async fn deliver(
        &self,
        enriched: &EnrichedPosting,
        template: &MessageTemplate,
        store: &mut dyn DedupStore,
    ) -> (DispatchRecord, bool) {
        let posting = &enriched.posting;

        let candidate = match enriched.primary_candidate() {
            Some(c) if enriched.is_dispatchable() => c,
            _ => {
                tracing::warn!(target: "dispatch",
                    "Refusing to dispatch {}: no resolved address", posting.key());
                return (DispatchRecord::failed(posting, None, REASON_NO_ADDRESS), false);
            }
        };

        if store.contains(&posting.key()) {
            tracing::warn!(target: "dispatch", "Refusing to dispatch {}: already sent", posting.key());
            return (
                DispatchRecord::failed(posting, Some(&candidate.address), REASON_ALREADY_SENT),
                false,
            );
        }

        let rendered = match template.render(posting) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(target: "dispatch", "Cannot render message for {}: {}", posting.key(), e);
                return (
                    DispatchRecord::failed(posting, Some(&candidate.address), e.to_string()),
                    false,
                );
            }
        };

        let message = OutboundMessage {
            recipient: candidate.address.clone(),
            subject: rendered.subject,
            body: rendered.body,
            attachment: self.load_attachment().await,
        };

        let record = match self.transport.send(&message).await {
            Ok(()) => {
                tracing::info!(target: "dispatch",
                    "Sent application for '{}' at {} to <{}>", posting.title, posting.organization, candidate.address);
                let record = DispatchRecord::sent(posting, &candidate.address);
                if let Err(e) = store.record(&record) {
                    tracing::error!(target: "dispatch",
                        "Message for {} was sent but not recorded: {}", posting.key(), e);
                }
                record
            }
            Err(e) => {
                tracing::warn!(target: "dispatch",
                    "Delivery to <{}> for {} failed: {}", candidate.address, posting.key(), e);
                DispatchRecord::failed(posting, Some(&candidate.address), e.to_string())
            }
        };

        (record, true)
    }

    /// Sleeps for a random pacing delay. Returns early once `shutdown` fires.
    async fn pause(&self, shutdown: &CancellationToken) {
        let pause = get_random_sleep_duration(self.pause_bounds);
        tracing::debug!(target: "dispatch", "Sleeping {:?} before next dispatch", pause);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = shutdown.cancelled() => {
                tracing::debug!(target: "dispatch", "Pacing delay cut short by shutdown");
            }
        }
    }

    /// Dispatches postings one after another; a failure never stops the batch.
    ///
    /// `shutdown` is only observed between postings and during the pacing
    /// delay. A send in flight always runs to completion and is recorded.
    pub async fn dispatch_all(
        &self,
        postings: &[EnrichedPosting],
        template: &MessageTemplate,
        store: &mut dyn DedupStore,
        shutdown: &CancellationToken,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let total = postings.len();

        for (i, enriched) in postings.iter().enumerate() {
            if shutdown.is_cancelled() {
                tracing::info!(target: "dispatch",
                    "Shutdown requested; {} posting(s) left for the next run", total - i);
                summary.interrupted = true;
                break;
            }
            tracing::info!(target: "dispatch",
                "Dispatching {}/{}: {}", i + 1, total, enriched.posting.key());
            let (record, attempted) = self.deliver(enriched, template, store).await;
            if record.is_sent() {
                summary.sent += 1;
            } else {
                summary.failed += 1;
            }
            summary.records.push(record);
            if attempted {
                self.pause(shutdown).await;
            }
        }

        tracing::info!(target: "dispatch",
            "Email batch complete: {} sent, {} failed", summary.sent, summary.failed);
        summary
    }
}
