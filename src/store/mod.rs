//! Durable dispatch history and audit exports.

mod export;
mod sent_log;

pub use export::AuditExporter;
pub use sent_log::{CsvSentLog, DedupStore, MemoryDedupStore};
