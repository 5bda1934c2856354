//! The durable set of (organization, title) keys that have already been sent.

use crate::core::error::{AppError, Result};
use crate::core::models::{DispatchRecord, PostingKey};

use serde::Deserialize;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

const SENT_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HEADER: [&str; 4] = ["company", "job_title", "email", "sent_at"];

/// Membership test plus append for dispatch keys.
///
/// `record` only accepts `Sent` records and is a no-op for a key that is
/// already present. Reads reflect every prior `record` on the same instance.
pub trait DedupStore: Send {
    fn contains(&self, key: &PostingKey) -> bool;

    fn record(&mut self, record: &DispatchRecord) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Deserialize)]
struct SentRow {
    company: String,
    job_title: String,
}

/// SentLog backed by an append-only CSV file with the columns
/// `company,job_title,email,sent_at`.
#[derive(Debug)]
pub struct CsvSentLog {
    path: PathBuf,
    keys: HashSet<PostingKey>,
}

impl CsvSentLog {
    /// Loads the log. A missing or unreadable file yields an empty store;
    /// this never fails.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let keys = match load_keys(&path) {
            Ok(Some(keys)) => {
                tracing::info!(target: "sent_log",
                    "Loaded {} previously sent keys from {}", keys.len(), path.display());
                keys
            }
            Ok(None) => {
                tracing::info!(target: "sent_log",
                    "No sent log at {}; starting with an empty history", path.display());
                HashSet::new()
            }
            Err(e) => {
                tracing::warn!(target: "sent_log",
                    "Could not read sent log {} ({}); treating every posting as new", path.display(), e);
                HashSet::new()
            }
        };
        Self { path, keys }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> impl Iterator<Item = &PostingKey> {
        self.keys.iter()
    }

    fn append(&self, record: &DispatchRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(HEADER)?;
        }
        let sent_at = record.sent_at.format(SENT_AT_FORMAT).to_string();
        writer.write_record([
            record.organization.as_str(),
            record.title.as_str(),
            record.address.as_deref().unwrap_or(""),
            sent_at.as_str(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

fn load_keys(path: &Path) -> Result<Option<HashSet<PostingKey>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut keys = HashSet::new();
    for row in reader.deserialize::<SentRow>() {
        let row = row?;
        keys.insert(PostingKey::new(row.company, row.job_title));
    }
    Ok(Some(keys))
}

impl DedupStore for CsvSentLog {
    fn contains(&self, key: &PostingKey) -> bool {
        self.keys.contains(key)
    }

    fn record(&mut self, record: &DispatchRecord) -> Result<()> {
        if !record.is_sent() {
            return Err(AppError::Persistence(format!(
                "refusing to record unsent dispatch for {}",
                record.key()
            )));
        }
        let key = record.key();
        if !self.keys.insert(key.clone()) {
            tracing::debug!(target: "sent_log", "Key {} already recorded", key);
            return Ok(());
        }
        self.append(record).map_err(|e| {
            tracing::error!(target: "sent_log",
                "FAILED to persist sent key {} to {}: {}. A later run may send it again.",
                key, self.path.display(), e);
            AppError::Persistence(format!("writing {}: {}", self.path.display(), e))
        })
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Non-durable store used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryDedupStore {
    keys: HashSet<PostingKey>,
    records: Vec<DispatchRecord>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: impl IntoIterator<Item = PostingKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            records: Vec::new(),
        }
    }

    /// Records accepted since creation, in order.
    pub fn records(&self) -> &[DispatchRecord] {
        &self.records
    }
}

impl DedupStore for MemoryDedupStore {
    fn contains(&self, key: &PostingKey) -> bool {
        self.keys.contains(key)
    }

    fn record(&mut self, record: &DispatchRecord) -> Result<()> {
        if !record.is_sent() {
            return Err(AppError::Persistence(format!(
                "refusing to record unsent dispatch for {}",
                record.key()
            )));
        }
        if self.keys.insert(record.key()) {
            self.records.push(record.clone());
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}
