//! Write-only CSV snapshots of what a run fetched and resolved.

use crate::core::error::Result;
use crate::core::models::{EnrichedPosting, Posting};

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct RawRow<'a> {
    title: &'a str,
    company: &'a str,
    location: &'a str,
    url: &'a str,
    posted_date: String,
    scraped_at: String,
}

impl<'a> From<&'a Posting> for RawRow<'a> {
    fn from(p: &'a Posting) -> Self {
        Self {
            title: &p.title,
            company: &p.organization,
            location: &p.location,
            url: &p.url,
            posted_date: p
                .posted_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            scraped_at: p.observed_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct EnrichedRow<'a> {
    title: &'a str,
    company: &'a str,
    location: &'a str,
    url: &'a str,
    posted_date: String,
    scraped_at: String,
    domain: &'a str,
    emails: String,
    primary_email: &'a str,
    verified: bool,
    resolution_status: String,
}

impl<'a> From<&'a EnrichedPosting> for EnrichedRow<'a> {
    fn from(e: &'a EnrichedPosting) -> Self {
        let primary = e.primary_candidate();
        let raw = RawRow::from(&e.posting);
        Self {
            title: raw.title,
            company: raw.company,
            location: raw.location,
            url: raw.url,
            posted_date: raw.posted_date,
            scraped_at: raw.scraped_at,
            domain: e.domain.as_deref().unwrap_or(""),
            emails: e
                .candidates
                .iter()
                .map(|c| c.address.as_str())
                .collect::<Vec<_>>()
                .join(";"),
            primary_email: primary.map(|c| c.address.as_str()).unwrap_or(""),
            verified: primary.map(|c| c.verified).unwrap_or(false),
            resolution_status: e.resolution_status.to_string(),
        }
    }
}

/// Writes `jobs.csv`-style and `contacts.csv`-style audit files. Either path
/// may be disabled. Each write replaces the previous file.
#[derive(Debug, Clone, Default)]
pub struct AuditExporter {
    raw_path: Option<PathBuf>,
    enriched_path: Option<PathBuf>,
}

impl AuditExporter {
    pub fn new(raw_path: Option<PathBuf>, enriched_path: Option<PathBuf>) -> Self {
        Self {
            raw_path,
            enriched_path,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn export_raw(&self, postings: &[Posting]) -> Result<()> {
        match &self.raw_path {
            Some(path) => write_rows(path, postings.iter().map(RawRow::from)),
            None => Ok(()),
        }
    }

    pub fn export_enriched(&self, enriched: &[EnrichedPosting]) -> Result<()> {
        match &self.enriched_path {
            Some(path) => write_rows(path, enriched.iter().map(EnrichedRow::from)),
            None => Ok(()),
        }
    }
}

fn write_rows<T: Serialize>(path: &Path, rows: impl Iterator<Item = T>) -> Result<()> {
    let mut rows = rows.peekable();
    if rows.peek().is_none() {
        tracing::warn!(target: "pipeline", "Nothing to export to {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    let mut count = 0usize;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    tracing::info!(target: "pipeline", "Saved {} rows to {}", count, path.display());
    Ok(())
}
