//! Handles loading configuration from files and applying it to the Config struct.

use super::{Config, ConfigFile, Secret};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Loads configuration settings from a TOML file.
///
/// A `message.body_file` entry is read here (relative to the config file's
/// directory) and folded into `message.body`.
pub(crate) fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!(
            "File not found or is not a file: {}",
            file_path
        ));
    }
    tracing::debug!("Attempting to read config file: {}", file_path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let mut config_file_content: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    if let Some(ref body_file) = config_file_content.message.body_file {
        let body_path = resolve_relative(path, body_file);
        let body = fs::read_to_string(&body_path).with_context(|| {
            format!("Failed to read message body file: {}", body_path.display())
        })?;
        config_file_content.message.body = Some(body);
    }

    tracing::debug!("Successfully parsed configuration file: {}", file_path);
    Ok(config_file_content)
}

fn resolve_relative(config_path: &Path, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return target.to_path_buf();
    }
    config_path
        .parent()
        .map(|dir| dir.join(target))
        .unwrap_or_else(|| target.to_path_buf())
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

/// Applies settings from a parsed `ConfigFile` onto a mutable `Config` instance.
/// Empty strings for optional paths disable that output.
pub(crate) fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    // Source
    if let Some(ref query) = file_config.source.query {
        if !query.trim().is_empty() {
            config.search_query = Some(query.trim().to_string());
        }
    }
    if let Some(max) = file_config.source.max_postings_per_run {
        config.max_postings_per_run = max;
    }

    // Storage
    if let Some(ref path) = file_config.storage.sent_log_path {
        if let Some(p) = non_empty_path(path) {
            config.sent_log_path = p;
        }
    }
    if let Some(ref path) = file_config.storage.raw_postings_path {
        config.raw_postings_path = non_empty_path(path);
    }
    if let Some(ref path) = file_config.storage.enriched_postings_path {
        config.enriched_postings_path = non_empty_path(path);
    }

    // Resolver
    if let Some(ref suffixes) = file_config.resolver.domain_suffixes {
        config.domain_suffixes = suffixes.clone();
    }
    if let Some(ref parts) = file_config.resolver.contact_local_parts {
        config.contact_local_parts = parts.clone();
    }
    if let Some(ref legal) = file_config.resolver.legal_suffixes {
        config.legal_suffixes = legal.iter().map(|s| s.trim().to_lowercase()).collect();
    }
    if let Some(mode) = file_config.resolver.suffix_stripping {
        config.suffix_stripping = mode;
    }
    if let Some(min_sleep) = file_config.resolver.min_sleep {
        config.sleep_between_resolutions.0 = min_sleep;
    }
    if let Some(max_sleep) = file_config.resolver.max_sleep {
        config.sleep_between_resolutions.1 = max_sleep;
    }

    // Verification
    if let Some(ref key) = file_config.verification.api_key {
        config.verification_api_key = if key.trim().is_empty() {
            None
        } else {
            Some(Secret::new(key.trim()))
        };
    }
    if let Some(ref url) = file_config.verification.api_url {
        config.verification_api_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(budget) = file_config.verification.monthly_budget {
        config.verification_monthly_budget = budget;
    }

    // Dispatch
    if let Some(min_sleep) = file_config.dispatch.min_sleep {
        config.sleep_between_dispatches.0 = min_sleep;
    }
    if let Some(max_sleep) = file_config.dispatch.max_sleep {
        config.sleep_between_dispatches.1 = max_sleep;
    }
    if let Some(ref path) = file_config.dispatch.attachment_path {
        config.attachment_path = non_empty_path(path);
    }
    if let Some(dry_run) = file_config.dispatch.dry_run {
        config.dry_run = dry_run;
    }

    // SMTP
    if let Some(ref host) = file_config.smtp.host {
        config.smtp_host = host.trim().to_string();
    }
    if let Some(port) = file_config.smtp.port {
        config.smtp_port = port;
    }
    if let Some(ref username) = file_config.smtp.username {
        if !username.trim().is_empty() {
            config.smtp_username = Some(username.trim().to_string());
        }
    }
    if let Some(ref password) = file_config.smtp.password {
        if !password.is_empty() {
            config.smtp_password = Some(Secret::new(password.clone()));
        }
    }
    if let Some(ref sender) = file_config.smtp.sender_address {
        if !sender.trim().is_empty() {
            config.sender_address = Some(sender.trim().to_string());
        }
    }
    if let Some(timeout) = file_config.smtp.timeout {
        config.smtp_timeout = Duration::from_secs(timeout);
    }

    // Message
    if let Some(ref subject) = file_config.message.subject {
        config.subject_template = subject.clone();
    }
    if let Some(ref body) = file_config.message.body {
        config.body_template = body.clone();
    }

    // Schedule
    if let Some(enabled) = file_config.schedule.enabled {
        config.schedule_enabled = enabled;
    }
    if let Some(ref cron) = file_config.schedule.cron {
        config.schedule_cron = cron.trim().to_string();
    }

    // Network
    if let Some(timeout) = file_config.network.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(ref user_agent) = file_config.network.user_agent {
        config.user_agent = user_agent.clone();
    }

    // DNS
    if let Some(timeout) = file_config.dns.dns_timeout {
        config.dns_timeout = Duration::from_secs(timeout);
    }
    if let Some(ref servers) = file_config.dns.dns_servers {
        config.dns_servers = servers.clone();
    }
}
