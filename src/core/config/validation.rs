//! Contains validation logic for the final Config struct.

use super::{Config, Result};
use crate::core::error::AppError;
use std::str::FromStr;

fn check_sleep_bounds(label: &str, bounds: &mut (f32, f32)) -> Result<()> {
    if bounds.0 < 0.0 || bounds.1 < 0.0 {
        return Err(AppError::Config(format!(
            "{} sleep durations cannot be negative.",
            label
        )));
    }
    if bounds.0 > bounds.1 {
        tracing::warn!(
            "{} min sleep ({:.2}s) > max sleep ({:.2}s). Setting max sleep = min sleep.",
            label,
            bounds.0,
            bounds.1
        );
        bounds.1 = bounds.0;
    }
    Ok(())
}

/// Validates the configuration settings after loading and potential overrides.
/// Mutates the config to clamp values where a safe correction exists.
pub(crate) fn validate_config(config: &mut Config) -> Result<()> {
    check_sleep_bounds("Resolution", &mut config.sleep_between_resolutions)?;
    check_sleep_bounds("Dispatch", &mut config.sleep_between_dispatches)?;

    if config.domain_suffixes.is_empty() {
        return Err(AppError::Config(
            "At least one domain suffix is required.".to_string(),
        ));
    }
    for suffix in config.domain_suffixes.iter_mut() {
        *suffix = suffix.trim().to_lowercase();
        if !suffix.starts_with('.') || suffix.len() < 2 {
            return Err(AppError::Config(format!(
                "Domain suffix '{}' must start with '.' (e.g. \".com\").",
                suffix
            )));
        }
    }

    config.contact_local_parts = config
        .contact_local_parts
        .iter()
        .map(|p| p.trim().trim_end_matches('@').to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();
    if config.contact_local_parts.is_empty() {
        return Err(AppError::Config(
            "At least one contact local part (e.g. \"hr\") is required.".to_string(),
        ));
    }

    if config.max_postings_per_run == 0 {
        tracing::warn!("Max postings per run was set to 0. Setting to 1.");
        config.max_postings_per_run = 1;
    }

    if config.dns_servers.is_empty() {
        tracing::warn!("DNS servers list is empty. The system resolver configuration will be used.");
    }

    config.template().map_err(|e| {
        AppError::Config(format!("Message template is invalid: {}", e))
    })?;

    if !config.dry_run {
        let username_ok = config
            .smtp_username
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        let password_ok = config.smtp_password.as_ref().is_some_and(|p| !p.is_empty());
        if !username_ok || !password_ok {
            return Err(AppError::Config(
                "Email credentials not configured. Set EMAIL_ADDRESS and EMAIL_APP_PASSWORD (or use --dry-run)."
                    .to_string(),
            ));
        }
        match config.effective_sender() {
            Some(sender) if sender.contains('@') && sender.contains('.') => {}
            other => {
                return Err(AppError::Config(format!(
                    "Invalid sender email format: {}",
                    other.unwrap_or("<none>")
                )));
            }
        }
    }

    if config.verification_api_key.is_none() {
        tracing::debug!("No verification API key configured; identity checks are disabled.");
    } else if config.verification_monthly_budget == 0 {
        tracing::warn!("Verification API key is set but the monthly budget is 0; no checks will run.");
    }

    if config.schedule_enabled {
        cron::Schedule::from_str(&config.schedule_cron).map_err(|e| {
            AppError::Config(format!(
                "Invalid schedule expression '{}': {}",
                config.schedule_cron, e
            ))
        })?;
    }

    if let Some(ref path) = config.attachment_path {
        if !path.exists() {
            tracing::warn!(
                "Attachment not found at {}. Messages will be sent without it until the file exists.",
                path.display()
            );
        }
    }

    Ok(())
}

/// Rejects a missing or blank listing query. Kept apart from
/// `validate_config` so the preflight check can report it instead.
pub(crate) fn validate_search_query(config: &mut Config) -> Result<()> {
    match config.search_query.as_deref().map(str::trim) {
        Some(query) if !query.is_empty() => {
            let query = query.to_string();
            config.search_query = Some(query);
            Ok(())
        }
        _ => Err(AppError::Config(
            "No listing query configured. Set source.query or pass --query.".to_string(),
        )),
    }
}
