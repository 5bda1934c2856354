//! Provides the `ConfigBuilder` for fluent configuration construction.

use super::loading::{apply_file_config, load_config_file};
use super::validation::{validate_config, validate_search_query};
use super::{Config, ConfigFile, Result};
use crate::AppError;
use std::path::Path;
use std::time::Duration;

/// Builder pattern for creating `Config` instances fluently.
///
/// Values are layered: defaults, then a config file, then explicit overrides.
/// `build` validates the result.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    config_file_path: Option<String>,
    overrides: ConfigFile,
    skip_query_check: bool,
}

impl ConfigBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify an optional configuration file path to load.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    pub fn search_query(mut self, query: impl Into<String>) -> Self {
        self.overrides.source.query = Some(query.into());
        self
    }
    pub fn max_postings_per_run(mut self, value: usize) -> Self {
        self.overrides.source.max_postings_per_run = Some(value);
        self
    }
    pub fn sent_log_path(mut self, path: impl Into<String>) -> Self {
        self.overrides.storage.sent_log_path = Some(path.into());
        self
    }
    /// Pass an empty string to disable the export.
    pub fn raw_postings_path(mut self, path: impl Into<String>) -> Self {
        self.overrides.storage.raw_postings_path = Some(path.into());
        self
    }
    /// Pass an empty string to disable the export.
    pub fn enriched_postings_path(mut self, path: impl Into<String>) -> Self {
        self.overrides.storage.enriched_postings_path = Some(path.into());
        self
    }
    pub fn sleep_between_resolutions(mut self, min: f32, max: f32) -> Self {
        self.overrides.resolver.min_sleep = Some(min);
        self.overrides.resolver.max_sleep = Some(max);
        self
    }
    pub fn sleep_between_dispatches(mut self, min: f32, max: f32) -> Self {
        self.overrides.dispatch.min_sleep = Some(min);
        self.overrides.dispatch.max_sleep = Some(max);
        self
    }
    pub fn suffix_stripping(mut self, mode: super::SuffixStripping) -> Self {
        self.overrides.resolver.suffix_stripping = Some(mode);
        self
    }
    /// Pass an empty string to send without an attachment.
    pub fn attachment_path(mut self, path: impl Into<String>) -> Self {
        self.overrides.dispatch.attachment_path = Some(path.into());
        self
    }
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.overrides.dispatch.dry_run = Some(enabled);
        self
    }
    pub fn verification_api_key(mut self, key: impl Into<String>) -> Self {
        self.overrides.verification.api_key = Some(key.into());
        self
    }
    pub fn verification_monthly_budget(mut self, calls: u32) -> Self {
        self.overrides.verification.monthly_budget = Some(calls);
        self
    }
    pub fn smtp_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.overrides.smtp.username = Some(username.into());
        self.overrides.smtp.password = Some(password.into());
        self
    }
    pub fn smtp_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.overrides.smtp.host = Some(host.into());
        self.overrides.smtp.port = Some(port);
        self
    }
    pub fn sender_address(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.sender_address = Some(value.into());
        self
    }
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.overrides.network.request_timeout = Some(duration.as_secs());
        self
    }
    pub fn dns_timeout(mut self, duration: Duration) -> Self {
        self.overrides.dns.dns_timeout = Some(duration.as_secs());
        self
    }
    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.overrides.dns.dns_servers = Some(servers);
        self
    }
    pub fn schedule_enabled(mut self, enabled: bool) -> Self {
        self.overrides.schedule.enabled = Some(enabled);
        self
    }
    /// Accept a config without a listing query (used by the preflight check).
    pub fn skip_query_check(mut self, skip: bool) -> Self {
        self.skip_query_check = skip;
        self
    }
    pub fn schedule_cron(mut self, expression: impl Into<String>) -> Self {
        self.overrides.schedule.cron = Some(expression.into());
        self
    }

    /// Builds the final `Config` object, applying defaults, file settings, overrides, and validation.
    pub fn build(mut self) -> Result<Config> {
        let mut loaded_path: Option<String> = None;

        if let Some(ref path) = self.config_file_path {
            match load_config_file(path) {
                Ok(file_config) => {
                    apply_file_config(&mut self.config, &file_config);
                    loaded_path = Some(path.clone());
                    tracing::info!("Loaded base configuration from specified file: {}", path);
                }
                Err(e) => {
                    tracing::error!("Failed to load specified config file '{}': {}", path, e);
                    return Err(AppError::Config(format!(
                        "Failed to load specified configuration file '{}': {:#}",
                        path, e
                    )));
                }
            }
        } else {
            tracing::debug!("No config file specified, checking default locations.");
            for path_str in ["./job-outreach.toml", "./config.toml"] {
                if Path::new(path_str).exists() {
                    tracing::debug!("Found potential default config file: {}", path_str);
                    match load_config_file(path_str) {
                        Ok(file_config) => {
                            apply_file_config(&mut self.config, &file_config);
                            loaded_path = Some(path_str.to_string());
                            tracing::info!(
                                "Loaded base configuration from default location: {}",
                                path_str
                            );
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Failed to load or parse default config '{}': {:#}",
                                path_str,
                                e
                            );
                        }
                    }
                }
            }
            if loaded_path.is_none() {
                tracing::info!("No configuration file found. Using default values and overrides.");
            }
        }

        apply_file_config(&mut self.config, &self.overrides);
        self.config.loaded_config_path = loaded_path;
        validate_config(&mut self.config)?;
        if !self.skip_query_check {
            validate_search_query(&mut self.config)?;
        }

        tracing::debug!("Final configuration built successfully.");
        Ok(self.config)
    }
}

impl ConfigBuilder {
    /// Test helper: a validated dry-run config with no pacing and no exports.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Config {
        let mut config = Config {
            dry_run: true,
            attachment_path: None,
            raw_postings_path: None,
            enriched_postings_path: None,
            sleep_between_resolutions: (0.0, 0.0),
            sleep_between_dispatches: (0.0, 0.0),
            schedule_enabled: false,
            smtp_username: Some("me@example.com".to_string()),
            smtp_password: Some(super::Secret::new("test")),
            ..Config::default()
        };
        validate_config(&mut config).expect("test config is valid");
        config
    }
}
