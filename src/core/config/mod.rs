//! Runtime configuration: defaults, the TOML file mirror, and pacing helpers.

mod builder;
mod loading;
mod validation;

pub use builder::ConfigBuilder;

use crate::core::error::Result;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How legal-entity suffixes are removed from organization names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuffixStripping {
    /// Drop whole whitespace-separated tokens only ("Covenant Co" -> "covenant").
    #[default]
    WordBoundary,
    /// Legacy heuristic: remove suffixes anywhere in the squashed name
    /// ("Covenant" -> "venant"). Kept for parity with old sent logs.
    Substring,
}

/// A credential that never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "Secret(<empty>)")
        } else {
            write!(f, "Secret(***)")
        }
    }
}

/// Effective configuration for one process.
#[derive(Debug, Clone)]
pub struct Config {
    // Listing source
    pub search_query: Option<String>,
    pub max_postings_per_run: usize,

    // Storage
    pub sent_log_path: PathBuf,
    pub raw_postings_path: Option<PathBuf>,
    pub enriched_postings_path: Option<PathBuf>,

    // Contact resolution
    pub domain_suffixes: Vec<String>,
    pub contact_local_parts: Vec<String>,
    pub legal_suffixes: Vec<String>,
    pub suffix_stripping: SuffixStripping,
    pub sleep_between_resolutions: (f32, f32),

    // Identity verification
    pub verification_api_key: Option<Secret>,
    pub verification_api_url: String,
    pub verification_monthly_budget: u32,

    // Dispatch
    pub sleep_between_dispatches: (f32, f32),
    pub attachment_path: Option<PathBuf>,
    pub subject_template: String,
    pub body_template: String,
    pub dry_run: bool,

    // SMTP transport
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<Secret>,
    pub sender_address: Option<String>,
    pub smtp_timeout: Duration,

    // Network
    pub request_timeout: Duration,
    pub user_agent: String,

    // DNS
    pub dns_servers: Vec<String>,
    pub dns_timeout: Duration,

    // Scheduling
    pub schedule_enabled: bool,
    pub schedule_cron: String,

    pub email_regex: Regex,
    pub loaded_config_path: Option<String>,
}

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "Application for {job_title} at {company}";

pub const DEFAULT_BODY_TEMPLATE: &str = "Dear Hiring Manager,

I hope this email finds you well. I am writing to express my strong interest in the {job_title} position at {company} that I found on LinkedIn.

With my background in software development and passion for technology, I believe I would be a valuable addition to your team. I have attached my resume for your review.

I would welcome the opportunity to discuss how my skills and experience can contribute to {company}'s continued success.

Thank you for your time and consideration. I look forward to hearing from you.

Best regards,
[Your Name]
[Your Phone Number]
[Your Email]
";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_query: None,
            max_postings_per_run: 50,
            sent_log_path: PathBuf::from("data/sent_emails.csv"),
            raw_postings_path: Some(PathBuf::from("data/jobs.csv")),
            enriched_postings_path: Some(PathBuf::from("data/contacts.csv")),
            domain_suffixes: strings(&[".com", ".org", ".net", ".io", ".co"]),
            contact_local_parts: strings(&[
                "hr",
                "careers",
                "jobs",
                "recruiting",
                "talent",
                "hiring",
                "contact",
                "info",
            ]),
            legal_suffixes: strings(&["inc", "corp", "llc", "ltd", "co"]),
            suffix_stripping: SuffixStripping::default(),
            sleep_between_resolutions: (1.0, 3.0),
            verification_api_key: None,
            verification_api_url: "https://person.clearbit.com/v1/people/email".to_string(),
            verification_monthly_budget: 50,
            sleep_between_dispatches: (10.0, 30.0),
            attachment_path: Some(PathBuf::from("cv/cv.pdf")),
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
            dry_run: false,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            sender_address: None,
            smtp_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            dns_servers: strings(&["8.8.8.8", "8.8.4.4", "1.1.1.1"]),
            dns_timeout: Duration::from_secs(5),
            schedule_enabled: true,
            schedule_cron: "0 0 9 * * *".to_string(),
            email_regex: Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$")
                .expect("static email regex compiles"),
            loaded_config_path: None,
        }
    }
}

impl Config {
    /// Address the outbound messages are sent from; falls back to the SMTP login.
    pub fn effective_sender(&self) -> Option<&str> {
        self.sender_address
            .as_deref()
            .or(self.smtp_username.as_deref())
    }

    pub fn template(&self) -> Result<crate::utils::template::MessageTemplate> {
        crate::utils::template::MessageTemplate::parse(&self.subject_template, &self.body_template)
    }
}

/// Picks a uniformly random pause within `(min, max)` seconds.
pub fn get_random_sleep_duration(bounds: (f32, f32)) -> Duration {
    let min = bounds.0.max(0.0);
    let max = bounds.1.max(min);
    if max <= min {
        return Duration::from_secs_f32(min);
    }
    let secs = rand::thread_rng().gen_range(min..=max);
    Duration::from_secs_f32(secs)
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct SourceSection {
    pub query: Option<String>,
    pub max_postings_per_run: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSection {
    pub sent_log_path: Option<String>,
    pub raw_postings_path: Option<String>,
    pub enriched_postings_path: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct ResolverSection {
    pub domain_suffixes: Option<Vec<String>>,
    pub contact_local_parts: Option<Vec<String>>,
    pub legal_suffixes: Option<Vec<String>>,
    pub suffix_stripping: Option<SuffixStripping>,
    pub min_sleep: Option<f32>,
    pub max_sleep: Option<f32>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct VerificationSection {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub monthly_budget: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct DispatchSection {
    pub min_sleep: Option<f32>,
    pub max_sleep: Option<f32>,
    pub attachment_path: Option<String>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct SmtpSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender_address: Option<String>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct MessageSection {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub body_file: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleSection {
    pub enabled: Option<bool>,
    pub cron: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkSection {
    pub request_timeout: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct DnsSection {
    pub dns_servers: Option<Vec<String>>,
    pub dns_timeout: Option<u64>,
}

/// Mirror of the TOML configuration file. Every field is optional.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct ConfigFile {
    pub source: SourceSection,
    pub storage: StorageSection,
    pub resolver: ResolverSection,
    pub verification: VerificationSection,
    pub dispatch: DispatchSection,
    pub smtp: SmtpSection,
    pub message: MessageSection,
    pub schedule: ScheduleSection,
    pub network: NetworkSection,
    pub dns: DnsSection,
}
