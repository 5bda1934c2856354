//! DNS existence checks used to decide whether a guessed domain is real.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};

use async_trait::async_trait;
use std::net::IpAddr;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::TokioAsyncResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Mx,
    A,
}

/// Answers "does `domain` have at least one record of `kind`?".
///
/// `Ok(false)` means the name has no such record (including NXDOMAIN).
/// `Err` is reserved for lookups that could not be completed.
#[async_trait]
pub trait DnsChecker: Send + Sync {
    async fn exists(&self, domain: &str, kind: RecordKind) -> Result<bool>;
}

/// [`DnsChecker`] backed by an async trust-dns resolver.
pub struct ResolverDnsChecker {
    resolver: TokioAsyncResolver,
}

impl ResolverDnsChecker {
    pub fn new(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }
}

/// Creates the resolver from configured name servers, or the system
/// configuration when none are listed.
pub fn create_resolver(config: &Config) -> Result<TokioAsyncResolver> {
    let mut opts = ResolverOpts::default();
    opts.timeout = config.dns_timeout;
    opts.attempts = 2;

    if config.dns_servers.is_empty() {
        tracing::debug!("Using system DNS configuration.");
        let (sys_config, mut sys_opts) =
            trust_dns_resolver::system_conf::read_system_conf().map_err(|e| {
                AppError::Initialization(format!("Failed to read system DNS config: {}", e))
            })?;
        sys_opts.timeout = config.dns_timeout;
        return Ok(TokioAsyncResolver::tokio(sys_config, sys_opts));
    }

    let mut ips: Vec<IpAddr> = Vec::with_capacity(config.dns_servers.len());
    for server in &config.dns_servers {
        let ip = server.trim().parse::<IpAddr>().map_err(|e| {
            AppError::Config(format!("Invalid DNS server address '{}': {}", server, e))
        })?;
        ips.push(ip);
    }
    tracing::debug!("Using DNS servers: {:?}", ips);
    let group = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
    let resolver_config = ResolverConfig::from_parts(None, vec![], group);
    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}

fn classify(domain: &str, kind: RecordKind, err: ResolveError) -> Result<bool> {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => {
            tracing::trace!(target: "resolver", "No {:?} records for {}", kind, domain);
            Ok(false)
        }
        _ => Err(AppError::Dns(format!(
            "{:?} lookup for {} failed: {}",
            kind, domain, err
        ))),
    }
}

#[async_trait]
impl DnsChecker for ResolverDnsChecker {
    async fn exists(&self, domain: &str, kind: RecordKind) -> Result<bool> {
        match kind {
            RecordKind::Mx => match self.resolver.mx_lookup(domain).await {
                Ok(lookup) => Ok(lookup.iter().next().is_some()),
                Err(e) => classify(domain, kind, e),
            },
            RecordKind::A => match self.resolver.ipv4_lookup(domain).await {
                Ok(lookup) => Ok(lookup.iter().next().is_some()),
                Err(e) => classify(domain, kind, e),
            },
        }
    }
}

/// Checks the domain the way the resolver does: MX first, A as a fallback.
///
/// An MX lookup error falls through to the A lookup; an A lookup error is
/// returned to the caller.
pub(crate) async fn domain_accepts_mail(dns: &dyn DnsChecker, domain: &str) -> Result<bool> {
    match dns.exists(domain, RecordKind::Mx).await {
        Ok(true) => {
            tracing::debug!(target: "resolver", "{} has MX records", domain);
            return Ok(true);
        }
        Ok(false) => {}
        Err(e) => {
            tracing::debug!(target: "resolver", "MX lookup error for {} ({}); trying A record", domain, e);
        }
    }
    let has_a = dns.exists(domain, RecordKind::A).await?;
    if has_a {
        tracing::debug!(target: "resolver", "{} has no MX but resolves (A record)", domain);
    }
    Ok(has_a)
}
