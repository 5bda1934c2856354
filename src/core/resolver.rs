//! Contact resolution: organization name -> domain -> ranked candidate addresses.

use crate::core::config::{get_random_sleep_duration, Config, SuffixStripping};
use crate::core::error::{AppError, Result};
use crate::core::models::{ContactCandidate, ContactResolution, EnrichedPosting, Posting};
use crate::utils::dns::{domain_accepts_mail, DnsChecker};
use crate::utils::domain::{candidate_domains, normalize_organization_name};
use crate::utils::patterns::generate_contact_candidates;
use crate::verification::IdentityVerifier;

use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Turns organization names into ranked contact candidates.
///
/// Owns the verification call budget. The budget is counted per issued call
/// and is only restored by [`ContactResolver::reset_verification_budget`].
pub struct ContactResolver {
    dns: Arc<dyn DnsChecker>,
    verifier: Option<Arc<dyn IdentityVerifier>>,
    domain_suffixes: Vec<String>,
    legal_suffixes: Vec<String>,
    suffix_stripping: SuffixStripping,
    local_parts: Vec<String>,
    email_regex: Regex,
    pause_bounds: (f32, f32),
    verification_budget: u32,
    verification_calls: u32,
    cache: HashMap<String, ContactResolution>,
}

impl ContactResolver {
    pub fn new(
        config: &Config,
        dns: Arc<dyn DnsChecker>,
        verifier: Option<Arc<dyn IdentityVerifier>>,
    ) -> Self {
        if config.suffix_stripping == SuffixStripping::Substring {
            tracing::warn!(target: "resolver",
                "Legacy substring suffix stripping is enabled; names like 'Covenant' lose inner 'co'.");
        }
        Self {
            dns,
            verifier,
            domain_suffixes: config.domain_suffixes.clone(),
            legal_suffixes: config.legal_suffixes.clone(),
            suffix_stripping: config.suffix_stripping,
            local_parts: config.contact_local_parts.clone(),
            email_regex: config.email_regex.clone(),
            pause_bounds: config.sleep_between_resolutions,
            verification_budget: config.verification_monthly_budget,
            verification_calls: 0,
            cache: HashMap::new(),
        }
    }

    pub fn verification_calls_made(&self) -> u32 {
        self.verification_calls
    }

    pub fn verification_budget_remaining(&self) -> u32 {
        self.verification_budget.saturating_sub(self.verification_calls)
    }

    pub fn reset_verification_budget(&mut self) {
        tracing::info!(target: "resolver",
            "Verification budget reset ({} calls were made)", self.verification_calls);
        self.verification_calls = 0;
    }

    /// Forgets organizations resolved earlier. Called at the start of each run.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Resolves one organization. Never fails: any error is logged and the
    /// organization is reported as unresolved.
    pub async fn resolve(&mut self, organization: &str) -> ContactResolution {
        if let Some(cached) = self.cache.get(organization) {
            tracing::debug!(target: "resolver", "Using cached resolution for '{}'", organization);
            return cached.clone();
        }

        let resolution = match self.try_resolve(organization).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "resolver",
                    "Resolution failed for '{}': {}. Marking unresolved.", organization, e);
                ContactResolution::unresolved()
            }
        };

        match &resolution.domain {
            Some(domain) => tracing::info!(target: "resolver",
                "'{}' -> {} ({} candidates)", organization, domain, resolution.candidates.len()),
            None => tracing::info!(target: "resolver", "'{}' -> unresolved", organization),
        }

        self.cache.insert(organization.to_string(), resolution.clone());
        resolution
    }

    async fn try_resolve(&mut self, organization: &str) -> Result<ContactResolution> {
        let label =
            normalize_organization_name(organization, &self.legal_suffixes, self.suffix_stripping);
        if label.is_empty() {
            tracing::debug!(target: "resolver", "'{}' normalizes to nothing", organization);
            return Ok(ContactResolution::unresolved());
        }

        let domains = candidate_domains(&label, &self.domain_suffixes);
        let mut found: Option<String> = None;
        for (i, domain) in domains.iter().enumerate() {
            let accepts = match domain_accepts_mail(self.dns.as_ref(), domain).await {
                Ok(accepts) => accepts,
                Err(e) => {
                    let skipped = &domains[i + 1..];
                    if !skipped.is_empty() {
                        tracing::warn!(target: "resolver",
                            "DNS failure on {} ends resolution of '{}'; not trying {}",
                            domain, organization, skipped.join(", "));
                    }
                    return Err(AppError::Resolution(format!("{}: {}", organization, e)));
                }
            };
            if accepts {
                found = Some(domain.clone());
                break;
            }
        }

        let domain = match found {
            Some(d) => d,
            None => return Ok(ContactResolution::unresolved()),
        };

        let mut candidates =
            generate_contact_candidates(&self.email_regex, &self.local_parts, &domain);
        self.verify_primary(&mut candidates).await;
        Ok(ContactResolution::resolved(domain, candidates))
    }

    async fn verify_primary(&mut self, candidates: &mut [ContactCandidate]) {
        let verifier = match &self.verifier {
            Some(v) => Arc::clone(v),
            None => return,
        };
        let primary = match candidates.iter_mut().min_by_key(|c| c.rank) {
            Some(c) => c,
            None => return,
        };
        if self.verification_calls >= self.verification_budget {
            tracing::debug!(target: "resolver",
                "Verification budget exhausted ({} calls); {} stays unverified",
                self.verification_calls, primary.address);
            return;
        }

        self.verification_calls += 1;
        match verifier.verify(&primary.address).await {
            Ok(Some(identity)) => {
                tracing::debug!(target: "resolver",
                    "{} verified ({})", primary.address,
                    identity.full_name.as_deref().unwrap_or("no name"));
                primary.verified = true;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(target: "resolver", "Verification of {} failed: {}", primary.address, e);
            }
        }
    }

    /// Resolves every posting in order, pausing between fresh resolutions.
    pub async fn enrich_all(&mut self, postings: Vec<Posting>) -> Vec<EnrichedPosting> {
        let total = postings.len();
        let mut enriched = Vec::with_capacity(total);

        for (i, posting) in postings.into_iter().enumerate() {
            let cached = self.cache.contains_key(&posting.organization);
            tracing::info!(target: "resolver",
                "Resolving contacts {}/{}: {} at {}", i + 1, total, posting.title, posting.organization);
            let resolution = self.resolve(&posting.organization).await;
            enriched.push(EnrichedPosting::new(posting, resolution));

            if !cached && i + 1 < total {
                let pause = get_random_sleep_duration(self.pause_bounds);
                tracing::debug!(target: "resolver", "Sleeping {:?} before next resolution", pause);
                tokio::time::sleep(pause).await;
            }
        }
        enriched
    }
}
