//! Generates ranked contact address candidates for a resolved domain.

use crate::core::models::ContactCandidate;
use regex::Regex;
use std::collections::HashSet;

/// Builds one address per local part, ranked by list position (0 = preferred).
///
/// Local parts are used in the order given; duplicates keep their first
/// position and addresses failing `email_regex` are dropped without
/// renumbering the survivors.
pub(crate) fn generate_contact_candidates(
    email_regex: &Regex,
    local_parts: &[String],
    domain: &str,
) -> Vec<ContactCandidate> {
    tracing::debug!(target: "resolver", "Generating contact candidates @ '{}'", domain);

    if !crate::utils::domain::is_plausible_domain(domain) {
        tracing::warn!(target: "resolver",
            "Cannot generate candidates: invalid domain provided '{}'", domain);
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let candidates: Vec<ContactCandidate> = local_parts
        .iter()
        .enumerate()
        .filter_map(|(rank, local)| {
            let address = format!("{}@{}", local.trim().to_lowercase(), domain.to_lowercase());
            if !seen.insert(address.clone()) {
                return None;
            }
            if !email_regex.is_match(&address) {
                tracing::trace!(target: "resolver", "Generated candidate failed regex validation: {}", address);
                return None;
            }
            Some(ContactCandidate {
                address,
                rank,
                verified: false,
            })
        })
        .collect();

    tracing::debug!(target: "resolver",
        "Generated {} candidates @ '{}'", candidates.len(), domain);
    candidates
}
