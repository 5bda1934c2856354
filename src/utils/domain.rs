//! Turns organization names into candidate domain names.

use crate::core::config::SuffixStripping;

/// Longest label DNS accepts.
const MAX_LABEL_LEN: usize = 63;

/// Normalizes an organization name into a single DNS label.
///
/// With [`SuffixStripping::WordBoundary`] ("Acme, Inc." -> "acme"), only whole
/// tokens matching a legal suffix are dropped, and characters that cannot
/// appear in a DNS label are removed afterwards.
///
/// With [`SuffixStripping::Substring`] the legacy heuristic is reproduced:
/// spaces, commas and periods are removed and each legal suffix is then
/// deleted wherever it occurs, so "Covenant Health" becomes "venanthealth".
/// It is kept only so existing deployments can opt back into it.
pub(crate) fn normalize_organization_name(
    name: &str,
    legal_suffixes: &[String],
    mode: SuffixStripping,
) -> String {
    let lowered = name.trim().to_lowercase();

    let squashed = match mode {
        SuffixStripping::Substring => {
            let mut clean = lowered.replace([' ', ',', '.'], "");
            for suffix in legal_suffixes {
                if !suffix.is_empty() {
                    clean = clean.replace(suffix.as_str(), "");
                }
            }
            clean
        }
        SuffixStripping::WordBoundary => {
            lowered
                .split(|c: char| c.is_whitespace() || c == ',' || c == '.')
                .filter(|token| !token.is_empty())
                .filter(|token| !legal_suffixes.iter().any(|s| s == token))
                .collect::<String>()
        }
    };

    let label: String = squashed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    let label = label.trim_matches('-').to_string();

    tracing::trace!(target: "resolver", "Normalized organization '{}' -> '{}' ({:?})", name, label, mode);
    label
}

/// Builds candidate domains in suffix priority order. Returns nothing for an
/// empty or over-long label.
pub(crate) fn candidate_domains(label: &str, suffixes: &[String]) -> Vec<String> {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return Vec::new();
    }
    suffixes
        .iter()
        .map(|suffix| format!("{}{}", label, suffix))
        .filter(|domain| is_plausible_domain(domain))
        .collect()
}

/// Shape check: at least one dot, no empty labels, no leading/trailing dot.
pub(crate) fn is_plausible_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.split('.').all(|l| !l.is_empty() && l.len() <= MAX_LABEL_LEN)
}
