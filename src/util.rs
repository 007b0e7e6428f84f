//! Normalization and matching helpers shared by the locator, the
//! consolidation engine, and the assistant context builder.

use std::collections::HashSet;
use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

/// Words too common in fund names to carry search signal.
const STOP_WORDS: &[&str] = &[
    "fund",
    "funds",
    "funding",
    "growth",
    "capital",
    "venture",
    "private",
    "equity",
    "management",
    "managers",
    "group",
    "partners",
    "partnership",
    "limited",
    "ltd",
    "inc",
    "incorporated",
    "llc",
    "investment",
    "investments",
    "investors",
    "the",
    "a",
    "an",
    "and",
    "or",
    "of",
    "for",
    "in",
    "on",
    "at",
    "to",
    "with",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Normalize a company name for comparison: lowercase, trimmed, inner
/// whitespace collapsed to single spaces.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize for fuzzy matching: lowercase ASCII alphanumerics only.
/// Makes "AgriFrontier" and "Agri Frontier" compare equal.
pub fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Extract the words of a query that carry search signal: at least three
/// characters and not in the stop-word list.
pub fn significant_words(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() >= 3)
        .filter(|w| !stop_words().contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Relevance score of a candidate name against the search term.
///
/// Tiers: exact 100, prefix 80, substring 60, all significant words 50,
/// most (>= 70%) 30, at least one 20, otherwise 10. Candidates below
/// [`RELEVANCE_THRESHOLD`] are discarded.
pub fn relevance(name: &str, search_term: &str) -> u32 {
    let name_norm = normalize_name(name);
    let search_norm = normalize_name(search_term);

    if name_norm == search_norm {
        return 100;
    }
    if name_norm.starts_with(&search_norm) {
        return 80;
    }
    if name_norm.contains(&search_norm) {
        return 60;
    }

    let words = significant_words(search_term);
    if !words.is_empty() {
        let name_words: Vec<&str> = name_norm.split_whitespace().collect();
        let matching = words
            .iter()
            .filter(|sw| name_words.iter().any(|nw| nw.contains(*sw) || sw.contains(nw)))
            .count();

        if words.len() >= 2 && matching == words.len() {
            return 50;
        }
        let most = (words.len() as f64 * 0.7).ceil() as usize;
        if words.len() >= 2 && matching >= most {
            return 30;
        }
        if matching > 0 {
            return 20;
        }
    }

    10
}

/// Minimum relevance for a candidate to be shown at all.
pub const RELEVANCE_THRESHOLD: u32 = 20;

pub fn is_relevant(name: &str, search_term: &str) -> bool {
    relevance(name, search_term) >= RELEVANCE_THRESHOLD
}

/// String similarity used to order candidates of equal relevance.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&normalize_name(a), &normalize_name(b))
}

/// Syntactic email validation. Matches the signup contract: one `@`,
/// non-empty local part, dot in the domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));
    re.is_match(email)
}

/// Derive a fallback display name from an email's local part.
pub fn display_name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789!@#$%&*";

/// Generate a temporary credential for a provisioned account. The caller is
/// responsible for rotating it out-of-band.
pub fn generate_temp_password(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len.max(12))
        .map(|_| {
            let idx = rng.random_range(0..PASSWORD_CHARSET.len());
            PASSWORD_CHARSET[idx] as char
        })
        .collect()
}
