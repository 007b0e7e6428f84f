//! Historical Record Locator.
//!
//! Finds company-name variants across every survey period's record set and
//! the contact emails attached to them. Each period has its own table and
//! column names; everything here goes through the `PeriodSchema` mapping.
//!
//! Search runs a cascade of strategies, most specific first, and stops
//! adding candidates once enough relevant ones have accumulated:
//! 1. full-phrase substring match
//! 2. all-significant-words match (queries with two or more useful words)
//! 3. longest-significant-word match (words of five or more characters)
//! 4. separator-insensitive key match ("AgriFrontier" vs "Agri Frontier")

use std::collections::HashMap;

use crate::config::PeriodSchema;
use crate::db::{DbError, EmailHit, MemberDb};
use crate::error::CoreError;
use crate::util;

/// Hard cap on candidates returned to the caller.
const MAX_RESULTS: usize = 50;

/// Strategy 2 stops early once this many candidates exist.
const ENOUGH_FOR_WORD_PASS: usize = 20;
/// Strategy 3 stops early once this many candidates exist.
const ENOUGH_FOR_PRIMARY_WORD_PASS: usize = 10;

#[derive(Debug)]
struct Candidate {
    /// First-seen spelling, preserved for display.
    name: String,
    score: u32,
}

fn lookup_failed(e: DbError) -> CoreError {
    CoreError::LookupFailed(e)
}

/// Record a candidate, deduping spelling variants by normalized name. The
/// first-seen spelling is kept for display; the best score wins.
fn add(candidates: &mut HashMap<String, Candidate>, name: &str, score: u32) {
    let key = util::normalize_name(name);
    if key.is_empty() {
        return;
    }
    let entry = candidates.entry(key).or_insert_with(|| Candidate {
        name: name.to_string(),
        score,
    });
    if score > entry.score {
        entry.score = score;
    }
}

/// Search every period's record set for company names matching `query`.
///
/// Returns distinct company-name strings ordered by relevance. An empty
/// result is a successful "no matches", never an error; store failures
/// surface as `LookupFailed` so the caller can offer a retry.
pub fn search_companies(
    db: &MemberDb,
    periods: &[PeriodSchema],
    query: &str,
) -> Result<Vec<String>, CoreError> {
    let query = query.trim();
    if query.chars().count() < 2 {
        return Err(CoreError::InvalidInput(
            "Search term must be at least 2 characters".into(),
        ));
    }

    // Keyed by normalized name so spelling variants dedupe to one entry.
    let mut candidates: HashMap<String, Candidate> = HashMap::new();

    // Strategy 1: full phrase
    let pattern = format!("%{}%", query);
    for schema in periods {
        for row in db.period_rows_like(schema, &pattern).map_err(lookup_failed)? {
            if util::is_relevant(&row.name, query) {
                add(&mut candidates, &row.name, util::relevance(&row.name, query));
            }
        }
    }

    // Strategy 2: require every significant word
    let words = util::significant_words(query);
    if words.len() >= 2 && candidates.len() < ENOUGH_FOR_WORD_PASS {
        for schema in periods {
            for word in &words {
                let word_pattern = format!("%{}%", word);
                for row in db
                    .period_rows_like(schema, &word_pattern)
                    .map_err(lookup_failed)?
                {
                    let name_norm = util::normalize_name(&row.name);
                    let all_match = words.iter().all(|w| name_norm.contains(w.as_str()));
                    if all_match && util::is_relevant(&row.name, query) {
                        add(&mut candidates, &row.name, util::relevance(&row.name, query));
                    }
                }
            }
        }
    }

    // Strategy 3: the longest very-significant word alone
    if candidates.len() < ENOUGH_FOR_PRIMARY_WORD_PASS {
        let primary = words
            .iter()
            .filter(|w| w.len() >= 5)
            .max_by_key(|w| w.len());
        if let Some(primary) = primary {
            let word_pattern = format!("%{}%", primary);
            for schema in periods {
                for row in db
                    .period_rows_like(schema, &word_pattern)
                    .map_err(lookup_failed)?
                {
                    if util::is_relevant(&row.name, query) {
                        add(&mut candidates, &row.name, util::relevance(&row.name, query));
                    }
                }
            }
        }
    }

    // Strategy 4: separator-insensitive comparison in code; LIKE cannot see
    // through spacing differences, so scan the period's names.
    if candidates.is_empty() {
        let query_key = util::normalize_key(query);
        if query_key.len() >= 3 {
            for schema in periods {
                for row in db.period_all_rows(schema).map_err(lookup_failed)? {
                    let name_key = util::normalize_key(&row.name);
                    if name_key == query_key {
                        add(&mut candidates, &row.name, 90);
                    } else if name_key.contains(&query_key) {
                        add(&mut candidates, &row.name, 55);
                    }
                }
            }
        }
    }

    let mut ranked: Vec<Candidate> = candidates.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            util::similarity(&b.name, query)
                .partial_cmp(&util::similarity(&a.name, query))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        })
    });
    ranked.truncate(MAX_RESULTS);

    log::debug!(
        "company search '{}' returned {} candidate(s)",
        query,
        ranked.len()
    );
    Ok(ranked.into_iter().map(|c| c.name).collect())
}

/// Collect every contact email attached to the exact selected company names
/// across all periods.
///
/// Each hit is tagged with its period of provenance; the same email seen in
/// two periods yields two hits. The caller deduplicates by email for
/// presentation.
pub fn emails_for_companies(
    db: &MemberDb,
    periods: &[PeriodSchema],
    names: &[String],
) -> Result<Vec<EmailHit>, CoreError> {
    let mut hits = Vec::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        for schema in periods {
            for email in db
                .period_emails_for_name(schema, name)
                .map_err(lookup_failed)?
            {
                hits.push(EmailHit {
                    email,
                    company: name.to_string(),
                    period: schema.period,
                });
            }
        }
    }
    Ok(hits)
}
