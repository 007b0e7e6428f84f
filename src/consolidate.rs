//! Consolidation Engine.
//!
//! Rewrites the owning identity of every historical survey record carrying
//! one of the selected company-name variants so that the whole history
//! hangs off one primary identity, and normalizes the records' contact
//! email to the chosen canonical address.
//!
//! The rewrite is a set-based "ensure owned by": records already owned by
//! the primary re-match and re-count, so running it twice reports the same
//! total and changes nothing the second time. Each period runs inside an
//! immediate transaction, which serializes concurrent consolidations that
//! touch overlapping names instead of letting them interleave per record.
//!
//! Cross-period semantics are best-effort: a failure mid-sequence surfaces
//! as `PartialConsolidation` with the count applied so far, and a re-run
//! converges because earlier periods re-match idempotently.

use crate::config::PeriodSchema;
use crate::db::MemberDb;
use crate::error::CoreError;
use crate::util;

#[derive(Debug, Clone)]
pub struct ConsolidationRequest {
    /// Exact company-name variants the user claimed as theirs.
    pub selected_companies: Vec<String>,
    /// The one email all claimed records are normalized to. Not required to
    /// exist as an identity; the engine never creates or mutates identities.
    pub canonical_email: String,
    pub primary_identity_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationOutcome {
    /// Records matched and rewritten across all periods.
    pub updated: u64,
}

/// Ensure every record matching the selected names is owned by the primary
/// identity. See the module docs for idempotency and failure semantics.
pub fn consolidate(
    db: &MemberDb,
    periods: &[PeriodSchema],
    request: &ConsolidationRequest,
) -> Result<ConsolidationOutcome, CoreError> {
    if request.primary_identity_id.trim().is_empty() {
        return Err(CoreError::InvalidInput(
            "primary identity id is required".into(),
        ));
    }
    if !util::is_valid_email(&request.canonical_email) {
        return Err(CoreError::InvalidInput(format!(
            "'{}' is not a valid email address",
            request.canonical_email
        )));
    }

    // The selection is a set: the same spelling twice must not double-count
    // the rows it matches. Matching is case-insensitive-exact, so the dedupe
    // key is the lowercased spelling, nothing looser.
    let mut names: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for name in &request.selected_companies {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            names.push(trimmed.to_string());
        }
    }
    if names.is_empty() {
        return Ok(ConsolidationOutcome { updated: 0 });
    }

    let mut ordered: Vec<&PeriodSchema> = periods.iter().collect();
    ordered.sort_by_key(|s| s.period);

    let mut total: u64 = 0;
    for schema in ordered {
        let period_total = db.with_transaction(|tx| {
            tx.period_claim_records(
                schema,
                &names,
                &request.primary_identity_id,
                Some(request.canonical_email.as_str()),
            )
        });

        match period_total {
            Ok(n) => {
                if n > 0 {
                    log::info!(
                        "consolidation: period {} rewrote {} record(s) to {}",
                        schema.period,
                        n,
                        request.primary_identity_id
                    );
                }
                total += n;
            }
            Err(source) => {
                log::warn!(
                    "consolidation: period {} failed after {} record(s): {}",
                    schema.period,
                    total,
                    source
                );
                return Err(CoreError::PartialConsolidation {
                    updated: total,
                    period: schema.period,
                    source,
                });
            }
        }
    }

    Ok(ConsolidationOutcome { updated: total })
}
