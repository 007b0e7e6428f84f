//! Chat-driven onboarding flow.
//!
//! Guides a new signee through: search for their company's historical
//! survey records → claim the name variants that are theirs → pick the
//! canonical contact email → consolidate everything under one account.
//!
//! The whole flow is an explicit, serializable session value plus
//! transition functions — no ambient state — so it is unit-testable
//! without a UI harness. Transitions mutate the session only on success;
//! a failed lookup or gateway call leaves it unchanged, and the caller
//! retries the same step. `Consolidated` and `Skipped` are terminal:
//! re-entering them replays the stored outcome and performs no writes.
//!
//! States: Search → SelectCompanies → SelectEmail → Consolidated | Skipped.
//! There are no backward transitions, and every step can bail out to a
//! plain signup via `skip`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthProvider;
use crate::config::PeriodSchema;
use crate::consolidate::{self, ConsolidationRequest};
use crate::db::{DbIdentity, EmailHit, MemberDb};
use crate::error::CoreError;
use crate::locator;
use crate::roster::Role;
use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingState {
    Search,
    SelectCompanies,
    SelectEmail,
    Consolidated,
    Skipped,
}

/// Result of a finished flow, kept on the session so terminal states can be
/// re-entered idempotently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingOutcome {
    pub found: bool,
    pub email: Option<String>,
    pub updated: u64,
    /// Temporary credential issued during consolidation; shown once, then
    /// rotated by the user.
    pub temp_password: Option<String>,
}

/// The in-progress choice set. Created per onboarding session, discarded
/// when the flow completes or the user opts out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSession {
    pub state: OnboardingState,
    pub query: Option<String>,
    pub found_companies: Vec<String>,
    pub selected_companies: Vec<String>,
    /// Deduplicated by email for presentation; the first period a given
    /// email was seen in provides its provenance tag.
    pub found_emails: Vec<EmailHit>,
    pub selected_email: Option<String>,
    pub outcome: Option<OnboardingOutcome>,
}

/// What the conversational UI should render after a transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepReply {
    /// Candidate company names; the user selects all that are theirs.
    CompanyOptions { companies: Vec<String> },
    /// Discovered contact emails; the user picks the canonical one.
    EmailOptions { emails: Vec<EmailHit> },
    /// Nothing to consolidate (or the user opted out): plain signup.
    ProceedToSignup,
    /// Consolidation finished; credentials for the first login.
    Consolidated {
        updated: u64,
        email: String,
        temp_password: Option<String>,
    },
}

/// A fresh session at the search step.
pub fn start() -> OnboardingSession {
    OnboardingSession {
        state: OnboardingState::Search,
        query: None,
        found_companies: Vec::new(),
        selected_companies: Vec::new(),
        found_emails: Vec::new(),
        selected_email: None,
        outcome: None,
    }
}

/// Replay the stored outcome for a terminal session, if it is terminal.
fn terminal_reply(session: &OnboardingSession) -> Option<StepReply> {
    match session.state {
        OnboardingState::Consolidated => {
            let outcome = session.outcome.as_ref()?;
            Some(StepReply::Consolidated {
                updated: outcome.updated,
                email: outcome.email.clone().unwrap_or_default(),
                // Replays never re-issue the credential
                temp_password: None,
            })
        }
        OnboardingState::Skipped => Some(StepReply::ProceedToSignup),
        _ => None,
    }
}

fn enter_skipped(session: &mut OnboardingSession) {
    session.state = OnboardingState::Skipped;
    session.outcome = Some(OnboardingOutcome {
        found: false,
        email: None,
        updated: 0,
        temp_password: None,
    });
}

/// Search → SelectCompanies on matches, → Skipped on none.
pub fn submit_query(
    db: &MemberDb,
    periods: &[PeriodSchema],
    session: &mut OnboardingSession,
    query: &str,
) -> Result<StepReply, CoreError> {
    if let Some(reply) = terminal_reply(session) {
        return Ok(reply);
    }
    if session.state != OnboardingState::Search {
        return Err(CoreError::InvalidInput(
            "the flow is past the search step".into(),
        ));
    }

    let companies = locator::search_companies(db, periods, query)?;
    session.query = Some(query.trim().to_string());
    if companies.is_empty() {
        enter_skipped(session);
        return Ok(StepReply::ProceedToSignup);
    }

    session.found_companies = companies.clone();
    session.state = OnboardingState::SelectCompanies;
    Ok(StepReply::CompanyOptions { companies })
}

/// SelectCompanies → SelectEmail when emails exist for the claimed names,
/// → Skipped when none do.
pub fn confirm_companies(
    db: &MemberDb,
    periods: &[PeriodSchema],
    session: &mut OnboardingSession,
    selected: &[String],
) -> Result<StepReply, CoreError> {
    if let Some(reply) = terminal_reply(session) {
        return Ok(reply);
    }
    if session.state != OnboardingState::SelectCompanies {
        return Err(CoreError::InvalidInput(
            "the flow is not awaiting a company selection".into(),
        ));
    }

    let known: std::collections::HashSet<String> = session
        .found_companies
        .iter()
        .map(|c| util::normalize_name(c))
        .collect();
    let chosen: Vec<String> = selected
        .iter()
        .filter(|c| known.contains(&util::normalize_name(c)))
        .cloned()
        .collect();
    if chosen.is_empty() {
        return Err(CoreError::InvalidInput(
            "select at least one of the listed companies, or decline them".into(),
        ));
    }

    let hits = locator::emails_for_companies(db, periods, &chosen)?;

    // Dedupe by email for presentation; provenance of the first sighting wins.
    let mut seen = std::collections::HashSet::new();
    let emails: Vec<EmailHit> = hits
        .into_iter()
        .filter(|hit| seen.insert(hit.email.to_lowercase()))
        .collect();

    if emails.is_empty() {
        enter_skipped(session);
        return Ok(StepReply::ProceedToSignup);
    }

    session.selected_companies = chosen;
    session.found_emails = emails.clone();
    session.state = OnboardingState::SelectEmail;
    Ok(StepReply::EmailOptions { emails })
}

/// The user declares "none of these are my company": terminal skip.
pub fn decline_companies(session: &mut OnboardingSession) -> StepReply {
    if let Some(reply) = terminal_reply(session) {
        return reply;
    }
    enter_skipped(session);
    StepReply::ProceedToSignup
}

/// Abandon the flow from any state. Already-terminal sessions replay their
/// outcome instead.
pub fn skip(session: &mut OnboardingSession) -> StepReply {
    if let Some(reply) = terminal_reply(session) {
        return reply;
    }
    enter_skipped(session);
    StepReply::ProceedToSignup
}

/// SelectEmail → Consolidated: ensure the canonical account exists, then
/// rewrite every claimed record under it.
///
/// The account step issues a temporary credential — creating the account
/// when the email is new, rotating the password when it already exists —
/// and the consolidation engine then re-homes the records. Both steps are
/// idempotent, so a gateway failure here leaves the session in
/// `SelectEmail` and the same call can simply be made again.
pub async fn choose_email(
    db: &MemberDb,
    periods: &[PeriodSchema],
    auth: &dyn AuthProvider,
    session: &mut OnboardingSession,
    email: &str,
) -> Result<StepReply, CoreError> {
    if let Some(reply) = terminal_reply(session) {
        return Ok(reply);
    }
    if session.state != OnboardingState::SelectEmail {
        return Err(CoreError::InvalidInput(
            "the flow is not awaiting an email selection".into(),
        ));
    }

    let email = email.trim();
    let offered = session
        .found_emails
        .iter()
        .any(|hit| hit.email.eq_ignore_ascii_case(email));
    if !offered {
        return Err(CoreError::InvalidInput(format!(
            "'{}' was not among the discovered emails",
            email
        )));
    }

    // Ensure the canonical account, without touching the session yet.
    let temp_password = util::generate_temp_password(14);
    let account = match auth.find_account_by_email(email).await? {
        Some(existing) => {
            auth.update_password(&existing.id, &temp_password).await?;
            existing
        }
        None => {
            let metadata = serde_json::json!({
                "company_consolidated": true,
                "consolidated_at": Utc::now().to_rfc3339(),
            });
            auth.create_account(email, &temp_password, metadata).await?
        }
    };

    let now = Utc::now().to_rfc3339();
    db.upsert_identity(&DbIdentity {
        id: account.id.clone(),
        email: email.to_string(),
        company_name: session.selected_companies.first().cloned(),
        full_name: None,
        created_at: now.clone(),
        updated_at: now,
    })?;
    db.set_role(&account.id, email, Role::Viewer.as_str())?;

    let outcome = consolidate::consolidate(
        db,
        periods,
        &ConsolidationRequest {
            selected_companies: session.selected_companies.clone(),
            canonical_email: email.to_string(),
            primary_identity_id: account.id,
        },
    )?;

    session.selected_email = Some(email.to_string());
    session.state = OnboardingState::Consolidated;
    session.outcome = Some(OnboardingOutcome {
        found: true,
        email: Some(email.to_string()),
        updated: outcome.updated,
        temp_password: Some(temp_password.clone()),
    });

    log::info!(
        "onboarding consolidated {} record(s) under {}",
        outcome.updated,
        email
    );
    Ok(StepReply::Consolidated {
        updated: outcome.updated,
        email: email.to_string(),
        temp_password: Some(temp_password),
    })
}
