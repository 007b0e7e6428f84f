//! Team Roster Manager.
//!
//! A company (primary identity) carries a roster of secondary identities.
//! Roster rows are never re-parented: moving a member to another company is
//! delete-and-recreate. Removing a member deletes only the roster row; the
//! person keeps their account and reverts to an unaffiliated identity.
//!
//! Also home to the adjacent identity operations the admin console uses:
//! account lookup, public signup, and the member activity log.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::db::{DbIdentity, DbMembership, MemberDb};
use crate::error::CoreError;
use crate::mailer::{self, Mailer};
use crate::util;

// ---------------------------------------------------------------------------
// Authorization context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
            Role::Viewer => "viewer",
        }
    }

    pub fn from_str_lossy(value: &str) -> Role {
        match value {
            "admin" => Role::Admin,
            "member" => Role::Member,
            _ => Role::Viewer,
        }
    }
}

/// The authenticated caller of a roster operation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins act on any company; a primary acts on its own roster.
    fn may_manage(&self, company_user_id: &str) -> bool {
        self.is_admin() || self.user_id == company_user_id
    }
}

// ---------------------------------------------------------------------------
// Add / update / remove
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AddMemberRequest {
    pub company_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role_in_company: Option<String>,
    /// Temporary credential for a provisioned account; the caller rotates it
    /// out-of-band.
    pub temp_password: String,
}

/// Add a secondary identity to a company's roster.
///
/// Provisions an auto-confirmed account through the auth service when the
/// email is unknown, reuses the existing account otherwise. Fails with
/// `DuplicateMembership` — before any write — when the target identity is
/// already on any company's roster.
pub async fn add_member(
    db: &MemberDb,
    auth: &dyn AuthProvider,
    mail: Option<&dyn Mailer>,
    actor: &Actor,
    request: &AddMemberRequest,
) -> Result<DbMembership, CoreError> {
    if !actor.is_admin() {
        return Err(CoreError::Forbidden(
            "only administrators may add company members".into(),
        ));
    }
    let email = request.email.trim();
    if !util::is_valid_email(email) {
        return Err(CoreError::InvalidInput(format!(
            "'{}' is not a valid email address",
            email
        )));
    }
    if request.temp_password.len() < 8 {
        return Err(CoreError::InvalidInput(
            "password must be at least 8 characters long".into(),
        ));
    }

    let company = db
        .get_identity(&request.company_id)?
        .ok_or_else(|| CoreError::NotFound(format!("company {}", request.company_id)))?;

    let display_name = request
        .display_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| util::display_name_from_email(email));

    let member_user_id = match auth.find_account_by_email(email).await? {
        Some(existing) => {
            // Roster exclusivity: one active membership per identity, under
            // any company. Checked before any write happens.
            if db.membership_for_member(&existing.id)?.is_some() {
                return Err(CoreError::DuplicateMembership {
                    email: email.to_string(),
                });
            }
            existing.id
        }
        None => {
            let metadata = serde_json::json!({
                "company_name": company.company_name,
                "is_secondary_member": true,
                "parent_company_id": company.id,
                "created_via": "admin_add_member",
            });
            let account = auth
                .create_account(email, &request.temp_password, metadata)
                .await?;
            log::info!("provisioned secondary account {} for {}", account.id, email);
            account.id
        }
    };

    let now = Utc::now().to_rfc3339();
    db.upsert_identity(&DbIdentity {
        id: member_user_id.clone(),
        email: email.to_string(),
        company_name: company.company_name.clone(),
        full_name: Some(display_name.clone()),
        created_at: now.clone(),
        updated_at: now.clone(),
    })?;
    db.set_role(&member_user_id, email, Role::Member.as_str())?;

    let membership = DbMembership {
        id: Uuid::new_v4().to_string(),
        company_user_id: company.id.clone(),
        member_user_id,
        member_email: email.to_lowercase(),
        member_name: Some(display_name.clone()),
        role_in_company: request.role_in_company.clone(),
        is_active: true,
        invited_by: Some(actor.user_id.clone()),
        created_at: now,
    };
    db.insert_membership(&membership)?;

    if let Some(mail) = mail {
        let (subject, html) = mailer::welcome_email(&display_name, company.company_name.as_deref());
        if let Err(e) = mail.send(email, &subject, &html).await {
            // Fire-and-forget: the roster write stands, the failure is signalled.
            log::warn!("welcome mail to {} failed: {}", email, e);
        }
    }

    Ok(membership)
}

#[derive(Debug, Clone, Default)]
pub struct MemberUpdate {
    pub member_name: Option<String>,
    pub role_in_company: Option<String>,
}

/// Update a member's display name and/or role-in-company. Ownership fields
/// are immutable by design.
pub fn update_member(
    db: &MemberDb,
    actor: &Actor,
    membership_id: &str,
    update: &MemberUpdate,
) -> Result<DbMembership, CoreError> {
    let membership = db
        .get_membership(membership_id)?
        .ok_or_else(|| CoreError::NotFound(format!("membership {}", membership_id)))?;
    if !actor.may_manage(&membership.company_user_id) {
        return Err(CoreError::Forbidden(
            "only the owning company or an administrator may edit a membership".into(),
        ));
    }

    db.update_membership_fields(
        membership_id,
        update.member_name.as_deref(),
        update.role_in_company.as_deref(),
    )?;
    let updated = db
        .get_membership(membership_id)?
        .ok_or_else(|| CoreError::NotFound(format!("membership {}", membership_id)))?;
    Ok(updated)
}

/// Delete a roster row. The underlying identity keeps its account and
/// loses only company-scoped visibility.
pub fn remove_member(
    db: &MemberDb,
    actor: &Actor,
    membership_id: &str,
) -> Result<(), CoreError> {
    let membership = db
        .get_membership(membership_id)?
        .ok_or_else(|| CoreError::NotFound(format!("membership {}", membership_id)))?;
    if !actor.may_manage(&membership.company_user_id) {
        return Err(CoreError::Forbidden(
            "only the owning company or an administrator may remove a member".into(),
        ));
    }

    if !db.delete_membership(membership_id)? {
        return Err(CoreError::NotFound(format!("membership {}", membership_id)));
    }
    log::info!(
        "removed member {} from company {}",
        membership.member_user_id,
        membership.company_user_id
    );
    Ok(())
}

/// The primary/secondary discriminator for the current user: Some when the
/// identity sits on a roster (secondary), None when it is a primary.
pub fn membership_for(
    db: &MemberDb,
    member_user_id: &str,
) -> Result<Option<DbMembership>, CoreError> {
    Ok(db.membership_for_member(member_user_id)?)
}

/// Roster of one company, visible to admins and the company itself.
pub fn list_members(
    db: &MemberDb,
    actor: &Actor,
    company_user_id: &str,
) -> Result<Vec<DbMembership>, CoreError> {
    if !actor.may_manage(company_user_id) {
        return Err(CoreError::Forbidden("not your roster".into()));
    }
    Ok(db.list_members_for_company(company_user_id)?)
}

// ---------------------------------------------------------------------------
// Member activity log
// ---------------------------------------------------------------------------

/// Record an action by the current user when they are a team member.
/// Primaries produce no entries; the call is a no-op for them.
pub fn record_activity(
    db: &MemberDb,
    member_user_id: &str,
    action_type: &str,
    action_label: &str,
    entity: Option<(&str, &str)>,
    details: Option<&serde_json::Value>,
) -> Result<(), CoreError> {
    let Some(membership) = db.membership_for_member(member_user_id)? else {
        return Ok(());
    };
    let details_json = details.map(|d| d.to_string());
    db.log_member_activity(
        &membership.company_user_id,
        &membership.member_user_id,
        &membership.member_email,
        membership.member_name.as_deref(),
        action_type,
        action_label,
        entity.map(|(t, _)| t),
        entity.map(|(_, id)| id),
        details_json.as_deref(),
    )?;
    Ok(())
}

/// Team activity for one company, newest first.
pub fn activity_for_company(
    db: &MemberDb,
    actor: &Actor,
    company_user_id: &str,
    limit: i64,
) -> Result<Vec<crate::db::DbActivityEntry>, CoreError> {
    if !actor.may_manage(company_user_id) {
        return Err(CoreError::Forbidden("not your roster".into()));
    }
    Ok(db.list_member_activity(company_user_id, limit)?)
}

// ---------------------------------------------------------------------------
// Account lookup & public signup
// ---------------------------------------------------------------------------

/// One admin-console search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountHit {
    pub email: String,
    pub company_name: String,
}

const ACCOUNT_LOOKUP_CAP: usize = 25;

/// Substring search over identity profiles by email or company name.
pub fn search_accounts(db: &MemberDb, query: &str) -> Result<Vec<AccountHit>, CoreError> {
    let query = query.trim();
    if query.chars().count() < 2 {
        return Err(CoreError::InvalidInput(
            "Enter at least 2 characters to search".into(),
        ));
    }

    let rows = db
        .search_identities(query, (ACCOUNT_LOOKUP_CAP * 2) as i64)
        .map_err(CoreError::LookupFailed)?;

    let mut seen = std::collections::HashSet::new();
    let mut hits = Vec::new();
    for row in rows {
        let company = row.company_name.unwrap_or_default();
        let key = format!("{}|{}", row.email.to_lowercase(), company.to_lowercase());
        if !seen.insert(key) {
            continue;
        }
        hits.push(AccountHit {
            email: row.email,
            company_name: company,
        });
        if hits.len() == ACCOUNT_LOOKUP_CAP {
            break;
        }
    }
    Ok(hits)
}

/// Start a password reset for an account. Whether the email exists is never
/// revealed to the caller; the reset fires only when it does.
pub async fn request_password_reset(
    db: &MemberDb,
    auth: &dyn AuthProvider,
    email: &str,
) -> Result<(), CoreError> {
    let email = email.trim();
    if !util::is_valid_email(email) {
        return Err(CoreError::InvalidInput(format!(
            "'{}' is not a valid email address",
            email
        )));
    }
    if db.find_identity_by_email(email)?.is_some() {
        auth.send_password_reset(email).await?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
}

/// Provision a new primary identity: auto-confirmed auth account, profile
/// row, viewer role, welcome mail.
pub async fn public_signup(
    db: &MemberDb,
    auth: &dyn AuthProvider,
    mail: Option<&dyn Mailer>,
    request: &SignupRequest,
) -> Result<DbIdentity, CoreError> {
    let email = request.email.trim();
    if !util::is_valid_email(email) {
        return Err(CoreError::InvalidInput(format!(
            "'{}' is not a valid email address",
            email
        )));
    }
    if request.password.len() < 8 {
        return Err(CoreError::InvalidInput(
            "password must be at least 8 characters long".into(),
        ));
    }
    if auth.find_account_by_email(email).await?.is_some() {
        return Err(CoreError::InvalidInput(
            "an account with this email already exists; sign in instead".into(),
        ));
    }

    let metadata = serde_json::json!({
        "first_name": request.first_name,
        "last_name": request.last_name,
        "company_name": request.company_name,
        "created_via": "public_signup",
    });
    let account = auth
        .create_account(email, &request.password, metadata)
        .await?;

    let display_name = match (&request.first_name, &request.last_name) {
        (Some(first), Some(last)) => format!("{} {}", first.trim(), last.trim()),
        (Some(first), None) => first.trim().to_string(),
        _ => util::display_name_from_email(email),
    };
    let company_name = request
        .company_name
        .clone()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| display_name.clone());

    let now = Utc::now().to_rfc3339();
    let identity = DbIdentity {
        id: account.id,
        email: email.to_string(),
        company_name: Some(company_name),
        full_name: Some(display_name.clone()),
        created_at: now.clone(),
        updated_at: now,
    };
    db.upsert_identity(&identity)?;
    db.set_role(&identity.id, email, Role::Viewer.as_str())?;

    if let Some(mail) = mail {
        let (subject, html) =
            mailer::welcome_email(&display_name, identity.company_name.as_deref());
        if let Err(e) = mail.send(email, &subject, &html).await {
            log::warn!("welcome mail to {} failed: {}", email, e);
        }
    }

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testutil::{company_identity, MockAuthProvider, MockMailer};

    fn admin() -> Actor {
        Actor {
            user_id: "admin-1".into(),
            role: Role::Admin,
        }
    }

    fn add_request(company: &str, email: &str) -> AddMemberRequest {
        AddMemberRequest {
            company_id: company.into(),
            email: email.into(),
            display_name: Some("Ana Lyst".into()),
            role_in_company: Some("Analyst".into()),
            temp_password: "temporary-pass-1".into(),
        }
    }

    #[tokio::test]
    async fn test_add_member_provisions_secondary_account() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        let auth = MockAuthProvider::new();
        let mail = MockMailer::new();

        let membership = add_member(
            &db,
            &auth,
            Some(&mail),
            &admin(),
            &add_request("c1", "ana@acme.fund"),
        )
        .await
        .unwrap();

        assert_eq!(membership.company_user_id, "c1");
        assert_eq!(membership.member_email, "ana@acme.fund");
        assert_eq!(auth.created_emails(), vec!["ana@acme.fund"]);

        // Profile + member role landed, and the new identity is secondary
        let profile = db.find_identity_by_email("ana@acme.fund").unwrap().unwrap();
        assert_eq!(profile.company_name.as_deref(), Some("Acme Fund"));
        assert_eq!(
            db.get_role(&membership.member_user_id).unwrap().as_deref(),
            Some("member")
        );
        assert!(membership_for(&db, &membership.member_user_id)
            .unwrap()
            .is_some());
        assert_eq!(mail.sent_to(), vec!["ana@acme.fund"]);
    }

    #[tokio::test]
    async fn test_add_member_reuses_existing_account() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        let auth = MockAuthProvider::new();
        auth.seed_account("u-77", "ana@acme.fund");

        let membership = add_member(
            &db,
            &auth,
            None,
            &admin(),
            &add_request("c1", "Ana@Acme.Fund"),
        )
        .await
        .unwrap();

        assert_eq!(membership.member_user_id, "u-77");
        assert!(auth.created_emails().is_empty(), "no account provisioned");
    }

    #[tokio::test]
    async fn test_duplicate_membership_performs_no_write() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        company_identity(&db, "c2", "ops@zebra.co", "Zebra Holdings");
        let auth = MockAuthProvider::new();

        add_member(&db, &auth, None, &admin(), &add_request("c1", "ana@acme.fund"))
            .await
            .unwrap();
        let rosters_before = db.list_all_memberships().unwrap().len();

        let err = add_member(&db, &auth, None, &admin(), &add_request("c2", "ana@acme.fund"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateMembership);
        assert_eq!(db.list_all_memberships().unwrap().len(), rosters_before);
    }

    #[tokio::test]
    async fn test_add_member_authorization_and_validation() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        let auth = MockAuthProvider::new();

        let viewer = Actor {
            user_id: "v1".into(),
            role: Role::Viewer,
        };
        let err = add_member(&db, &auth, None, &viewer, &add_request("c1", "a@b.co"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = add_member(&db, &auth, None, &admin(), &add_request("c1", "not-an-email"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let mut short = add_request("c1", "a@b.co");
        short.temp_password = "short".into();
        let err = add_member(&db, &auth, None, &admin(), &short).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = add_member(&db, &auth, None, &admin(), &add_request("ghost", "a@b.co"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_member_fields_only() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        let auth = MockAuthProvider::new();
        let membership = add_member(&db, &auth, None, &admin(), &add_request("c1", "ana@acme.fund"))
            .await
            .unwrap();

        // The owning primary may edit its own roster
        let owner = Actor {
            user_id: "c1".into(),
            role: Role::Viewer,
        };
        let updated = update_member(
            &db,
            &owner,
            &membership.id,
            &MemberUpdate {
                member_name: Some("Ana L.".into()),
                role_in_company: None,
            },
        )
        .unwrap();
        assert_eq!(updated.member_name.as_deref(), Some("Ana L."));
        assert_eq!(updated.role_in_company.as_deref(), Some("Analyst"));
        assert_eq!(updated.company_user_id, "c1");

        // An unrelated primary may not
        let stranger = Actor {
            user_id: "c9".into(),
            role: Role::Member,
        };
        let err = update_member(&db, &stranger, &membership.id, &MemberUpdate::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = update_member(&db, &admin(), "ghost", &MemberUpdate::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_remove_member_keeps_identity() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        let auth = MockAuthProvider::new();
        let membership = add_member(&db, &auth, None, &admin(), &add_request("c1", "ana@acme.fund"))
            .await
            .unwrap();

        remove_member(&db, &admin(), &membership.id).unwrap();
        // The person reverts to an unaffiliated, primary-like identity
        assert!(membership_for(&db, &membership.member_user_id).unwrap().is_none());
        assert!(db.find_identity_by_email("ana@acme.fund").unwrap().is_some());

        let err = remove_member(&db, &admin(), &membership.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_activity_log_is_company_scoped() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        let auth = MockAuthProvider::new();
        let membership = add_member(&db, &auth, None, &admin(), &add_request("c1", "ana@acme.fund"))
            .await
            .unwrap();

        record_activity(
            &db,
            &membership.member_user_id,
            "blog_post",
            "Published a blog post",
            Some(("blog", "b-1")),
            Some(&serde_json::json!({"title": "Q3 outlook"})),
        )
        .unwrap();
        // A primary produces no entry
        record_activity(&db, "c1", "blog_post", "x", None, None).unwrap();

        let entries = activity_for_company(&db, &admin(), "c1", 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_type, "blog_post");

        let stranger = Actor {
            user_id: "c9".into(),
            role: Role::Viewer,
        };
        assert!(activity_for_company(&db, &stranger, "c1", 10).is_err());
    }

    #[test]
    fn test_search_accounts_dedupes_and_validates() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        company_identity(&db, "c2", "info@acme.fund", "Acme Fund");

        let err = search_accounts(&db, "a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let hits = search_accounts(&db, "acme").unwrap();
        assert_eq!(hits.len(), 2, "distinct emails are both kept");
        assert!(hits.iter().all(|h| h.company_name == "Acme Fund"));
    }

    #[tokio::test]
    async fn test_mail_outage_does_not_fail_add_member() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        let auth = MockAuthProvider::new();
        let mail = MockMailer::new();
        mail.set_failing(true);

        let membership = add_member(
            &db,
            &auth,
            Some(&mail),
            &admin(),
            &add_request("c1", "ana@acme.fund"),
        )
        .await
        .expect("roster write stands even when the welcome mail fails");
        assert!(db.get_membership(&membership.id).unwrap().is_some());
        assert!(mail.sent_to().is_empty());
    }

    #[tokio::test]
    async fn test_password_reset_fires_only_for_known_accounts() {
        let db = MemberDb::open_in_memory().unwrap();
        company_identity(&db, "c1", "ops@acme.fund", "Acme Fund");
        let auth = MockAuthProvider::new();

        request_password_reset(&db, &auth, "ops@acme.fund").await.unwrap();
        assert_eq!(auth.reset_emails(), vec!["ops@acme.fund"]);

        // Unknown address: same success, no reset dispatched
        request_password_reset(&db, &auth, "ghost@nowhere.co").await.unwrap();
        assert_eq!(auth.reset_emails().len(), 1);

        let err = request_password_reset(&db, &auth, "not-an-email").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_public_signup_provisions_primary() {
        let db = MemberDb::open_in_memory().unwrap();
        let auth = MockAuthProvider::new();
        let request = SignupRequest {
            email: "new@fund.example".into(),
            password: "long-enough-pass".into(),
            first_name: Some("Jo".into()),
            last_name: Some("Fund".into()),
            company_name: Some("Jo Fund Capital".into()),
        };

        let identity = public_signup(&db, &auth, None, &request).await.unwrap();
        assert_eq!(identity.company_name.as_deref(), Some("Jo Fund Capital"));
        assert_eq!(db.get_role(&identity.id).unwrap().as_deref(), Some("viewer"));
        assert!(membership_for(&db, &identity.id).unwrap().is_none());

        // Second signup with the same email is a conflict
        let err = public_signup(&db, &auth, None, &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
