//! Shared test fixtures: mock gateways and seeded database rows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::auth::{AuthAccount, AuthProvider};
use crate::db::{DbIdentity, MemberDb};
use crate::gateway::GatewayError;
use crate::mailer::Mailer;

/// Insert a primary identity profile.
pub fn company_identity(db: &MemberDb, id: &str, email: &str, company: &str) {
    let now = Utc::now().to_rfc3339();
    db.upsert_identity(&DbIdentity {
        id: id.into(),
        email: email.into(),
        company_name: Some(company.into()),
        full_name: None,
        created_at: now.clone(),
        updated_at: now,
    })
    .unwrap();
}

/// In-memory stand-in for the managed auth service.
pub struct MockAuthProvider {
    accounts: Mutex<HashMap<String, AuthAccount>>,
    created: Mutex<Vec<String>>,
    password_updates: Mutex<Vec<(String, String)>>,
    resets: Mutex<Vec<String>>,
    next_id: AtomicU32,
    fail: AtomicBool,
}

impl MockAuthProvider {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            password_updates: Mutex::new(Vec::new()),
            resets: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            fail: AtomicBool::new(false),
        }
    }

    pub fn seed_account(&self, id: &str, email: &str) {
        self.accounts.lock().unwrap().insert(
            email.to_lowercase(),
            AuthAccount {
                id: id.into(),
                email: email.to_lowercase(),
                email_confirmed: true,
            },
        );
    }

    /// Make every subsequent call fail with a retryable gateway error.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }

    pub fn created_emails(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn password_updates(&self) -> Vec<(String, String)> {
        self.password_updates.lock().unwrap().clone()
    }

    pub fn reset_emails(&self) -> Vec<String> {
        self.resets.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(GatewayError::Api {
                status: 503,
                message: "mock outage".into(),
            });
        }
        Ok(())
    }
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AuthAccount>, GatewayError> {
        self.check_available()?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(&email.trim().to_lowercase())
            .cloned())
    }

    async fn create_account(
        &self,
        email: &str,
        _password: &str,
        _metadata: serde_json::Value,
    ) -> Result<AuthAccount, GatewayError> {
        self.check_available()?;
        let key = email.trim().to_lowercase();
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&key) {
            return Err(GatewayError::Api {
                status: 422,
                message: "email already registered".into(),
            });
        }
        let id = format!("auth-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let account = AuthAccount {
            id,
            email: key.clone(),
            email_confirmed: true,
        };
        accounts.insert(key.clone(), account.clone());
        self.created.lock().unwrap().push(key);
        Ok(account)
    }

    async fn update_password(
        &self,
        account_id: &str,
        password: &str,
    ) -> Result<(), GatewayError> {
        self.check_available()?;
        self.password_updates
            .lock()
            .unwrap()
            .push((account_id.to_string(), password.to_string()));
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), GatewayError> {
        self.check_available()?;
        self.resets.lock().unwrap().push(email.to_lowercase());
        Ok(())
    }
}

/// Mail gateway that records instead of sending.
pub struct MockMailer {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect()
    }
}

impl Default for MockMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), GatewayError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(GatewayError::Api {
                status: 500,
                message: "mock mail outage".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}
