//! Managed auth service client.
//!
//! The platform never stores credentials itself: account creation, password
//! rotation, and reset emails all go through the hosted auth service's
//! admin REST API. The trait is the seam the roster and onboarding flows
//! depend on; tests substitute a mock.
//!
//! Accounts created here are auto-confirmed — the add-member and
//! consolidation paths hand the user a temporary credential directly, so
//! no confirmation loop may block the first login.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AuthGatewayConfig;
use crate::gateway::{error_for_response, send_with_retry, GatewayError, RetryPolicy};

/// An account as the auth service reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthAccount {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_confirmed: bool,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exact-match lookup by email (case-insensitive).
    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AuthAccount>, GatewayError>;

    /// Create an auto-confirmed account. The metadata travels with the
    /// account for audit (who provisioned it and why).
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<AuthAccount, GatewayError>;

    /// Rotate an account's password to a caller-supplied credential.
    async fn update_password(
        &self,
        account_id: &str,
        password: &str,
    ) -> Result<(), GatewayError>;

    /// Ask the auth service to send its password-reset email.
    async fn send_password_reset(&self, email: &str) -> Result<(), GatewayError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Deserialize)]
struct AdminUserList {
    #[serde(default)]
    users: Vec<AdminUser>,
}

#[derive(Debug, Deserialize)]
struct AdminUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
}

impl From<AdminUser> for AuthAccount {
    fn from(user: AdminUser) -> Self {
        AuthAccount {
            id: user.id,
            email: user.email.unwrap_or_default(),
            email_confirmed: user.email_confirmed_at.is_some(),
        }
    }
}

/// Client for a GoTrue-style admin API, authenticated with the service-role
/// key from configuration.
pub struct HttpAuthProvider {
    config: AuthGatewayConfig,
}

impl HttpAuthProvider {
    pub fn new(config: AuthGatewayConfig) -> Self {
        Self { config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AuthAccount>, GatewayError> {
        let client = reqwest::Client::new();
        let resp = send_with_retry(
            client
                .get(self.url("admin/users"))
                .bearer_auth(&self.config.service_key)
                .query(&[("email", email)]),
            &RetryPolicy::default(),
        )
        .await?;

        if !resp.status().is_success() {
            return Err(error_for_response(resp).await);
        }

        let list: AdminUserList = resp.json().await?;
        let wanted = email.trim().to_lowercase();
        Ok(list
            .users
            .into_iter()
            .find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.trim().to_lowercase() == wanted)
            })
            .map(AuthAccount::from))
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<AuthAccount, GatewayError> {
        let client = reqwest::Client::new();
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "email_confirm": true,
            "user_metadata": metadata,
        });
        // Creation is not idempotent; never retried.
        let resp = send_with_retry(
            client
                .post(self.url("admin/users"))
                .bearer_auth(&self.config.service_key)
                .json(&body),
            &RetryPolicy::none(),
        )
        .await?;

        if !resp.status().is_success() {
            return Err(error_for_response(resp).await);
        }

        let user: AdminUser = resp.json().await?;
        if user.id.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "account created but no id returned".into(),
            ));
        }
        Ok(AuthAccount::from(user))
    }

    async fn update_password(
        &self,
        account_id: &str,
        password: &str,
    ) -> Result<(), GatewayError> {
        let client = reqwest::Client::new();
        let body = serde_json::json!({
            "password": password,
            "email_confirm": true,
        });
        let resp = send_with_retry(
            client
                .put(self.url(&format!("admin/users/{}", account_id)))
                .bearer_auth(&self.config.service_key)
                .json(&body),
            &RetryPolicy::default(),
        )
        .await?;

        if !resp.status().is_success() {
            return Err(error_for_response(resp).await);
        }
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), GatewayError> {
        let client = reqwest::Client::new();
        let resp = send_with_retry(
            client
                .post(self.url("recover"))
                .bearer_auth(&self.config.service_key)
                .json(&serde_json::json!({ "email": email })),
            &RetryPolicy::none(),
        )
        .await?;

        if !resp.status().is_success() {
            return Err(error_for_response(resp).await);
        }
        Ok(())
    }
}
