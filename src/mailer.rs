//! Transactional mail gateway.
//!
//! Fire-and-forget contract: the caller learns whether the send call
//! itself failed, nothing more. No delivery guarantees, no retries —
//! duplicate onboarding mail is worse than missing mail.

use async_trait::async_trait;

use crate::config::MailGatewayConfig;
use crate::gateway::{error_for_response, send_with_retry, GatewayError, RetryPolicy};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), GatewayError>;
}

/// Client for a Resend-style transactional mail API.
pub struct HttpMailer {
    config: MailGatewayConfig,
}

impl HttpMailer {
    pub fn new(config: MailGatewayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), GatewayError> {
        let client = reqwest::Client::new();
        let body = serde_json::json!({
            "from": self.config.sender,
            "to": [to],
            "subject": subject,
            "html": html,
        });
        let resp = send_with_retry(
            client
                .post(format!(
                    "{}/emails",
                    self.config.base_url.trim_end_matches('/')
                ))
                .bearer_auth(&self.config.api_key)
                .json(&body),
            &RetryPolicy::none(),
        )
        .await?;

        if !resp.status().is_success() {
            return Err(error_for_response(resp).await);
        }
        log::debug!("mail gateway accepted '{}' for {}", subject, to);
        Ok(())
    }
}

// ============================================================================
// Message builders
// ============================================================================

/// Welcome mail for a newly provisioned account.
pub fn welcome_email(display_name: &str, company_name: Option<&str>) -> (String, String) {
    let subject = "Welcome to the network".to_string();
    let company_line = match company_name {
        Some(company) => format!(
            "<p>Your account is set up under <strong>{}</strong>.</p>",
            escape_html(company)
        ),
        None => String::new(),
    };
    let html = format!(
        "<h2>Welcome, {name}!</h2>\
         {company_line}\
         <p>You can sign in with your email address. If you received a temporary \
         password, please change it after your first login.</p>\
         <p>— The membership team</p>",
        name = escape_html(display_name),
    );
    (subject, html)
}

/// Password-reset notification carrying the reset link produced by the auth
/// service.
pub fn password_reset_email(display_name: &str, reset_link: &str) -> (String, String) {
    let subject = "Reset your password".to_string();
    let html = format!(
        "<h2>Hello {name},</h2>\
         <p>We received a request to reset your password. Follow the link below \
         to choose a new one. The link expires after one hour.</p>\
         <p><a href=\"{link}\">Reset password</a></p>\
         <p>If you did not request this, you can ignore this message.</p>",
        name = escape_html(display_name),
        link = reset_link,
    );
    (subject, html)
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
