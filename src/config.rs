//! Configuration: period schema mapping and gateway endpoints.
//!
//! Every period's survey records live in their own table with their own
//! column names for "company" and "contact email". The mapping below is
//! data, not code: the locator, the consolidation engine, and the
//! assistant context builder all consult it, and adding a new survey
//! period is a configuration entry, never a new code path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, serde_json::Error),

    #[error("Invalid period mapping: {0}")]
    InvalidMapping(String),
}

/// Field-name mapping for one survey period's record set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodSchema {
    /// Submission cycle, e.g. 2021.
    pub period: u16,
    /// Backing table for this period.
    pub table: String,
    /// Columns holding a free-text company name. Later periods record both
    /// an organisation name and a fund name.
    pub name_columns: Vec<String>,
    /// Column holding the contact email, where the period captured one.
    #[serde(default)]
    pub email_column: Option<String>,
    /// Column holding the owning identity reference.
    pub owner_column: String,
    /// Column holding the submission status, where the period tracked one.
    #[serde(default)]
    pub status_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthGatewayConfig {
    /// Base URL of the managed auth admin API.
    pub base_url: String,
    /// Service-role key. Grants admin endpoints; never logged.
    pub service_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailGatewayConfig {
    #[serde(default = "default_mail_base_url")]
    pub base_url: String,
    pub api_key: String,
    /// From-address, e.g. "Fundnet <onboarding@fundnet.example>".
    pub sender: String,
}

fn default_mail_base_url() -> String {
    "https://api.resend.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantGatewayConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_assistant_model")]
    pub model: String,
}

fn default_assistant_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Override for the database location; defaults to ~/.fundnet/fundnet.db.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_periods")]
    pub periods: Vec<PeriodSchema>,
    #[serde(default)]
    pub auth: Option<AuthGatewayConfig>,
    #[serde(default)]
    pub mail: Option<MailGatewayConfig>,
    #[serde(default)]
    pub assistant: Option<AssistantGatewayConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: None,
            periods: default_periods(),
            auth: None,
            mail: None,
            assistant: None,
        }
    }
}

/// Built-in period mapping for the four historical survey cycles. The
/// column names genuinely differ per year; that drift is why the mapping
/// exists at all.
fn default_periods() -> Vec<PeriodSchema> {
    vec![
        PeriodSchema {
            period: 2021,
            table: "survey_responses_2021".into(),
            name_columns: vec!["firm_name".into()],
            email_column: Some("email_address".into()),
            owner_column: "user_id".into(),
            status_column: Some("submission_status".into()),
        },
        PeriodSchema {
            period: 2022,
            table: "survey_responses_2022".into(),
            name_columns: vec!["organisation".into()],
            email_column: Some("email".into()),
            owner_column: "user_id".into(),
            status_column: Some("submission_status".into()),
        },
        PeriodSchema {
            period: 2023,
            table: "survey_responses_2023".into(),
            name_columns: vec!["organisation_name".into(), "fund_name".into()],
            email_column: Some("email_address".into()),
            owner_column: "user_id".into(),
            status_column: Some("submission_status".into()),
        },
        PeriodSchema {
            period: 2024,
            table: "survey_responses_2024".into(),
            name_columns: vec!["organisation_name".into(), "fund_name".into()],
            email_column: Some("email_address".into()),
            owner_column: "user_id".into(),
            status_column: Some("submission_status".into()),
        },
    ]
}

impl Config {
    /// Load config from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `~/.fundnet/config.json` when present, otherwise the embedded
    /// defaults. A file on disk always overrides the defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Reject mappings that could not have come from a trusted deployment:
    /// table and column names are interpolated into SQL, so anything outside
    /// `[A-Za-z_][A-Za-z0-9_]*` is refused up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.periods.is_empty() {
            return Err(ConfigError::InvalidMapping("no periods configured".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for schema in &self.periods {
            if !seen.insert(schema.period) {
                return Err(ConfigError::InvalidMapping(format!(
                    "duplicate period {}",
                    schema.period
                )));
            }
            if schema.name_columns.is_empty() {
                return Err(ConfigError::InvalidMapping(format!(
                    "period {} has no name columns",
                    schema.period
                )));
            }
            let identifiers = std::iter::once(schema.table.as_str())
                .chain(schema.name_columns.iter().map(String::as_str))
                .chain(schema.email_column.as_deref())
                .chain(schema.status_column.as_deref())
                .chain(std::iter::once(schema.owner_column.as_str()));
            for ident in identifiers {
                if !is_sql_identifier(ident) {
                    return Err(ConfigError::InvalidMapping(format!(
                        "period {}: '{}' is not a valid identifier",
                        schema.period, ident
                    )));
                }
            }
        }
        Ok(())
    }
}

fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Resolve `~/.fundnet/config.json`.
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".fundnet")
        .join("config.json")
}
