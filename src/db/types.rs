//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// A row from `user_profiles`: one identity, primary or secondary. Whether
/// it is secondary is not stored here — it is derived from the presence of
/// an active `company_members` row naming it as member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbIdentity {
    pub id: String,
    pub email: String,
    pub company_name: Option<String>,
    pub full_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from `company_members`: one secondary identity on one company's
/// roster. Never re-parented; deleted and recreated instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMembership {
    pub id: String,
    pub company_user_id: String,
    pub member_user_id: String,
    pub member_email: String,
    pub member_name: Option<String>,
    pub role_in_company: Option<String>,
    pub is_active: bool,
    pub invited_by: Option<String>,
    pub created_at: String,
}

/// A row from `member_activity_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbActivityEntry {
    pub id: i64,
    pub company_user_id: String,
    pub member_user_id: String,
    pub member_email: String,
    pub member_name: Option<String>,
    pub action_type: String,
    pub action_label: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    /// JSON payload; opaque to the store.
    pub details: Option<String>,
    pub created_at: String,
}

/// A historical survey record viewed through its period's field mapping.
/// The underlying tables have different column names per period; this is
/// the typed accessor the rest of the crate sees.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalRecord {
    pub period: u16,
    pub record_id: i64,
    pub company_name: String,
    pub email: Option<String>,
    pub owner_id: Option<String>,
}

/// One (name, email) pair read from a period table during a search pass.
#[derive(Debug, Clone)]
pub struct PeriodRow {
    pub name: String,
    pub email: Option<String>,
}

/// A contact email discovered for a selected company, tagged with the
/// period it came from. The period is provenance and is never collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailHit {
    pub email: String,
    pub company: String,
    pub period: u16,
}
