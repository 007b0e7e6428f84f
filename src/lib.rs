//! fundnet — membership and survey-consolidation backend for the
//! fund-manager network platform.
//!
//! The qualifying core is the identity-consolidation and team-membership
//! subsystem: a locator over per-period historical survey record sets, a
//! consolidation engine that re-homes records under one canonical primary
//! identity, a roster of secondary "team member" identities per company,
//! and the chat-style onboarding state machine that drives the three.
//! Auth, transactional mail, and the AI chat gateway are external services
//! reached through narrow trait seams.

pub mod assistant;
pub mod auth;
pub mod config;
pub mod consolidate;
pub mod db;
pub mod error;
pub mod gateway;
pub mod locator;
pub mod mailer;
mod migrations;
pub mod onboarding;
pub mod roster;
pub mod util;

#[cfg(test)]
pub mod testutil;

pub use config::Config;
pub use db::MemberDb;
pub use error::{CoreError, ErrorKind, OperationError};

/// Initialize logging from `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();
}

/// Convenience bundle for embedding callers: configuration plus an open
/// database. Every operation in the crate takes these explicitly, so this
/// is wiring, not state.
pub struct Platform {
    pub config: Config,
    pub db: MemberDb,
}

impl Platform {
    /// Load configuration (embedded defaults when no file exists) and open
    /// the database it points at.
    pub fn open() -> Result<Self, db::DbError> {
        let config = match Config::load_default() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {e}. Using embedded defaults.");
                Config::default()
            }
        };
        let db = match &config.db_path {
            Some(path) => MemberDb::open_at(path.clone())?,
            None => MemberDb::open()?,
        };
        Ok(Self { config, db })
    }

    pub fn periods(&self) -> &[config::PeriodSchema] {
        &self.config.periods
    }
}
