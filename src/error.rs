//! Error types for core membership operations
//!
//! Errors are classified by recoverability:
//! - Retryable: transient store/gateway failures, timeouts
//! - NonRetryable: validation errors, missing rows, conflicts
//! - Partial: consolidation stopped mid-sequence with work already applied

use thiserror::Error;

use crate::db::DbError;
use crate::gateway::GatewayError;

/// Error taxonomy for the identity-consolidation and roster core.
#[derive(Debug, Error)]
pub enum CoreError {
    // Rejected before any store access; never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Caller is not authorized: {0}")]
    Forbidden(String),

    /// The target identity already has an active roster membership.
    #[error("{email} is already a member of a company roster")]
    DuplicateMembership { email: String },

    // Transient store failure during a read; the caller offers a manual retry.
    #[error("Lookup failed: {0}")]
    LookupFailed(#[source] DbError),

    /// Consolidation applied some periods and then failed. `updated` is the
    /// number of records rewritten before the failing period. Must never be
    /// collapsed into full success or full failure.
    #[error("Consolidation incomplete: {updated} record(s) updated before period {period} failed: {source}")]
    PartialConsolidation {
        updated: u64,
        period: u16,
        #[source]
        source: DbError,
    },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

impl CoreError {
    /// Returns true if retrying the same operation may succeed.
    ///
    /// Only lookup and gateway failures qualify. `PartialConsolidation` is
    /// retry-safe too because the rewrite is a set-based "ensure owned"
    /// (re-running converges), but it is reported separately so the caller
    /// never mistakes it for a clean failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::LookupFailed(_) | CoreError::PartialConsolidation { .. } => true,
            CoreError::Gateway(g) => g.is_retryable(),
            _ => false,
        }
    }

    /// Stable kind tag for callers that branch on error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::DuplicateMembership { .. } => ErrorKind::DuplicateMembership,
            CoreError::LookupFailed(_) => ErrorKind::LookupFailed,
            CoreError::PartialConsolidation { .. } => ErrorKind::PartialConsolidation,
            CoreError::Gateway(_) => ErrorKind::Gateway,
            CoreError::Db(_) => ErrorKind::Store,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Forbidden,
    DuplicateMembership,
    LookupFailed,
    PartialConsolidation,
    Gateway,
    Store,
}

/// Serializable error representation for the UI/API boundary.
///
/// The core never decides user-facing copy; callers render from this.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationError {
    pub message: String,
    pub kind: ErrorKind,
    pub can_retry: bool,
    /// For `PartialConsolidation`: records rewritten before the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_updated: Option<u64>,
}

impl From<&CoreError> for OperationError {
    fn from(err: &CoreError) -> Self {
        let partial_updated = match err {
            CoreError::PartialConsolidation { updated, .. } => Some(*updated),
            _ => None,
        };
        OperationError {
            message: err.to_string(),
            kind: err.kind(),
            can_retry: err.is_retryable(),
            partial_updated,
        }
    }
}
