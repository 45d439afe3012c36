use forja_core::{CompanyId, StoreError};
use thiserror::Error;

/// Result type for tenant-layer operations.
pub type TenantResult<T> = Result<T, TenantError>;

/// Errors raised by the isolation layer.
///
/// None of these ever stands in for broadened access: a failed operation
/// leaves the caller with an empty result or a denial, and the store is
/// never reached with an unscoped query it should not see.
#[derive(Error, Debug, Clone)]
pub enum TenantError {
    /// A non-admin attempted a write with no company selected.
    /// Recoverable by selecting a company.
    #[error("No company selected")]
    NoActiveCompany,

    /// A company switch or ownership check failed; the requested state
    /// change was not applied.
    #[error("Access denied to company {company_id}")]
    AccessDenied { company_id: CompanyId },

    /// The response resolved after the tenant context changed (company
    /// switch, logout). The rows were discarded; re-run the query under
    /// the new context.
    #[error("Tenant context changed while the request was in flight")]
    TenantChanged,

    /// Failure from the backend collaborator, surfaced verbatim. The
    /// operation's result defaults to empty/denied.
    #[error(transparent)]
    Store(#[from] StoreError),
}
