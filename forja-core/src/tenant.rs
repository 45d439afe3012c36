//! Tenant identity types.
//!
//! A tenant is a company. Every isolated table carries a `company_id`
//! column pointing at one of these, and every data operation runs under a
//! [`TenantContext`] snapshot that says which companies the caller may see.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a company (the unit of data isolation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub Uuid);

impl CompanyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CompanyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an authenticated user, supplied by the auth provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A company: the root of isolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub display_name: String,
    pub active: bool,
}

/// A user-to-company membership row. An active membership grants
/// read/write access to that company's rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub active: bool,
}

/// The resolved tenant context for a single data operation.
///
/// This is a snapshot, not live state: the resolver stamps it with the
/// generation current at the time it was taken, and the scoped wrappers
/// compare generations when a response resolves so a fetch started under
/// a previous tenant can be discarded.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub user_id: UserId,
    pub current_company: Option<Company>,
    pub user_companies: Vec<Company>,
    pub is_admin: bool,
    pub generation: u64,
}

impl TenantContext {
    pub fn current_company_id(&self) -> Option<CompanyId> {
        self.current_company.as_ref().map(|c| c.id)
    }

    /// Whether the user can see more than one company.
    pub fn is_multi_tenant(&self) -> bool {
        self.user_companies.len() > 1
    }

    /// Same condition as [`is_multi_tenant`](Self::is_multi_tenant); kept
    /// as a distinct accessor because callers ask it with different intent
    /// (rendering a switcher vs. labelling the session).
    pub fn can_switch_company(&self) -> bool {
        self.is_multi_tenant()
    }
}
