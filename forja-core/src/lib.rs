//! forja-core: framework-agnostic data-access core for the Forja ERP backend.
//!
//! This crate defines the vocabulary every Forja data layer speaks:
//!
//! - tenant identity types ([`CompanyId`], [`Company`], [`TenantContext`])
//! - the immutable [`QuerySpec`] value that replaces ad-hoc query builders
//! - the [`TableRegistry`] that centrally declares which tables are
//!   tenant-isolated
//! - the [`DataStore`] trait, the contract with whatever backend actually
//!   executes queries
//!
//! The tenant-isolation wrappers themselves live in `forja-tenant`; this
//! crate stays free of policy so backends and tooling can depend on it
//! without pulling in the isolation layer.

pub mod error;
pub mod query;
pub mod registry;
pub mod store;
pub mod tenant;

pub use error::{StoreError, StoreResult};
pub use query::{Filter, FilterOp, OrderBy, QuerySpec};
pub use registry::{erp_tables, RegistryError, TableDef, TableRegistry};
pub use store::{DataStore, Row};
pub use tenant::{Company, CompanyId, Membership, TenantContext, UserId};

#[cfg(feature = "memory")]
pub use store::memory::MemoryStore;
