//! forja-tenant: the tenant-isolation layer of the Forja ERP backend.
//!
//! Every read and write the application performs against an isolated
//! table goes through this crate:
//!
//! - [`TenantResolver`] establishes which companies the authenticated
//!   user may operate on and which one is active, and guards switches.
//! - [`TenantQuery`] injects the `company_id` filter into every read of
//!   an isolated table.
//! - [`TenantMutation`] stamps inserts with the active company and pins
//!   updates/deletes to it, so a foreign row id affects nothing.
//! - [`TenantValidator`] answers out-of-band ownership questions before
//!   an action is allowed on a specific record.
//!
//! Everything here is fail-closed: a store error, an undeclared table, or
//! a missing `company_id` always narrows access (empty result, denial),
//! never broadens it. A generation counter on the resolver lets the
//! wrappers discard responses that resolve after the tenant context has
//! changed underneath them.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use forja_core::{erp_tables, Filter, MemoryStore, QuerySpec, UserId};
//! use forja_tenant::{TenantQuery, TenantResolver};
//!
//! # async fn demo() -> forja_tenant::TenantResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let resolver = Arc::new(TenantResolver::new(store.clone(), UserId::new(), false));
//! resolver.load_user_companies().await;
//!
//! let query = TenantQuery::new(store, Arc::new(erp_tables()), resolver);
//! let spec = QuerySpec::new("materials").filter(Filter::eq("active", true));
//! // Scoped to the active company before it ever reaches the store.
//! let materials = query.find(&spec).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod resolver;
pub mod scoped_mutation;
pub mod scoped_query;
pub mod validate;

pub use error::{TenantError, TenantResult};
pub use resolver::TenantResolver;
pub use scoped_mutation::TenantMutation;
pub use scoped_query::TenantQuery;
pub use validate::TenantValidator;

/// The column every isolated table is scoped by.
pub const COMPANY_ID_COLUMN: &str = "company_id";

/// Table holding company rows.
pub const COMPANIES_TABLE: &str = "companies";

/// Table holding user-to-company membership rows.
pub const USER_COMPANIES_TABLE: &str = "user_companies";
