//! The backend data-store contract.

#[cfg(feature = "memory")]
pub mod memory;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::query::{Filter, QuerySpec};

/// A row as exchanged with the backend: a JSON object.
pub type Row = serde_json::Value;

/// Contract with the backend that actually executes queries.
///
/// The tenant layer requires exactly three things from an implementation:
/// it accepts equality filters on arbitrary columns (that is how
/// `company_id` scoping is expressed), it reports failures as
/// [`StoreError`](crate::StoreError) values rather than panicking, and
/// any row-level security it applies is defense in depth, not a
/// substitute for the filters it is handed.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Execute a query and return the matching rows.
    async fn select(&self, spec: &QuerySpec) -> StoreResult<Vec<Row>>;

    /// Execute a query expected to yield at most one row.
    async fn select_one(&self, spec: &QuerySpec) -> StoreResult<Option<Row>> {
        let rows = self.select(&spec.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert a row, returning the stored row (with backend-assigned
    /// columns such as `id` filled in).
    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row>;

    /// Update all rows matching every filter, merging `patch` into each.
    /// Returns the number of rows affected.
    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> StoreResult<u64>;

    /// Delete all rows matching every filter. Returns the number of rows
    /// removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<u64>;
}
