//! Tenant-scoped writes.

use std::sync::Arc;

use forja_core::{CompanyId, DataStore, Filter, Row, StoreError, TableRegistry, TenantContext};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{TenantError, TenantResult};
use crate::resolver::TenantResolver;
use crate::COMPANY_ID_COLUMN;

/// Wraps inserts, updates, and deletes so writes are stamped with, or
/// pinned to, the active company.
///
/// The tenant context is authoritative over client input: a
/// caller-supplied `company_id` on an isolated insert is overwritten,
/// and update/delete patches can never re-home a row. Failed mutations
/// are surfaced to the caller; nothing is retried.
pub struct TenantMutation {
    store: Arc<dyn DataStore>,
    registry: Arc<TableRegistry>,
    resolver: Arc<TenantResolver>,
}

impl TenantMutation {
    pub fn new(
        store: Arc<dyn DataStore>,
        registry: Arc<TableRegistry>,
        resolver: Arc<TenantResolver>,
    ) -> Self {
        Self {
            store,
            registry,
            resolver,
        }
    }

    /// Insert a row. On isolated tables the payload is stamped with the
    /// active company; a non-admin with no selection is rejected before
    /// the store is reached.
    pub async fn insert(&self, table: &str, row: Row) -> TenantResult<Row> {
        let ctx = self.resolver.snapshot();
        let row = if self.table_is_isolated(table) {
            match ctx.current_company_id() {
                Some(company_id) => stamp_company(table, row, company_id)?,
                None if ctx.is_admin => row,
                None => return Err(TenantError::NoActiveCompany),
            }
        } else {
            row
        };

        let created = self.store.insert(table, row).await?;
        self.check_generation(&ctx, table)?;
        debug!(table, "row inserted");
        Ok(created)
    }

    /// Update the row with `id`, merging `patch`. On isolated tables the
    /// `company_id` filter is combined with the id filter, so a foreign
    /// row id affects zero rows for non-admins. Returns rows affected.
    pub async fn update(&self, table: &str, id: &str, patch: Row) -> TenantResult<u64> {
        let ctx = self.resolver.snapshot();
        let filters = self.write_filters(table, id, &ctx)?;
        let patch = if self.table_is_isolated(table) && !ctx.is_admin {
            strip_company(table, patch)?
        } else {
            patch
        };

        let affected = self.store.update(table, &filters, patch).await?;
        self.check_generation(&ctx, table)?;
        if affected == 0 {
            debug!(table, id, "update affected no rows");
        }
        Ok(affected)
    }

    /// Delete the row with `id`, under the same company pinning as
    /// [`update`](Self::update). Returns rows removed.
    pub async fn delete(&self, table: &str, id: &str) -> TenantResult<u64> {
        let ctx = self.resolver.snapshot();
        let filters = self.write_filters(table, id, &ctx)?;

        let removed = self.store.delete(table, &filters).await?;
        self.check_generation(&ctx, table)?;
        if removed == 0 {
            debug!(table, id, "delete affected no rows");
        }
        Ok(removed)
    }

    /// Filters for update/delete: the id filter, plus the company filter
    /// on isolated tables for non-admins. A non-admin with no selection
    /// is rejected here, before any store call.
    fn write_filters(
        &self,
        table: &str,
        id: &str,
        ctx: &TenantContext,
    ) -> TenantResult<Vec<Filter>> {
        let mut filters = vec![Filter::eq("id", id)];

        if self.table_is_isolated(table) && !ctx.is_admin {
            match ctx.current_company_id() {
                Some(company_id) => {
                    filters.push(Filter::eq(COMPANY_ID_COLUMN, company_id));
                }
                None => return Err(TenantError::NoActiveCompany),
            }
        }

        Ok(filters)
    }

    fn table_is_isolated(&self, table: &str) -> bool {
        match self.registry.is_isolated(table) {
            Some(isolated) => isolated,
            None => {
                warn!(table, "table not declared in registry, treating as isolated");
                true
            }
        }
    }

    fn check_generation(&self, ctx: &TenantContext, table: &str) -> TenantResult<()> {
        if self.resolver.generation() != ctx.generation {
            debug!(
                table,
                started_under = ctx.generation,
                "tenant context changed mid-flight, discarding mutation result"
            );
            return Err(TenantError::TenantChanged);
        }
        Ok(())
    }
}

/// Set `company_id` on an insert payload, overriding whatever the caller
/// supplied.
fn stamp_company(table: &str, row: Row, company_id: CompanyId) -> TenantResult<Row> {
    let Value::Object(mut object) = row else {
        return Err(TenantError::Store(StoreError::InvalidPayload(
            "insert payload must be a JSON object".to_string(),
        )));
    };

    let stamp = serde_json::to_value(company_id).map_err(StoreError::from)?;
    if let Some(supplied) = object.get(COMPANY_ID_COLUMN) {
        if supplied != &stamp {
            warn!(
                table,
                company_id = %company_id,
                "overriding caller-supplied company_id with active company"
            );
        }
    }
    object.insert(COMPANY_ID_COLUMN.to_string(), stamp);

    Ok(Value::Object(object))
}

/// Remove `company_id` from an update patch so a row can never be moved
/// to another tenant.
fn strip_company(table: &str, patch: Row) -> TenantResult<Row> {
    let Value::Object(mut object) = patch else {
        return Err(TenantError::Store(StoreError::InvalidPayload(
            "update patch must be a JSON object".to_string(),
        )));
    };

    if object.remove(COMPANY_ID_COLUMN).is_some() {
        warn!(table, "dropping company_id from update patch");
    }

    Ok(Value::Object(object))
}
