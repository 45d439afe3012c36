//! Out-of-band ownership checks, used before allowing an action on a
//! specific record (rendering an edit form, following a deep link).

use std::sync::Arc;

use forja_core::{DataStore, Filter, QuerySpec, Row, TableRegistry};
use tracing::warn;

use crate::resolver::TenantResolver;
use crate::COMPANY_ID_COLUMN;

/// Answers "may the current tenant touch this record?".
///
/// Both checks are fail-closed: a missing `company_id`, a missing row,
/// no active selection, or a store error all deny.
pub struct TenantValidator {
    store: Arc<dyn DataStore>,
    registry: Arc<TableRegistry>,
    resolver: Arc<TenantResolver>,
}

impl TenantValidator {
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

    /// In-memory ownership check against an already-fetched record.
    pub fn validate_ownership(&self, table: &str, row: &Row) -> bool {
        let ctx = self.resolver.snapshot();
        if ctx.is_admin || !self.table_is_isolated(table) {
            return true;
        }

        let Some(company_id) = ctx.current_company_id() else {
            return false;
        };
        let Ok(expected) = serde_json::to_value(company_id) else {
            return false;
        };

        row.get(COMPANY_ID_COLUMN) == Some(&expected)
    }

    /// Fetch-based access check: reads only the `company_id` column for
    /// `id` and compares it to the active company.
    pub async fn validate_access(&self, table: &str, id: &str) -> bool {
        let ctx = self.resolver.snapshot();
        if ctx.is_admin || !self.table_is_isolated(table) {
            return true;
        }

        let Some(company_id) = ctx.current_company_id() else {
            return false;
        };
        let Ok(expected) = serde_json::to_value(company_id) else {
            return false;
        };

        let spec = QuerySpec::new(table)
            .select([COMPANY_ID_COLUMN])
            .filter(Filter::eq("id", id));

        match self.store.select_one(&spec).await {
            Ok(Some(row)) => row.get(COMPANY_ID_COLUMN) == Some(&expected),
            Ok(None) => false,
            Err(err) => {
                warn!(table, id, error = %err, "access validation failed, denying");
                false
            }
        }
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
}
