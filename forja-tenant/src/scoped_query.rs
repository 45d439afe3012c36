//! Tenant-scoped reads.

use std::sync::Arc;

use forja_core::{DataStore, Filter, QuerySpec, Row, TableRegistry, TenantContext};
use tracing::{debug, warn};

use crate::error::{TenantError, TenantResult};
use crate::resolver::TenantResolver;
use crate::COMPANY_ID_COLUMN;

/// Outcome of scoping a spec to the tenant context.
enum Scoped {
    /// Execute this (possibly rewritten) spec.
    Spec(QuerySpec),
    /// Short-circuit to an empty result; the store is never called.
    Empty,
}

/// Wraps reads so every isolated table is automatically restricted to
/// the active company.
///
/// Scoping produces a new [`QuerySpec`]; the caller's spec is never
/// mutated, so re-running (refetching) it is just calling
/// [`find`](Self::find) again.
pub struct TenantQuery {
    store: Arc<dyn DataStore>,
    registry: Arc<TableRegistry>,
    resolver: Arc<TenantResolver>,
}

impl TenantQuery {
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

    /// List rows, restricted to the active company for isolated tables.
    ///
    /// Non-admins with no active company get an empty result without the
    /// store being consulted; an unfiltered query is never a fallback.
    /// Responses that resolve after a tenant change are discarded as
    /// [`TenantError::TenantChanged`].
    pub async fn find(&self, spec: &QuerySpec) -> TenantResult<Vec<Row>> {
        let ctx = self.resolver.snapshot();
        let scoped = match self.scope(spec, &ctx) {
            Scoped::Spec(scoped) => scoped,
            Scoped::Empty => return Ok(Vec::new()),
        };

        let rows = self.store.select(&scoped).await?;
        self.check_generation(&ctx, &scoped.table)?;
        Ok(rows)
    }

    /// Like [`find`](Self::find), but yields at most one row.
    pub async fn find_one(&self, spec: &QuerySpec) -> TenantResult<Option<Row>> {
        let ctx = self.resolver.snapshot();
        let scoped = match self.scope(spec, &ctx) {
            Scoped::Spec(scoped) => scoped,
            Scoped::Empty => return Ok(None),
        };

        let row = self.store.select_one(&scoped).await?;
        self.check_generation(&ctx, &scoped.table)?;
        Ok(row)
    }

    /// Undeclared tables are treated as isolated: a table that never made
    /// it into the registry must not ship unisolated.
    fn table_is_isolated(&self, table: &str) -> bool {
        match self.registry.is_isolated(table) {
            Some(isolated) => isolated,
            None => {
                warn!(table, "table not declared in registry, treating as isolated");
                true
            }
        }
    }

    fn scope(&self, spec: &QuerySpec, ctx: &TenantContext) -> Scoped {
        if ctx.is_admin || !self.table_is_isolated(&spec.table) {
            return Scoped::Spec(spec.clone());
        }

        match ctx.current_company_id() {
            Some(company_id) => {
                debug!(
                    table = %spec.table,
                    company_id = %company_id,
                    "scoping query to active company"
                );
                Scoped::Spec(spec.with_filter(Filter::eq(COMPANY_ID_COLUMN, company_id)))
            }
            None => {
                debug!(
                    table = %spec.table,
                    "no active company, short-circuiting to empty result"
                );
                Scoped::Empty
            }
        }
    }

    fn check_generation(&self, ctx: &TenantContext, table: &str) -> TenantResult<()> {
        if self.resolver.generation() != ctx.generation {
            debug!(
                table,
                started_under = ctx.generation,
                "tenant context changed mid-flight, discarding response"
            );
            return Err(TenantError::TenantChanged);
        }
        Ok(())
    }
}
