//! Tenant resolution: which companies a user may operate on, and which
//! one is active.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use forja_core::{Company, CompanyId, DataStore, Filter, QuerySpec, Row, StoreResult, TenantContext, UserId};
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::error::{TenantError, TenantResult};
use crate::{COMPANIES_TABLE, COMPANY_ID_COLUMN, USER_COMPANIES_TABLE};

#[derive(Default)]
struct ResolverState {
    user_companies: Vec<Company>,
    current_company: Option<Company>,
}

/// Resolves and holds the tenant context for one authenticated session.
///
/// The resolver owns the only mutable tenant state in the system: the
/// accessible-company list and the active selection. Consumers never
/// read that state directly; they take an immutable [`TenantContext`]
/// snapshot per operation via [`snapshot`](Self::snapshot).
///
/// Each state change (switch, clear, re-resolved selection) bumps a
/// generation counter. The scoped wrappers capture the generation before
/// awaiting the store and discard any response that resolves under a
/// different one, so a slow fetch started under a previous tenant can
/// never leak into the new one.
pub struct TenantResolver {
    store: Arc<dyn DataStore>,
    user_id: UserId,
    is_admin: bool,
    state: RwLock<ResolverState>,
    generation: AtomicU64,
}

impl TenantResolver {
    /// `is_admin` comes from the auth provider, resolved once per
    /// session. Admins bypass tenant filtering entirely.
    pub fn new(store: Arc<dyn DataStore>, user_id: UserId, is_admin: bool) -> Self {
        Self {
            store,
            user_id,
            is_admin,
            state: RwLock::new(ResolverState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn current_company(&self) -> Option<Company> {
        self.state.read().current_company.clone()
    }

    /// Immutable per-operation view of the tenant context.
    pub fn snapshot(&self) -> TenantContext {
        let state = self.state.read();
        TenantContext {
            user_id: self.user_id,
            current_company: state.current_company.clone(),
            user_companies: state.user_companies.clone(),
            is_admin: self.is_admin,
            generation: self.generation(),
        }
    }

    /// (Re)load the accessible-company list for this user.
    ///
    /// Admins see every active company; everyone else sees the companies
    /// linked through an active membership row. A store failure resolves
    /// to an empty list: isolation is preserved because no error path
    /// ever widens access. An already-valid selection is kept, otherwise
    /// the first entry becomes active. Calling this twice without an
    /// identity change yields the same set and leaves a valid selection
    /// alone.
    pub async fn load_user_companies(&self) -> Vec<Company> {
        let companies = match self.fetch_accessible_companies().await {
            Ok(companies) => companies,
            Err(err) => {
                error!(
                    user_id = %self.user_id,
                    error = %err,
                    "failed to load user companies, resolving to none"
                );
                Vec::new()
            }
        };

        let mut state = self.state.write();
        state.user_companies = companies.clone();

        let selection_still_valid = state
            .current_company
            .as_ref()
            .is_some_and(|current| state.user_companies.iter().any(|c| c.id == current.id));

        if !selection_still_valid {
            let next = state.user_companies.first().cloned();
            let changed =
                state.current_company.as_ref().map(|c| c.id) != next.as_ref().map(|c| c.id);
            state.current_company = next;
            if changed {
                self.bump_generation();
            }
        }

        companies
    }

    /// Whether this user may operate on `company_id`. Admins always
    /// pass; non-admins need an active membership row for that exact
    /// pairing. Any store error denies (fail closed).
    pub async fn check_company_access(&self, company_id: CompanyId) -> bool {
        if self.is_admin {
            return true;
        }

        let spec = QuerySpec::new(USER_COMPANIES_TABLE)
            .select([COMPANY_ID_COLUMN])
            .filter(Filter::eq("user_id", self.user_id))
            .filter(Filter::eq(COMPANY_ID_COLUMN, company_id))
            .filter(Filter::eq("active", true));

        match self.store.select_one(&spec).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(err) => {
                warn!(
                    user_id = %self.user_id,
                    company_id = %company_id,
                    error = %err,
                    "membership check failed, denying access"
                );
                false
            }
        }
    }

    /// Guard form of [`check_company_access`](Self::check_company_access)
    /// for call sites that want an error value to surface.
    pub async fn require_company_access(&self, company_id: CompanyId) -> TenantResult<()> {
        if self.check_company_access(company_id).await {
            Ok(())
        } else {
            Err(TenantError::AccessDenied { company_id })
        }
    }

    /// Switch the active company. Membership is re-validated before the
    /// switch takes effect; on any failure the selection is left
    /// unchanged and `false` is returned.
    pub async fn switch_company(&self, company_id: CompanyId) -> bool {
        if !self.check_company_access(company_id).await {
            warn!(
                user_id = %self.user_id,
                company_id = %company_id,
                "company switch denied"
            );
            return false;
        }

        let Some(company) = self.resolve_company(company_id).await else {
            warn!(
                company_id = %company_id,
                "switch target not found or inactive, selection unchanged"
            );
            return false;
        };

        {
            let mut state = self.state.write();
            if state.current_company.as_ref().map(|c| c.id) == Some(company_id) {
                return true;
            }
            state.current_company = Some(company);
        }

        self.bump_generation();
        debug!(
            user_id = %self.user_id,
            company_id = %company_id,
            "active company switched"
        );
        true
    }

    /// Logout teardown: drop all tenant state and invalidate in-flight
    /// requests.
    pub fn clear(&self) {
        *self.state.write() = ResolverState::default();
        self.bump_generation();
        debug!(user_id = %self.user_id, "tenant context cleared");
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn fetch_accessible_companies(&self) -> StoreResult<Vec<Company>> {
        if self.is_admin {
            let spec = QuerySpec::new(COMPANIES_TABLE)
                .filter(Filter::eq("active", true))
                .order_by("display_name", true);
            let rows = self.store.select(&spec).await?;
            return Ok(deserialize_companies(rows));
        }

        let spec = QuerySpec::new(USER_COMPANIES_TABLE)
            .filter(Filter::eq("user_id", self.user_id))
            .filter(Filter::eq("active", true));
        let memberships = self.store.select(&spec).await?;

        let company_ids: Vec<serde_json::Value> = memberships
            .iter()
            .filter_map(|row| row.get(COMPANY_ID_COLUMN).cloned())
            .collect();
        if company_ids.is_empty() {
            return Ok(Vec::new());
        }

        let spec = QuerySpec::new(COMPANIES_TABLE)
            .filter(Filter::is_in("id", company_ids))
            .filter(Filter::eq("active", true))
            .order_by("display_name", true);
        let rows = self.store.select(&spec).await?;
        Ok(deserialize_companies(rows))
    }

    /// Look the target company up, preferring the already-loaded list
    /// (admins may switch to companies outside it).
    async fn resolve_company(&self, company_id: CompanyId) -> Option<Company> {
        if let Some(company) = self
            .state
            .read()
            .user_companies
            .iter()
            .find(|c| c.id == company_id)
        {
            return Some(company.clone());
        }

        let spec = QuerySpec::new(COMPANIES_TABLE)
            .filter(Filter::eq("id", company_id))
            .filter(Filter::eq("active", true));

        match self.store.select_one(&spec).await {
            Ok(Some(row)) => deserialize_company(row),
            Ok(None) => None,
            Err(err) => {
                warn!(
                    company_id = %company_id,
                    error = %err,
                    "company lookup failed"
                );
                None
            }
        }
    }
}

fn deserialize_companies(rows: Vec<Row>) -> Vec<Company> {
    rows.into_iter().filter_map(deserialize_company).collect()
}

fn deserialize_company(row: Row) -> Option<Company> {
    match serde_json::from_value::<Company>(row) {
        Ok(company) => Some(company),
        Err(err) => {
            warn!(error = %err, "skipping malformed company row");
            None
        }
    }
}
