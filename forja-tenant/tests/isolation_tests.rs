//! Cross-tenant isolation: scoped reads, stamped writes, ownership
//! validation, and mid-flight tenant changes.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use forja_core::{
    erp_tables, CompanyId, DataStore, Filter, MemoryStore, QuerySpec, Row, StoreError,
    StoreResult, TableRegistry, UserId,
};
use forja_tenant::{
    TenantError, TenantMutation, TenantQuery, TenantResolver, TenantValidator,
};
use serde_json::{json, Value};

fn company_row(id: CompanyId, name: &str) -> Value {
    json!({"id": id, "display_name": name, "active": true})
}

fn membership_row(user: UserId, company: CompanyId) -> Value {
    json!({"user_id": user, "company_id": company, "active": true})
}

struct Fixture {
    store: Arc<MemoryStore>,
    registry: Arc<TableRegistry>,
    company_a: CompanyId,
    company_b: CompanyId,
    user: UserId,
}

/// Companies A and B with business rows in both; the user is a member
/// of A only.
fn seed_erp() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let company_a = CompanyId::new();
    let company_b = CompanyId::new();
    let user = UserId::new();

    store.seed(
        "companies",
        vec![
            company_row(company_a, "Forja Matriz"),
            company_row(company_b, "Forja Filial"),
        ],
    );
    store.seed("user_companies", vec![membership_row(user, company_a)]);
    store.seed(
        "materials",
        vec![
            json!({"id": "m-a1", "name": "Chapa 3mm", "company_id": company_a}),
            json!({"id": "m-a2", "name": "Tubo 40mm", "company_id": company_a}),
            json!({"id": "m-b1", "name": "Barra 10mm", "company_id": company_b}),
        ],
    );
    store.seed(
        "projects",
        vec![
            json!({"id": "p-a1", "status": "open", "company_id": company_a}),
            json!({"id": "p-b1", "status": "open", "company_id": company_b}),
        ],
    );

    Fixture {
        store,
        registry: Arc::new(erp_tables()),
        company_a,
        company_b,
        user,
    }
}

async fn resolver(fix: &Fixture, admin: bool) -> Arc<TenantResolver> {
    let resolver = Arc::new(TenantResolver::new(fix.store.clone(), fix.user, admin));
    resolver.load_user_companies().await;
    resolver
}

fn query(fix: &Fixture, resolver: Arc<TenantResolver>) -> TenantQuery {
    TenantQuery::new(fix.store.clone(), fix.registry.clone(), resolver)
}

fn mutation(fix: &Fixture, resolver: Arc<TenantResolver>) -> TenantMutation {
    TenantMutation::new(fix.store.clone(), fix.registry.clone(), resolver)
}

fn validator(fix: &Fixture, resolver: Arc<TenantResolver>) -> TenantValidator {
    TenantValidator::new(fix.store.clone(), fix.registry.clone(), resolver)
}

fn ids(rows: &[Row]) -> Vec<&str> {
    rows.iter()
        .filter_map(|r| r.get("id").and_then(Value::as_str))
        .collect()
}

// ---- reads ----

#[tokio::test]
async fn non_admin_reads_only_own_company_rows() {
    let fix = seed_erp();
    let query = query(&fix, resolver(&fix, false).await);

    let rows = query.find(&QuerySpec::new("materials")).await.unwrap();
    assert_eq!(ids(&rows), vec!["m-a1", "m-a2"]);
}

#[tokio::test]
async fn admin_reads_across_companies() {
    let fix = seed_erp();
    let query = query(&fix, resolver(&fix, true).await);

    let rows = query.find(&QuerySpec::new("materials")).await.unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn caller_filters_are_combined_with_the_company_scope() {
    let fix = seed_erp();
    let query = query(&fix, resolver(&fix, false).await);

    let spec = QuerySpec::new("materials").filter(Filter::like("name", "Chapa%"));
    let rows = query.find(&spec).await.unwrap();
    assert_eq!(ids(&rows), vec!["m-a1"]);

    // A caller filter naming the other company still cannot widen the
    // result: both equality filters apply and nothing matches.
    let spec = QuerySpec::new("materials").filter(Filter::eq("company_id", fix.company_b));
    let rows = query.find(&spec).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn no_active_company_short_circuits_to_empty_without_store_call() {
    let fix = seed_erp();
    let stranger = UserId::new();
    let resolver = Arc::new(TenantResolver::new(fix.store.clone(), stranger, false));
    resolver.load_user_companies().await;
    assert_eq!(resolver.snapshot().current_company_id(), None);

    let query = TenantQuery::new(fix.store.clone(), fix.registry.clone(), resolver);

    // An armed failure would surface if the store were consulted.
    fix.store.fail_next(StoreError::Unavailable("down".to_string()));
    let rows = query.find(&QuerySpec::new("materials")).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn undeclared_table_is_treated_as_isolated() {
    let fix = seed_erp();
    fix.store.seed(
        "mystery_table",
        vec![
            json!({"id": "x-a", "company_id": fix.company_a}),
            json!({"id": "x-b", "company_id": fix.company_b}),
        ],
    );
    let query = query(&fix, resolver(&fix, false).await);

    let rows = query.find(&QuerySpec::new("mystery_table")).await.unwrap();
    assert_eq!(ids(&rows), vec!["x-a"]);
}

#[tokio::test]
async fn store_error_surfaces_and_leaves_result_empty() {
    let fix = seed_erp();
    let query = query(&fix, resolver(&fix, false).await);

    fix.store.fail_next(StoreError::Unavailable("down".to_string()));
    let err = query.find(&QuerySpec::new("materials")).await.unwrap_err();
    assert!(matches!(err, TenantError::Store(_)));
}

#[tokio::test]
async fn find_one_is_scoped_like_find() {
    let fix = seed_erp();
    let query = query(&fix, resolver(&fix, false).await);

    let spec = QuerySpec::new("materials").filter(Filter::eq("id", "m-b1"));
    assert!(query.find_one(&spec).await.unwrap().is_none());

    let spec = QuerySpec::new("materials").filter(Filter::eq("id", "m-a1"));
    assert!(query.find_one(&spec).await.unwrap().is_some());
}

// ---- writes ----

#[tokio::test]
async fn insert_stamps_the_active_company_over_caller_input() {
    let fix = seed_erp();
    let mutation = mutation(&fix, resolver(&fix, false).await);

    let created = mutation
        .insert(
            "materials",
            json!({"name": "Cantoneira", "company_id": fix.company_b}),
        )
        .await
        .unwrap();

    let expected = serde_json::to_value(fix.company_a).unwrap();
    assert_eq!(created.get("company_id"), Some(&expected));

    // The persisted row carries the stamp too.
    let stored = fix.store.rows("materials");
    let stored = stored
        .iter()
        .find(|r| r.get("name") == Some(&json!("Cantoneira")))
        .unwrap();
    assert_eq!(stored.get("company_id"), Some(&expected));
}

#[tokio::test]
async fn writes_without_a_selected_company_never_reach_the_store() {
    let fix = seed_erp();
    let stranger = UserId::new();
    let resolver = Arc::new(TenantResolver::new(fix.store.clone(), stranger, false));
    resolver.load_user_companies().await;
    let mutation = TenantMutation::new(fix.store.clone(), fix.registry.clone(), resolver);

    fix.store.fail_next(StoreError::Unavailable("down".to_string()));

    let err = mutation
        .insert("materials", json!({"name": "Rebite"}))
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::NoActiveCompany));

    let err = mutation
        .update("projects", "p-a1", json!({"status": "done"}))
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::NoActiveCompany));

    let err = mutation.delete("projects", "p-a1").await.unwrap_err();
    assert!(matches!(err, TenantError::NoActiveCompany));

    // The armed failure was never consumed: no request reached the store.
    assert!(matches!(
        fix.store.select(&QuerySpec::new("materials")).await,
        Err(StoreError::Unavailable(_))
    ));
    assert_eq!(fix.store.row_count("materials"), 3);
}

#[tokio::test]
async fn cross_tenant_update_affects_zero_rows() {
    let fix = seed_erp();
    let mutation = mutation(&fix, resolver(&fix, false).await);

    let affected = mutation
        .update("projects", "p-b1", json!({"status": "done"}))
        .await
        .unwrap();
    assert_eq!(affected, 0);

    // Company B's row is untouched.
    let rows = fix.store.rows("projects");
    let row_b = rows.iter().find(|r| r.get("id") == Some(&json!("p-b1"))).unwrap();
    assert_eq!(row_b.get("status"), Some(&json!("open")));
}

#[tokio::test]
async fn own_company_update_succeeds() {
    let fix = seed_erp();
    let mutation = mutation(&fix, resolver(&fix, false).await);

    let affected = mutation
        .update("projects", "p-a1", json!({"status": "done"}))
        .await
        .unwrap();
    assert_eq!(affected, 1);
}

#[tokio::test]
async fn update_patch_cannot_rehome_a_row() {
    let fix = seed_erp();
    let mutation = mutation(&fix, resolver(&fix, false).await);

    let affected = mutation
        .update(
            "projects",
            "p-a1",
            json!({"status": "done", "company_id": fix.company_b}),
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let rows = fix.store.rows("projects");
    let row = rows.iter().find(|r| r.get("id") == Some(&json!("p-a1"))).unwrap();
    let expected = serde_json::to_value(fix.company_a).unwrap();
    assert_eq!(row.get("company_id"), Some(&expected));
    assert_eq!(row.get("status"), Some(&json!("done")));
}

#[tokio::test]
async fn cross_tenant_delete_removes_nothing() {
    let fix = seed_erp();
    let mutation = mutation(&fix, resolver(&fix, false).await);

    let removed = mutation.delete("materials", "m-b1").await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(fix.store.row_count("materials"), 3);

    let removed = mutation.delete("materials", "m-a1").await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(fix.store.row_count("materials"), 2);
}

#[tokio::test]
async fn admin_writes_bypass_the_company_pin() {
    let fix = seed_erp();
    let mutation = mutation(&fix, resolver(&fix, true).await);

    // Whatever company is active, an admin can touch any row directly.
    let affected = mutation
        .update("projects", "p-b1", json!({"status": "done"}))
        .await
        .unwrap();
    assert_eq!(affected, 1);
    let affected = mutation
        .update("projects", "p-a1", json!({"status": "done"}))
        .await
        .unwrap();
    assert_eq!(affected, 1);
}

// ---- validation ----

#[tokio::test]
async fn ownership_validation_compares_company_columns() {
    let fix = seed_erp();
    let validator = validator(&fix, resolver(&fix, false).await);

    let own = json!({"id": "m-a1", "company_id": fix.company_a});
    let foreign = json!({"id": "m-b1", "company_id": fix.company_b});
    let unstamped = json!({"id": "m-x"});

    assert!(validator.validate_ownership("materials", &own));
    assert!(!validator.validate_ownership("materials", &foreign));
    assert!(!validator.validate_ownership("materials", &unstamped));
    // Non-isolated tables are everyone's to read.
    assert!(validator.validate_ownership("companies", &foreign));
}

#[tokio::test]
async fn ownership_validation_passes_admins() {
    let fix = seed_erp();
    let validator = validator(&fix, resolver(&fix, true).await);

    let foreign = json!({"id": "m-b1", "company_id": fix.company_b});
    assert!(validator.validate_ownership("materials", &foreign));
}

#[tokio::test]
async fn access_validation_fetches_and_fails_closed() {
    let fix = seed_erp();
    let validator = validator(&fix, resolver(&fix, false).await);

    assert!(validator.validate_access("materials", "m-a1").await);
    assert!(!validator.validate_access("materials", "m-b1").await);
    assert!(!validator.validate_access("materials", "missing").await);

    fix.store.fail_next(StoreError::Unavailable("down".to_string()));
    assert!(!validator.validate_access("materials", "m-a1").await);
}

// ---- mid-flight tenant changes ----

/// Delegates to a [`MemoryStore`] but clears the resolver after every
/// read, simulating a logout that lands while a fetch is in flight.
struct ClearingStore {
    inner: MemoryStore,
    resolver: OnceLock<Arc<TenantResolver>>,
}

#[async_trait]
impl DataStore for ClearingStore {
    async fn select(&self, spec: &QuerySpec) -> StoreResult<Vec<Row>> {
        let rows = self.inner.select(spec).await?;
        if let Some(resolver) = self.resolver.get() {
            resolver.clear();
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        let created = self.inner.insert(table, row).await?;
        if let Some(resolver) = self.resolver.get() {
            resolver.clear();
        }
        Ok(created)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> StoreResult<u64> {
        let affected = self.inner.update(table, filters, patch).await?;
        if let Some(resolver) = self.resolver.get() {
            resolver.clear();
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<u64> {
        let removed = self.inner.delete(table, filters).await?;
        if let Some(resolver) = self.resolver.get() {
            resolver.clear();
        }
        Ok(removed)
    }
}

#[tokio::test]
async fn responses_resolving_after_a_tenant_change_are_discarded() {
    let company_a = CompanyId::new();
    let user = UserId::new();

    let inner = MemoryStore::new();
    inner.seed("companies", vec![company_row(company_a, "Forja Matriz")]);
    inner.seed("user_companies", vec![membership_row(user, company_a)]);
    inner.seed(
        "materials",
        vec![json!({"id": "m-a1", "company_id": company_a})],
    );

    let store = Arc::new(ClearingStore {
        inner,
        resolver: OnceLock::new(),
    });

    let resolver = Arc::new(TenantResolver::new(store.clone(), user, false));
    resolver.load_user_companies().await;

    // Arm the mid-flight clear only now, so the loads above ran normally.
    store.resolver.set(resolver.clone()).ok();

    let query = TenantQuery::new(store.clone(), Arc::new(erp_tables()), resolver.clone());
    let err = query.find(&QuerySpec::new("materials")).await.unwrap_err();
    assert!(matches!(err, TenantError::TenantChanged));
}

#[tokio::test]
async fn mutations_resolving_after_a_tenant_change_are_discarded() {
    let company_a = CompanyId::new();
    let user = UserId::new();

    let inner = MemoryStore::new();
    inner.seed("companies", vec![company_row(company_a, "Forja Matriz")]);
    inner.seed("user_companies", vec![membership_row(user, company_a)]);
    inner.seed(
        "projects",
        vec![json!({"id": "p-a1", "status": "open", "company_id": company_a})],
    );

    let store = Arc::new(ClearingStore {
        inner,
        resolver: OnceLock::new(),
    });

    let resolver = Arc::new(TenantResolver::new(store.clone(), user, false));
    resolver.load_user_companies().await;
    store.resolver.set(resolver.clone()).ok();

    let mutation = TenantMutation::new(store.clone(), Arc::new(erp_tables()), resolver.clone());

    let err = mutation
        .insert("projects", json!({"status": "draft"}))
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::TenantChanged));
    // The discarded insert left the pre-existing row alone.
    let rows = store.inner.rows("projects");
    let row = rows.iter().find(|r| r.get("id") == Some(&json!("p-a1"))).unwrap();
    assert_eq!(row.get("status"), Some(&json!("open")));

    // Re-resolve after the teardown, then exercise the other write paths.
    resolver.load_user_companies().await;
    let err = mutation
        .update("projects", "p-a1", json!({"status": "done"}))
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::TenantChanged));

    resolver.load_user_companies().await;
    let err = mutation.delete("projects", "p-a1").await.unwrap_err();
    assert!(matches!(err, TenantError::TenantChanged));
}
