//! In-memory [`DataStore`] for tests and development.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::query::{compare_values, Filter, QuerySpec};
use crate::store::{DataStore, Row};

/// A table-per-key JSON store guarded by a `parking_lot` lock.
///
/// Selecting from a table that was never written returns no rows, so
/// tests only need to seed the tables they care about. A one-shot
/// failure can be injected to exercise fail-closed paths upstream.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    fail_next: RwLock<Option<StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with rows, replacing any existing contents.
    pub fn seed<I>(&self, table: impl Into<String>, rows: I)
    where
        I: IntoIterator<Item = Row>,
    {
        self.tables
            .write()
            .insert(table.into(), rows.into_iter().collect());
    }

    /// Make the next store operation fail with `err`.
    pub fn fail_next(&self, err: StoreError) {
        *self.fail_next.write() = Some(err);
    }

    /// Number of rows currently in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    /// Snapshot of a table's rows, unfiltered. Test helper.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    fn take_injected_failure(&self) -> Option<StoreError> {
        self.fail_next.write().take()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, spec: &QuerySpec) -> StoreResult<Vec<Row>> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }

        let tables = self.tables.read();
        let mut rows: Vec<Row> = tables
            .get(&spec.table)
            .map(|rows| rows.iter().filter(|r| spec.matches(r)).cloned().collect())
            .unwrap_or_default();
        drop(tables);

        if let Some(order) = &spec.order {
            rows.sort_by(|a, b| {
                let ordering = match (a.get(&order.column), b.get(&order.column)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let offset = spec.offset.unwrap_or(0);
        let mut rows: Vec<Row> = rows.into_iter().skip(offset).collect();
        if let Some(limit) = spec.limit {
            rows.truncate(limit);
        }

        if !spec.select.is_empty() {
            rows = rows.into_iter().map(|row| project(&row, &spec.select)).collect();
        }

        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }

        let Value::Object(mut object) = row else {
            return Err(StoreError::InvalidPayload(
                "insert payload must be a JSON object".to_string(),
            ));
        };

        // Backend-assigned columns, matching the hosted store's defaults.
        object
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        object
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let stored = Value::Object(object);
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());

        Ok(stored)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> StoreResult<u64> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }

        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidPayload(
                "update patch must be a JSON object".to_string(),
            ));
        };

        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };

        let mut affected = 0;
        for row in rows.iter_mut() {
            if filters.iter().all(|f| f.matches(row)) {
                if let Value::Object(object) = row {
                    for (key, value) in &patch {
                        object.insert(key.clone(), value.clone());
                    }
                    affected += 1;
                }
            }
        }

        Ok(affected)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<u64> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }

        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };

        let before = rows.len();
        rows.retain(|row| !filters.iter().all(|f| f.matches(row)));
        Ok((before - rows.len()) as u64)
    }
}

fn project(row: &Row, columns: &[String]) -> Row {
    let mut projected = Map::new();
    if let Value::Object(object) = row {
        for column in columns {
            if let Some(value) = object.get(column) {
                projected.insert(column.clone(), value.clone());
            }
        }
    }
    Value::Object(projected)
}
