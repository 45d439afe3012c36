//! Central declaration of tables and their isolation attribute.
//!
//! The original system checked table names against a hard-coded list
//! scattered through the data hooks. Here every table the application
//! touches is declared once, up front, and validated at startup, so a
//! newly added tenant table cannot silently ship unisolated. Tables that
//! were never declared are treated as isolated by the wrappers.

use std::collections::HashMap;

use thiserror::Error;

/// Declaration of a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub isolated: bool,
}

impl TableDef {
    pub fn new(name: impl Into<String>, isolated: bool) -> Self {
        Self {
            name: name.into(),
            isolated,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Table declared twice: {0}")]
    DuplicateTable(String),
}

/// The set of tables known to the application, each flagged as
/// tenant-isolated or not.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, bool>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from declarations, rejecting duplicates.
    pub fn from_defs<I>(defs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = TableDef>,
    {
        let mut registry = Self::new();
        for def in defs {
            registry.declare(def)?;
        }
        Ok(registry)
    }

    /// Declare a table. A duplicate declaration is a startup error, not a
    /// silent overwrite.
    pub fn declare(&mut self, def: TableDef) -> Result<(), RegistryError> {
        if self.tables.contains_key(&def.name) {
            return Err(RegistryError::DuplicateTable(def.name));
        }
        self.tables.insert(def.name, def.isolated);
        Ok(())
    }

    /// `Some(flag)` for a declared table, `None` for an undeclared one.
    /// Callers enforcing isolation must treat `None` as isolated.
    pub fn is_isolated(&self, table: &str) -> Option<bool> {
        self.tables.get(table).copied()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Table declarations for the Forja ERP schema.
///
/// `companies` and `user_companies` are not row-isolated: company
/// visibility is computed by the tenant resolver, and memberships are
/// looked up by user. Everything else carries a `company_id` column.
const ERP_TABLE_DEFS: &[(&str, bool)] = &[
    ("companies", false),
    ("user_companies", false),
    ("users", true),
    ("materials", true),
    ("projects", true),
    ("suppliers", true),
    ("purchase_quotes", true),
    ("requisitions", true),
    ("employees", true),
    ("disciplinary_actions", true),
    ("trainings", true),
    ("vehicles", true),
    ("fuel_records", true),
    ("inventory_counts", true),
    ("stock_movements", true),
    ("warehouse_locations", true),
];

/// The default Forja registry.
pub fn erp_tables() -> TableRegistry {
    let mut tables = HashMap::with_capacity(ERP_TABLE_DEFS.len());
    for (name, isolated) in ERP_TABLE_DEFS {
        tables.insert((*name).to_string(), *isolated);
    }
    TableRegistry { tables }
}
