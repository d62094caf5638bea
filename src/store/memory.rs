//! In-memory data store used by tests and the simulated backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use super::{DataStore, Filters, StoreError};

/// Table map with the same equality-filter semantics as the REST store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a table's rows, for assertions.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn matches(row: &Value, filters: Filters<'_>) -> bool {
        filters
            .iter()
            .all(|(column, value)| match row.get(*column) {
                Some(Value::String(s)) => s == value,
                Some(Value::Bool(b)) => value.parse::<bool>().map(|v| v == *b).unwrap_or(false),
                Some(Value::Number(n)) => n.to_string() == *value,
                Some(Value::Null) | None => value == "null",
                Some(_) => false,
            })
    }

    fn merge(target: &mut Value, patch: &Value) {
        if let (Some(target_map), Some(patch_map)) = (target.as_object_mut(), patch.as_object()) {
            for (k, v) in patch_map {
                target_map.insert(k.clone(), v.clone());
            }
        }
    }

    fn into_rows(rows: Value) -> Vec<Value> {
        match rows {
            Value::Array(items) => items,
            other => vec![other],
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn fetch(&self, table: &str, filters: Filters<'_>) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .tables
            .lock()
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| Self::matches(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: Value) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let target = tables.entry(table.to_string()).or_default();
        target.extend(Self::into_rows(rows));
        Ok(())
    }

    async fn upsert(&self, table: &str, rows: Value, on_conflict: &str) -> Result<(), StoreError> {
        let conflict_columns: Vec<&str> = on_conflict.split(',').map(str::trim).collect();
        let mut tables = self.tables.lock();
        let target = tables.entry(table.to_string()).or_default();

        for incoming in Self::into_rows(rows) {
            let existing = target.iter_mut().find(|row| {
                conflict_columns
                    .iter()
                    .all(|column| row.get(*column) == incoming.get(*column))
            });
            match existing {
                Some(row) => Self::merge(row, &incoming),
                None => target.push(incoming),
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        filters: Filters<'_>,
        patch: Value,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| Self::matches(row, filters)) {
                Self::merge(row, &patch);
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filters: Filters<'_>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !Self::matches(row, filters));
        }
        Ok(())
    }
}
