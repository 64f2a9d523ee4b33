//! Secondary indexes: sorted `(value, primary_key)` vectors kept entirely in
//! memory and rebuilt by a full table scan on first use. They are not
//! persisted -- a restart loses them and the planner falls back to a full
//! scan until `CREATE INDEX` (or the next lookup's lazy build) runs again.

use std::collections::HashMap;

use crate::err;
use crate::errors::Error;
use crate::storage::row::{column_value, Row};

const INITIAL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    pub table: String,
    pub column: String,
    entries: Vec<(String, u32)>,
}

impl SecondaryIndex {
    fn new(table: &str, column: &str) -> Self {
        SecondaryIndex {
            table: table.to_string(),
            column: column.to_string(),
            entries: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    fn insertion_point(&self, value: &str) -> usize {
        self.entries.partition_point(|(v, _)| v.as_str() < value)
    }

    pub fn insert(&mut self, value: &str, primary_key: u32) {
        let at = self.insertion_point(value);
        self.entries.insert(at, (value.to_string(), primary_key));
    }

    pub fn delete(&mut self, value: &str, primary_key: u32) {
        if let Some(pos) = self.entries.iter().position(|(v, pk)| v == value && *pk == primary_key) {
            self.entries.remove(pos);
        }
    }

    /// Every primary key stored under an exact value match.
    pub fn lookup(&self, value: &str) -> Vec<u32> {
        let start = self.insertion_point(value);
        self.entries[start..]
            .iter()
            .take_while(|(v, _)| v == value)
            .map(|(_, pk)| *pk)
            .collect()
    }

    /// Primary keys whose indexed value falls in `[low, high]`, in value order.
    pub fn range(&self, low: &str, high: &str) -> Vec<u32> {
        let start = self.insertion_point(low);
        self.entries[start..]
            .iter()
            .take_while(|(v, _)| v.as_str() <= high)
            .map(|(_, pk)| *pk)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct IndexManager {
    indexes: HashMap<(String, String), SecondaryIndex>,
    max_indexes: usize,
}

impl IndexManager {
    pub fn new(max_indexes: usize) -> Self {
        IndexManager { indexes: HashMap::new(), max_indexes }
    }

    fn key(table: &str, column: &str) -> (String, String) {
        (table.to_string(), column.to_string())
    }

    pub fn has_index(&self, table: &str, column: &str) -> bool {
        self.indexes.contains_key(&Self::key(table, column))
    }

    /// Creates an empty index and populates it from `rows` (a full scan the
    /// caller has already performed), doubling over the initial capacity as
    /// entries are inserted.
    pub fn create(&mut self, table: &str, column: &str, rows: &[Row]) -> Result<(), Error> {
        if self.has_index(table, column) {
            return Err(err!(Schema, "index already exists on {}.{}", table, column));
        }
        if self.indexes.len() >= self.max_indexes {
            return Err(err!(TableFull, "max_indexes ({}) reached", self.max_indexes));
        }
        let mut index = SecondaryIndex::new(table, column);
        for row in rows {
            let value = row_column_value(row, column)?;
            index.insert(&value, row.id);
        }
        self.indexes.insert(Self::key(table, column), index);
        Ok(())
    }

    pub fn get(&self, table: &str, column: &str) -> Option<&SecondaryIndex> {
        self.indexes.get(&Self::key(table, column))
    }

    pub fn insert_row(&mut self, table: &str, row: &Row) -> Result<(), Error> {
        for (k, index) in self.indexes.iter_mut() {
            if k.0 == table {
                let value = row_column_value(row, &index.column)?;
                index.insert(&value, row.id);
            }
        }
        Ok(())
    }

    pub fn delete_row(&mut self, table: &str, row: &Row) -> Result<(), Error> {
        for (k, index) in self.indexes.iter_mut() {
            if k.0 == table {
                let value = row_column_value(row, &index.column)?;
                index.delete(&value, row.id);
            }
        }
        Ok(())
    }

    pub fn index_names(&self, table: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .indexes
            .keys()
            .filter(|(t, _)| t == table)
            .map(|(_, c)| c.clone())
            .collect();
        names.sort();
        names
    }
}

fn row_column_value(row: &Row, column: &str) -> Result<String, Error> {
    column_value(row, column).map(|v| v.to_display_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<Row> {
        vec![
            Row::new(1, "carol", "carol@example.com").unwrap(),
            Row::new(2, "alice", "alice@example.com").unwrap(),
            Row::new(3, "bob", "bob@example.com").unwrap(),
        ]
    }

    #[test]
    fn create_and_lookup() {
        let mut mgr = IndexManager::new(4);
        mgr.create("users", "username", &sample_rows()).unwrap();
        let hits = mgr.get("users", "username").unwrap().lookup("alice");
        assert_eq!(hits, vec![2]);
    }

    #[test]
    fn insert_row_keeps_sorted_order() {
        let mut mgr = IndexManager::new(4);
        mgr.create("users", "username", &sample_rows()).unwrap();
        mgr.insert_row("users", &Row::new(4, "aaron", "aaron@example.com").unwrap()).unwrap();
        let idx = mgr.get("users", "username").unwrap();
        assert_eq!(idx.range("a", "b"), vec![4, 2]);
    }

    #[test]
    fn delete_row_removes_entry() {
        let mut mgr = IndexManager::new(4);
        mgr.create("users", "username", &sample_rows()).unwrap();
        mgr.delete_row("users", &Row::new(2, "alice", "alice@example.com").unwrap()).unwrap();
        assert!(mgr.get("users", "username").unwrap().lookup("alice").is_empty());
    }

    #[test]
    fn max_indexes_enforced() {
        let mut mgr = IndexManager::new(1);
        mgr.create("users", "username", &sample_rows()).unwrap();
        assert!(mgr.create("users", "email", &sample_rows()).is_err());
    }
}
