//! Maps table names to open [`Table`] handles over sibling files
//! `<base_path>.<table_name>`, so joins and multi-table statements can open
//! a second table without the caller managing file paths by hand.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::info;

use crate::err;
use crate::errors::Error;
use crate::storage::table::Table;

pub struct TableManager {
    base_path: PathBuf,
    tables: HashMap<String, Table>,
    max_open_tables: usize,
    max_pages: usize,
}

impl TableManager {
    pub fn new(base_path: PathBuf, max_open_tables: usize, max_pages: usize) -> Self {
        TableManager {
            base_path,
            tables: HashMap::new(),
            max_open_tables,
            max_pages,
        }
    }

    fn table_path(&self, name: &str) -> PathBuf {
        let mut p = self.base_path.as_os_str().to_owned();
        p.push(".");
        p.push(name);
        PathBuf::from(p)
    }

    /// Opens `name`, returning the already-open handle if present.
    pub fn open(&mut self, name: &str) -> Result<(), Error> {
        if self.tables.contains_key(name) {
            return Ok(());
        }
        if self.tables.len() >= self.max_open_tables {
            return Err(err!(
                TableFull,
                "cannot open table '{}', max_open_tables ({}) reached",
                name,
                self.max_open_tables
            ));
        }
        let path = self.table_path(name);
        let table = Table::open(name, path, self.max_pages)?;
        info!(table = name, "opened table");
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Table, Error> {
        self.open(name)?;
        self.tables
            .get_mut(name)
            .ok_or_else(|| err!(NotFound, "table '{}' not open", name))
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn close_all(&mut self) -> Result<(), Error> {
        for (name, table) in self.tables.iter_mut() {
            info!(table = name, "closing table");
            table.close()?;
        }
        self.tables.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut mgr = TableManager::new(dir.path().join("base"), 8, 100);
        mgr.open("users").unwrap();
        mgr.open("users").unwrap();
        assert_eq!(mgr.table_names(), vec!["users".to_string()]);
    }

    #[test]
    fn open_table_full_errors() {
        let dir = tempdir().unwrap();
        let mut mgr = TableManager::new(dir.path().join("base"), 1, 100);
        mgr.open("a").unwrap();
        assert!(mgr.open("b").is_err());
    }
}
