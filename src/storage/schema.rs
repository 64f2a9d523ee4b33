//! Catalog of table definitions, persisted as a bincode-encoded sidecar file
//! next to the main data file so `CREATE TABLE` survives a restart.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bincode::{Decode, Encode};
use once_cell::sync::Lazy;
use tracing::info;

use crate::err;
use crate::errors::Error;

/// The columns every fresh registry starts with, built once and cloned
/// rather than re-literalized on every `with_default_users_table` call.
static DEFAULT_USERS_COLUMNS: Lazy<Vec<ColumnDef>> = Lazy::new(|| {
    vec![
        ColumnDef { name: "id".to_string(), col_type: ColumnType::Int, primary_key: true },
        ColumnDef { name: "username".to_string(), col_type: ColumnType::Varchar(32), primary_key: false },
        ColumnDef { name: "email".to_string(), col_type: ColumnType::Varchar(255), primary_key: false },
    ]
});

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum ColumnType {
    Int,
    Varchar(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    pub primary_key: bool,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Schema {
    tables: HashMap<String, TableSchema>,
}

impl Schema {
    /// A fresh registry always carries the built-in `users` table so the
    /// default single-table workflow never requires an explicit
    /// `CREATE TABLE`.
    pub fn with_default_users_table() -> Self {
        let mut schema = Schema::default();
        schema.tables.insert(
            "users".to_string(),
            TableSchema {
                name: "users".to_string(),
                columns: DEFAULT_USERS_COLUMNS.clone(),
            },
        );
        schema
    }

    pub fn add_table(&mut self, table: TableSchema, max_tables: usize) -> Result<(), Error> {
        if self.tables.contains_key(&table.name) {
            return Err(err!(Schema, "table '{}' already exists", table.name));
        }
        if self.tables.len() >= max_tables {
            return Err(err!(TableFull, "max_tables ({}) reached", max_tables));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<&TableSchema, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| err!(NotFound, "no such table '{}'", name))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn sidecar_path(base: &Path) -> PathBuf {
        let mut p = base.as_os_str().to_owned();
        p.push(".schema");
        PathBuf::from(p)
    }

    /// Loads the sidecar if present and well-formed; a missing or
    /// short/corrupt file quietly yields a fresh default registry rather
    /// than failing database startup.
    pub fn load(base: &Path) -> Result<Self, Error> {
        let path = Self::sidecar_path(base);
        let mut buf = Vec::new();
        let read = OpenOptions::new().read(true).open(&path).and_then(|mut f| f.read_to_end(&mut buf));
        match read {
            Ok(n) if n > 0 => match bincode::decode_from_slice::<Schema, _>(&buf, bincode::config::standard()) {
                Ok((schema, _)) => {
                    info!(path = %path.display(), "loaded schema registry");
                    Ok(schema)
                }
                Err(_) => Ok(Self::with_default_users_table()),
            },
            _ => Ok(Self::with_default_users_table()),
        }
    }

    pub fn save(&self, base: &Path) -> Result<(), Error> {
        let path = Self::sidecar_path(base);
        let buf = bincode::encode_to_vec(self, bincode::config::standard())?;
        let tmp = path.with_extension("schema.tmp");
        {
            let mut f = OpenOptions::new().write(true).create(true).truncate(true).open(&tmp)?;
            f.write_all(&buf)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_schema_has_users_table() {
        let schema = Schema::with_default_users_table();
        assert!(schema.get_table("users").is_ok());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("db");
        let mut schema = Schema::with_default_users_table();
        schema
            .add_table(
                TableSchema {
                    name: "orders".to_string(),
                    columns: vec![ColumnDef { name: "id".to_string(), col_type: ColumnType::Int, primary_key: true }],
                },
                8,
            )
            .unwrap();
        schema.save(&base).unwrap();

        let loaded = Schema::load(&base).unwrap();
        assert!(loaded.get_table("orders").is_ok());
        assert!(loaded.get_table("users").is_ok());
    }

    #[test]
    fn missing_sidecar_yields_default() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("nope");
        let schema = Schema::load(&base).unwrap();
        assert!(schema.get_table("users").is_ok());
    }

    #[test]
    fn duplicate_table_rejected() {
        let mut schema = Schema::with_default_users_table();
        let dup = TableSchema { name: "users".to_string(), columns: vec![] };
        assert!(schema.add_table(dup, 8).is_err());
    }
}
