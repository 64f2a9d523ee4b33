//! The single context object a REPL session owns: schema catalog, open
//! tables, secondary indexes, and running query statistics. Replaces what
//! would otherwise be a handful of process-global singletons.

use std::path::PathBuf;

use tracing::info;

use crate::errors::Error;
use crate::planner::{QueryPlan, ScanType};
use crate::storage::index::IndexManager;
use crate::storage::schema::Schema;
use crate::storage::table_manager::TableManager;

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub max_pages: usize,
    pub max_tables: usize,
    pub max_indexes: usize,
    pub max_open_tables: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { max_pages: 100, max_tables: 8, max_indexes: 4, max_open_tables: 8 }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QueryStats {
    pub full_scans: u64,
    pub index_searches: u64,
    pub rows_scanned: u64,
    pub rows_returned: u64,
}

impl QueryStats {
    pub fn record(&mut self, plan: &QueryPlan, returned: usize) {
        match plan.scan_type {
            ScanType::FullTable => self.full_scans += 1,
            ScanType::IndexSearch | ScanType::IndexRange => self.index_searches += 1,
        }
        self.rows_scanned += plan.estimated_rows as u64;
        self.rows_returned += returned as u64;
    }
}

pub struct Engine {
    pub base_path: PathBuf,
    pub config: EngineConfig,
    pub schema: Schema,
    pub tables: TableManager,
    pub indexes: IndexManager,
    pub stats: QueryStats,
}

impl Engine {
    pub fn open(base_path: PathBuf, config: EngineConfig) -> Result<Self, Error> {
        let schema = Schema::load(&base_path)?;
        let mut tables = TableManager::new(base_path.clone(), config.max_open_tables, config.max_pages);
        tables.open("users")?;
        info!(path = %base_path.display(), "engine opened");
        Ok(Engine {
            base_path,
            config,
            schema,
            tables,
            indexes: IndexManager::new(config.max_indexes),
            stats: QueryStats::default(),
        })
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.tables.close_all()?;
        self.schema.save(&self.base_path)?;
        info!("engine closed");
        Ok(())
    }

    pub fn checkpoint(&mut self) -> Result<(), Error> {
        for name in self.tables.table_names() {
            self.tables.get_mut(&name)?.checkpoint()?;
        }
        Ok(())
    }
}
