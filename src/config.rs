//! Command-line / environment configuration surface.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "minidb", about = "A small single-user relational database engine")]
pub struct Cli {
    /// Path to the database file.
    pub filename: PathBuf,

    /// Maximum number of in-memory page slots per open table.
    #[arg(long, env = "MINIDB_MAX_PAGES", default_value_t = 100)]
    pub max_pages: usize,

    /// Maximum number of tables the schema registry will hold.
    #[arg(long, env = "MINIDB_MAX_TABLES", default_value_t = 8)]
    pub max_tables: usize,

    /// Maximum number of secondary indexes.
    #[arg(long, env = "MINIDB_MAX_INDEXES", default_value_t = 4)]
    pub max_indexes: usize,

    /// Maximum number of tables open at once via the table manager.
    #[arg(long, env = "MINIDB_MAX_OPEN_TABLES", default_value_t = 8)]
    pub max_open_tables: usize,

    /// Path to the structured log file.
    #[arg(long, env = "MINIDB_LOG_FILE", default_value = "minidb.log")]
    pub log_file: PathBuf,
}
