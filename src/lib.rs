//! minidb: a small embedded SQL engine with a B+tree table store, a
//! write-ahead log, in-memory secondary indexes, and a hand-rolled
//! SQL dialect.
//!
//! This crate exposes the pieces a front-end (the bundled REPL, or a
//! test harness) needs to open a database file, plan, and execute
//! statements against it. The `repl` module lives only in the binary.

pub mod errors;
pub mod config;
pub mod engine;
pub mod executor;
pub mod planner;
pub mod sql;
pub mod storage;
