//! Raw-mode terminal front-end: a multi-line input buffer, a status bar,
//! on-disk command history, and a console loop that dispatches either
//! meta-commands (`.schema`, `.btree`, ...) or SQL statements against an
//! [`crate::engine::Engine`].

pub mod buffer;
pub mod console;
pub mod history;
pub mod prompt;
pub mod status;

pub use console::start;
