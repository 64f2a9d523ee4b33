use std::fmt;

/// The single error currency threaded through the storage engine, planner,
/// and REPL. Recoverable conditions (duplicate key, not found, syntax) are
/// returned to the caller; `IOFatal` is reserved for conditions the REPL
/// treats as unrecoverable for the process.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Encoding(String),
    DuplicateKey(u32),
    TableFull(String),
    NotFound(String),
    Syntax(String),
    IOFatal(String),
    WALInvalid(String),
    Schema(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Encoding(msg) => write!(f, "encoding error: {}", msg),
            Error::DuplicateKey(id) => write!(f, "duplicate key: {}", id),
            Error::TableFull(msg) => write!(f, "table full: {}", msg),
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::Syntax(msg) => write!(f, "syntax error: {}", msg),
            Error::IOFatal(msg) => write!(f, "fatal I/O error: {}", msg),
            Error::WALInvalid(msg) => write!(f, "WAL invalid: {}", msg),
            Error::Schema(msg) => write!(f, "schema error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(e: bincode::error::EncodeError) -> Error {
        Error::Encoding(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(e: bincode::error::DecodeError) -> Error {
        Error::Encoding(e.to_string())
    }
}

/// Shorthand for building an error with a formatted message, matching call
/// sites that read `err!(Syntax, "...", a, b)`.
#[macro_export]
macro_rules! err {
    ($variant:ident, $($arg:tt)*) => {
        $crate::errors::Error::$variant(format!($($arg)*))
    };
}
