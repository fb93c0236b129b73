/// Error types for the mmdb-sift library
use std::fmt;

/// Result type alias for reader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for database open and lookup operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Structural corruption in the database image: unknown control byte,
    /// pointer target outside the data section, bad float/double/boolean
    /// size, missing metadata marker, unsupported record size, and so on
    InvalidDatabase(String),

    /// Lookup attempted after `close()`
    ClosedDatabase,

    /// A `UTF8_STRING` entry contained bytes that are not valid UTF-8
    BadUtf8,

    /// I/O errors while opening or loading the database
    Io(String),

    /// Caller misuse surfaced eagerly: duplicate or conflicting callback
    /// registration, address of the wrong length
    CallerContract(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidDatabase(msg) => write!(f, "Invalid database: {}", msg),
            Error::ClosedDatabase => write!(f, "The database has been closed"),
            Error::BadUtf8 => write!(f, "Invalid UTF-8 in string data"),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
            Error::CallerContract(msg) => write!(f, "Caller contract violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
