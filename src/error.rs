use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// CinderDB errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A point lookup or update referenced a primary key that does not exist.
    NotFound,
    /// An insert collided with an existing primary key.
    AlreadyExists(String),
    /// A record failed to serialize or deserialize.
    Serialization(String),
    /// A key could not be encoded or decoded, typically a truncated or
    /// malformed composite key or an ill-formed selector.
    KeyCodec(String),
    /// Semantically conflicting options, typically query builder misuse.
    Usage(String),
    /// The cancellation token fired before the operation completed.
    Canceled,
    /// An underlying engine error (I/O, lock poisoning).
    Backend(String),
    /// A stored invariant does not hold, e.g. an index entry referencing a
    /// missing primary row.
    Corruption(String),
    /// The store was written by an incompatible core version.
    VersionMismatch { found: u32, expected: u32 },
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "record not found"),
            Error::AlreadyExists(msg) => write!(f, "record already exists: {msg}"),
            Error::Serialization(msg) => write!(f, "serialization failed: {msg}"),
            Error::KeyCodec(msg) => write!(f, "key codec: {msg}"),
            Error::Usage(msg) => write!(f, "usage: {msg}"),
            Error::Canceled => write!(f, "operation canceled"),
            Error::Backend(msg) => write!(f, "backend error: {msg}"),
            Error::Corruption(msg) => write!(f, "corruption: {msg}"),
            Error::VersionMismatch { found, expected } => {
                write!(f, "store version is {found} but expecting {expected}")
            }
        }
    }
}

/// Constructs an Error::KeyCodec for the given format string.
#[macro_export]
macro_rules! errkey {
    ($($args:tt)*) => { $crate::error::Error::KeyCodec(format!($($args)*)).into() };
}

/// Constructs an Error::Usage for the given format string.
#[macro_export]
macro_rules! errusage {
    ($($args:tt)*) => { $crate::error::Error::Usage(format!($($args)*)).into() };
}

/// Constructs an Error::Corruption for the given format string.
#[macro_export]
macro_rules! errcorrupt {
    ($($args:tt)*) => { $crate::error::Error::Corruption(format!($($args)*)).into() };
}

/// A CinderDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Backend(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Backend(err.to_string())
    }
}
