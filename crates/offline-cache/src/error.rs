//! Error types for the offline cache

use std::fmt;

use serde::Serialize;

/// Machine-readable error kind, stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    TransportFailure,
    NoCachedData,
    StoreWriteFailure,
    StoreReadFailure,
    InvalidNamespace,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::TransportFailure => "TransportFailure",
            ErrorKind::NoCachedData => "NoCachedData",
            ErrorKind::StoreWriteFailure => "StoreWriteFailure",
            ErrorKind::StoreReadFailure => "StoreReadFailure",
            ErrorKind::InvalidNamespace => "InvalidNamespace",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum CacheError {
    Transport(String),
    NoCachedData(String),
    StoreWrite(String),
    StoreRead(String),
    Io(Box<std::io::Error>),
    Serialization(serde_json::Error),
    InvalidNamespace(String),
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::Transport(_) => ErrorKind::TransportFailure,
            CacheError::NoCachedData(_) => ErrorKind::NoCachedData,
            CacheError::StoreWrite(_) => ErrorKind::StoreWriteFailure,
            CacheError::StoreRead(_) | CacheError::Io(_) | CacheError::Serialization(_) => {
                ErrorKind::StoreReadFailure
            }
            CacheError::InvalidNamespace(_) => ErrorKind::InvalidNamespace,
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Transport(msg) => write!(f, "Transport error: {}", msg),
            CacheError::NoCachedData(url) => write!(f, "No cached data for {}", url),
            CacheError::StoreWrite(msg) => write!(f, "Store write error: {}", msg),
            CacheError::StoreRead(msg) => write!(f, "Store read error: {}", msg),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Serialization(err) => write!(f, "Serialization error: {}", err),
            CacheError::InvalidNamespace(name) => write!(f, "Invalid namespace name: {:?}", name),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
