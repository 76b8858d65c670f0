//! Error types for OPP

use thiserror::Error;

/// Flow state store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// New flow refused because the store holds `capacity` flows already
    #[error("flow state store full ({capacity} flows)")]
    Full {
        /// Configured maximum number of flows
        capacity: usize,
    },
}

/// Transition table errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// New rule refused because the table holds `capacity` rules already
    #[error("transition table full ({capacity} rules)")]
    Full {
        /// Configured maximum number of rules
        capacity: usize,
    },
}

/// Map registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Name already bound to a live map
    #[error("map already pinned at {0}")]
    AlreadyPinned(String),

    /// Nothing pinned under that name
    #[error("no map pinned at {0}")]
    NotPinned(String),

    /// Name is bound to a map of another kind
    #[error("map at {name} is a {found}, expected a {expected}")]
    KindMismatch {
        /// Pinned name
        name: String,
        /// Kind requested by the caller
        expected: &'static str,
        /// Kind actually pinned
        found: &'static str,
    },
}

/// OPP error type
#[derive(Error, Debug)]
pub enum OppError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Flow state store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Transition table error
    #[error(transparent)]
    Table(#[from] TableError),

    /// Map registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for OPP
pub type OppResult<T> = Result<T, OppError>;
