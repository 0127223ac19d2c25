//! Error types for flashrec
//!
//! Provides a unified error type for all storage operations, plus the
//! flat `Status` code taxonomy exposed to callers that only care about
//! the outcome class.

use thiserror::Error;

use crate::backend::BackendError;

/// Result type alias using FlashError
pub type Result<T> = std::result::Result<T, FlashError>;

/// Unified error type for flashrec operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Storage is not initialized")]
    NotInitialized,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Record length {len} exceeds maximum of {max} bytes")]
    DataSize { len: usize, max: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Record not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Resource Errors (retry after GC or once idle)
    // -------------------------------------------------------------------------
    #[error("Out of space: {needed} bytes needed, {available} available")]
    OutOfSpace { needed: usize, available: usize },

    #[error("Storage is busy")]
    Busy,

    // -------------------------------------------------------------------------
    // Physical Errors
    // -------------------------------------------------------------------------
    #[error("Fatal flash failure: {0}")]
    Fatal(#[from] BackendError),

    #[error("Flash contents corrupted: {0}")]
    Corrupted(String),

    // -------------------------------------------------------------------------
    // Snapshot Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FlashError {
    /// Map this error onto the external status taxonomy
    pub fn status(&self) -> Status {
        match self {
            FlashError::NotInitialized => Status::NotInitialized,
            FlashError::InvalidState(_) | FlashError::Config(_) => Status::InvalidState,
            FlashError::DataSize { .. } | FlashError::Serialization(_) => Status::DataSize,
            FlashError::NotFound => Status::NotFound,
            FlashError::OutOfSpace { .. } => Status::OutOfSpace,
            FlashError::Busy => Status::Busy,
            FlashError::Fatal(_) | FlashError::Corrupted(_) => Status::Fatal,
        }
    }

    /// Whether the caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlashError::Busy | FlashError::OutOfSpace { .. })
    }
}

/// External status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    NotInitialized = 0x01,
    InvalidState = 0x02,
    NotFound = 0x03,
    DataSize = 0x04,
    OutOfSpace = 0x05,
    Busy = 0x06,
    Fatal = 0x07,
}

impl Status {
    /// Status of an operation result
    pub fn of<T>(result: &Result<T>) -> Status {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl From<&FlashError> for Status {
    fn from(error: &FlashError) -> Self {
        error.status()
    }
}
