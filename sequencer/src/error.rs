//! Error types for sequence execution and equipment access

use thiserror::Error;

/// Errors raised by mediator calls
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EquipmentError {
    #[error("{0} is not connected")]
    NotConnected(String),

    #[error("{device} cannot {operation}")]
    NotSupported { device: String, operation: String },

    #[error("Camera is busy: capture block held by {0}")]
    CaptureBlocked(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors raised while executing sequence items
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequenceError {
    // ===== Control flow =====
    /// Cooperative cancellation; the item returns to `Created`
    #[error("Sequence cancelled")]
    Cancelled,

    /// The item decided not to run; it ends as `Skipped`
    #[error("Skipped: {0}")]
    Skipped(String),

    // ===== Failures =====
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Equipment error: {0}")]
    Equipment(EquipmentError),

    #[error("Instruction failed: {0}")]
    Failed(String),

    // ===== Sequence files =====
    #[error("Invalid sequence definition: {0}")]
    InvalidDefinition(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    // ===== Executor =====
    #[error("Executor error: {0}")]
    Executor(String),
}

impl SequenceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SequenceError::Cancelled)
    }
}

impl From<EquipmentError> for SequenceError {
    fn from(err: EquipmentError) -> Self {
        match err {
            EquipmentError::Cancelled => SequenceError::Cancelled,
            other => SequenceError::Equipment(other),
        }
    }
}

impl From<serde_json::Error> for SequenceError {
    fn from(err: serde_json::Error) -> Self {
        SequenceError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SequenceError {
    fn from(err: std::io::Error) -> Self {
        SequenceError::Io(err.to_string())
    }
}

pub type SequenceResult<T> = Result<T, SequenceError>;
pub type EquipmentResult<T> = Result<T, EquipmentError>;
