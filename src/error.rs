//! Error types for the banknote ledger

use thiserror::Error;

/// Operational failures of the cryptographic layer.
///
/// Signature mismatches are not errors; `verify` answers them with `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Crypto task {id} timed out after {timeout_ms} ms")]
    TaskTimeout { id: String, timeout_ms: u128 },
    #[error("Task executor unavailable: {0}")]
    ExecutorUnavailable(String),
    #[error("Crypto task {id} failed: {reason}")]
    TaskFailed { id: String, reason: String },
}

/// Structural problems found while parsing a chain definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("Syntax error on line {line}: {reason}")]
    Syntax { line: usize, reason: String },
    #[error("Invalid range {start}-{end}")]
    InvalidRange { start: i128, end: i128 },
    #[error("Range {start}-{end} has non-positive value {value}")]
    NonPositiveValue { start: u64, end: u64, value: f64 },
    #[error("Range starting at {start} overlaps previous range ending at {previous_end}")]
    Overlap { previous_end: u64, start: u64 },
    #[error("Chain definition contains no ranges")]
    Empty,
    #[error("Malformed structured definition: {0}")]
    Json(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),
    #[error("Serial number {0} is not covered by the chain definition")]
    SerialOutOfRange(String),
    #[error("Serial number {0:?} is not a valid unsigned integer")]
    InvalidSerial(String),
    #[error("Chain has no root block")]
    MissingRoot,
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Deserialization(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
