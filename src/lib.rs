//! Banknote Ledger - ledger and consensus-validation engine for simulated digital banknotes
//!
//! Every banknote is a serial number with a face value, and its ownership
//! history is one append-only chain of signed blocks. Propagation delay between
//! peers is simulated with scalar network parameters rather than real transport.
//!
//! # Architecture
//!
//! ## Ledger
//! - [`blockchain`] - Blocks, payloads, the append-only chain, fork and double-spend detection
//! - [`definition`] - Serial-number range tables and their hashes
//! - [`validator`] - Broadcast-time model, reception checks, rejection blocks
//!
//! ## Cryptography
//! - [`crypto`] - P-256 keys, ECDSA signatures, SHA-256, batched and offloaded execution
//!
//! ## Configuration & Utilities
//! - [`config`] - Simulation configuration
//! - [`error`] - Error types
//!
//! Fork resolution is deliberately absent: the engine reports forks, double
//! spends and late blocks, and leaves accept/reject decisions to its caller.

#![forbid(unsafe_code)]

// ============================================================================
// Ledger
// ============================================================================
pub mod blockchain;
pub mod definition;
pub mod validator;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use blockchain::{Block, BlockChain, BlockPayload, ForkReason, ForkResult, RejectionReason, Tick};
pub use definition::ChainDefinition;
pub use error::{ChainError, CryptoError, DefinitionError, Result};
pub use validator::{NetworkParams, ReceptionValidation, Validator};
