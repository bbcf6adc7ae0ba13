// Thin re-export module: the ledger model lives in `blockchain/core.rs`, split
// into payloads, blocks, the append-only chain, fork detection, chain
// validation and the serialized interchange form.

pub mod core;
pub use self::core::*;
