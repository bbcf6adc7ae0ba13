use super::payload::{BlockPayload, Tick};
use crate::crypto::{self, KeyPair};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};

/// Creator identity of system-authored blocks.
pub const SYSTEM_CREATOR: &str = "SYSTEM";

/// Signature marker carried by system-authored blocks instead of a real signature.
pub const SYSTEM_SIGNATURE: &str = "SYSTEM_SIGNATURE";

/// A block before it has an identity.
///
/// Field order matters: serializing this struct yields the canonical payload
/// that signatures cover (`creator`, `payload`, `prevBlockId`, `time`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedBlock {
    pub creator: String,
    pub payload: BlockPayload,
    pub prev_block_id: Option<String>,
    pub time: Tick,
}

impl UnsignedBlock {
    pub fn new(
        payload: BlockPayload,
        prev_block_id: Option<String>,
        creator: impl Into<String>,
        time: Tick,
    ) -> Self {
        Self {
            creator: creator.into(),
            payload,
            prev_block_id,
            time,
        }
    }

    pub fn canonical_payload(&self) -> Result<String, ChainError> {
        serde_json::to_string(self)
            .map_err(|e| ChainError::InvalidBlock(format!("Canonical encoding failed: {}", e)))
    }

    /// Signs the canonical payload; the signature becomes the block id.
    pub fn sign(self, private_key: &str) -> Result<Block, ChainError> {
        let signature = crypto::sign(&self.canonical_payload()?, private_key)?;
        Ok(self.identify(signature.clone(), signature))
    }

    /// Identifies a system-authored block: the signature is the system marker
    /// and the id is the hash of the canonical payload followed by that marker.
    pub fn assign_id(self) -> Result<Block, ChainError> {
        let id = crypto::hash(&format!("{}{}", self.canonical_payload()?, SYSTEM_SIGNATURE));
        Ok(self.identify(SYSTEM_SIGNATURE.to_string(), id))
    }

    pub(crate) fn identify(self, signature: String, id: String) -> Block {
        Block {
            id,
            payload: self.payload,
            prev_block_id: self.prev_block_id,
            creator: self.creator,
            time: self.time,
            signature,
        }
    }
}

/// An identified block. Nothing about it changes after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    id: String,
    payload: BlockPayload,
    prev_block_id: Option<String>,
    creator: String,
    time: Tick,
    signature: String,
}

impl Block {
    /// Builds a block from already-known parts, e.g. received from a peer.
    /// No check is made that `id` or `signature` match the content.
    pub fn from_parts(
        id: impl Into<String>,
        payload: BlockPayload,
        prev_block_id: Option<String>,
        creator: impl Into<String>,
        time: Tick,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            payload,
            prev_block_id,
            creator: creator.into(),
            time,
            signature: signature.into(),
        }
    }

    /// Signs a new block whose creator is the public key of `private_key`.
    pub fn create_signed(
        payload: BlockPayload,
        prev_block_id: Option<String>,
        private_key: &str,
        time: Tick,
    ) -> Result<Self, ChainError> {
        let creator = KeyPair::from_private_key(private_key)?.public_key;
        UnsignedBlock::new(payload, prev_block_id, creator, time).sign(private_key)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &BlockPayload {
        &self.payload
    }

    pub fn prev_block_id(&self) -> Option<&str> {
        self.prev_block_id.as_deref()
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn time(&self) -> Tick {
        self.time
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn is_root(&self) -> bool {
        self.payload.is_root()
    }

    /// The unsigned form this block was identified from.
    pub fn unsigned(&self) -> UnsignedBlock {
        UnsignedBlock {
            creator: self.creator.clone(),
            payload: self.payload.clone(),
            prev_block_id: self.prev_block_id.clone(),
            time: self.time,
        }
    }

    pub fn canonical_payload(&self) -> Result<String, ChainError> {
        self.unsigned().canonical_payload()
    }

    /// Cheap structural check: id and creator present and, for non-root
    /// blocks, the signature verifies against the creator's key.
    pub fn validate_basic(&self) -> bool {
        if self.id.is_empty() || self.creator.is_empty() {
            return false;
        }
        if self.is_root() {
            return true;
        }
        match self.canonical_payload() {
            Ok(canonical) => crypto::verify(&self.signature, &canonical, &self.creator),
            Err(_) => false,
        }
    }

    /// Whether the id is the one this block's content derives:
    /// the signature for signed blocks, the marker hash for system blocks.
    pub fn has_derived_id(&self) -> bool {
        if self.signature == SYSTEM_SIGNATURE {
            return match self.canonical_payload() {
                Ok(canonical) => self.id == crypto::hash(&format!("{}{}", canonical, SYSTEM_SIGNATURE)),
                Err(_) => false,
            };
        }
        self.id == self.signature
    }
}
