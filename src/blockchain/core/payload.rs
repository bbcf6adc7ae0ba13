/// Block payloads for the banknote ledger
use serde::{Deserialize, Serialize};

/// Logical time unit; blocks are stamped with ticks, never wall-clock time.
pub type Tick = u64;

/// Why a block was rejected by a receiving node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    TimeViolation,
    PositionConflict,
    DoubleSpend,
    InvalidSignature,
    InvalidLinkage,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::TimeViolation => "TIME_VIOLATION",
            RejectionReason::PositionConflict => "POSITION_CONFLICT",
            RejectionReason::DoubleSpend => "DOUBLE_SPEND",
            RejectionReason::InvalidSignature => "INVALID_SIGNATURE",
            RejectionReason::InvalidLinkage => "INVALID_LINKAGE",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a block records. Serialized with a lowercase `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockPayload {
    /// Genesis of a chain; binds it to a definition and a serial number.
    #[serde(rename_all = "camelCase")]
    Root {
        definition_hash: String,
        serial_number: String,
    },
    /// First assignment of the note to a real owner.
    #[serde(rename_all = "camelCase")]
    Ownership { owner_id: String },
    /// Ownership change, signed by the current owner.
    #[serde(rename_all = "camelCase")]
    Transfer {
        blockchain_id: String,
        target_user_id: String,
    },
    /// Record of a block a node refused; not an ownership event.
    #[serde(rename_all = "camelCase")]
    Rejection {
        original_block_id: String,
        original_block_creator: String,
        original_block_time: Tick,
        rejection_reason: RejectionReason,
        rejector_id: String,
        rejection_time: Tick,
    },
}

impl BlockPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            BlockPayload::Root { .. } => "root",
            BlockPayload::Ownership { .. } => "ownership",
            BlockPayload::Transfer { .. } => "transfer",
            BlockPayload::Rejection { .. } => "rejection",
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, BlockPayload::Root { .. })
    }

    /// The owner this payload hands the note to, if it is an ownership event.
    pub fn new_owner(&self) -> Option<&str> {
        match self {
            BlockPayload::Ownership { owner_id } => Some(owner_id),
            BlockPayload::Transfer { target_user_id, .. } => Some(target_user_id),
            _ => None,
        }
    }
}
