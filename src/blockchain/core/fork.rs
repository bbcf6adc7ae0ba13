//! Structural conflict detection: competing successors and double spends.
//!
//! Both checks are answered from indexes kept alongside the chain, so a lookup
//! does not rescan history. When several existing blocks conflict, the one
//! appended earliest is reported; on a tie in position, a position conflict
//! is reported before a double spend.

use super::block::Block;
use super::payload::{BlockPayload, RejectionReason};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForkReason {
    PositionConflict,
    DoubleSpend,
}

impl From<ForkReason> for RejectionReason {
    fn from(reason: ForkReason) -> Self {
        match reason {
            ForkReason::PositionConflict => RejectionReason::PositionConflict,
            ForkReason::DoubleSpend => RejectionReason::DoubleSpend,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkResult {
    pub is_fork: bool,
    pub conflict_block: Option<Block>,
    pub reason: Option<ForkReason>,
}

impl ForkResult {
    pub fn none() -> Self {
        Self {
            is_fork: false,
            conflict_block: None,
            reason: None,
        }
    }

    fn conflict(block: &Block, reason: ForkReason) -> Self {
        Self {
            is_fork: true,
            conflict_block: Some(block.clone()),
            reason: Some(reason),
        }
    }
}

/// Arena positions of appended blocks, keyed for the two conflict checks.
#[derive(Debug, Clone, Default)]
pub struct ForkIndex {
    by_prev: HashMap<Option<String>, Vec<usize>>,
    transfers_by_spender: HashMap<(String, String), Vec<usize>>,
}

impl ForkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `block`, appended at arena position `position`.
    /// Positions must be recorded in increasing order.
    pub fn record(&mut self, position: usize, block: &Block) {
        self.by_prev
            .entry(block.prev_block_id().map(str::to_string))
            .or_default()
            .push(position);

        if let BlockPayload::Transfer { blockchain_id, .. } = block.payload() {
            self.transfers_by_spender
                .entry((block.creator().to_string(), blockchain_id.clone()))
                .or_default()
                .push(position);
        }
    }

    pub fn detect(&self, blocks: &[Block], new_block: &Block) -> ForkResult {
        let position_conflict = self
            .by_prev
            .get(&new_block.prev_block_id().map(str::to_string))
            .and_then(|positions| {
                positions
                    .iter()
                    .copied()
                    .find(|&p| blocks[p].id() != new_block.id())
            });

        let double_spend = match new_block.payload() {
            BlockPayload::Transfer {
                blockchain_id,
                target_user_id,
            } => self
                .transfers_by_spender
                .get(&(new_block.creator().to_string(), blockchain_id.clone()))
                .and_then(|positions| {
                    positions.iter().copied().find(|&p| {
                        matches!(
                            blocks[p].payload(),
                            BlockPayload::Transfer { target_user_id: existing, .. }
                                if existing != target_user_id
                        )
                    })
                }),
            _ => None,
        };

        match (position_conflict, double_spend) {
            (Some(p), Some(d)) if d < p => ForkResult::conflict(&blocks[d], ForkReason::DoubleSpend),
            (Some(p), _) => ForkResult::conflict(&blocks[p], ForkReason::PositionConflict),
            (None, Some(d)) => ForkResult::conflict(&blocks[d], ForkReason::DoubleSpend),
            (None, None) => ForkResult::none(),
        }
    }
}
