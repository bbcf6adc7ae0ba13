use super::block::{Block, UnsignedBlock, SYSTEM_CREATOR};
use super::fork::{ForkIndex, ForkResult};
use super::payload::{BlockPayload, Tick};
use crate::crypto::KeyPair;
use crate::definition::ChainDefinition;
use crate::error::ChainError;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Append-only ownership history of one serialized banknote.
///
/// Blocks live in an arena in append order, which is also the canonical
/// history; `positions` maps block ids into it. Callers must serialize
/// mutations of a single chain; separate chains are independent.
#[derive(Debug, Clone)]
pub struct BlockChain {
    pub(super) id: String,
    pub(super) definition: ChainDefinition,
    pub(super) serial_number: String,
    pub(super) value: f64,
    pub(super) blocks: Vec<Block>,
    pub(super) positions: HashMap<String, usize>,
    pub(super) forks: ForkIndex,
    pub(super) current_owner: Option<String>,
}

impl BlockChain {
    /// Creates the chain for `serial_number` and appends its root block.
    pub fn new(definition: ChainDefinition, serial_number: impl Into<String>) -> Result<Self, ChainError> {
        let serial_number = serial_number.into();
        let value = definition.value_of(&serial_number)?;

        let mut chain = BlockChain {
            id: String::new(),
            definition,
            serial_number,
            value,
            blocks: Vec::new(),
            positions: HashMap::new(),
            forks: ForkIndex::new(),
            current_owner: None,
        };
        chain.create_root_block()?;
        info!(
            "Created chain {} for serial {} (value {})",
            short_id(&chain.id),
            chain.serial_number,
            chain.value
        );
        Ok(chain)
    }

    fn create_root_block(&mut self) -> Result<(), ChainError> {
        if !self.blocks.is_empty() {
            return Err(ChainError::InvalidBlock(
                "Root block can only be created on an empty chain".to_string(),
            ));
        }
        let root = UnsignedBlock::new(
            BlockPayload::Root {
                definition_hash: self.definition.definition_hash().to_string(),
                serial_number: self.serial_number.clone(),
            },
            None,
            SYSTEM_CREATOR,
            0,
        )
        .assign_id()?;

        self.id = root.id().to_string();
        self.append(root);
        Ok(())
    }

    /// Assigns the note to `owner_id`, signed by the holder of `private_key`.
    pub fn create_owner_block(
        &mut self,
        owner_id: &str,
        private_key: &str,
        time: Tick,
    ) -> Result<Block, ChainError> {
        let tail = self.tail().ok_or(ChainError::MissingRoot)?.id().to_string();
        let block = Block::create_signed(
            BlockPayload::Ownership {
                owner_id: owner_id.to_string(),
            },
            Some(tail),
            private_key,
            time,
        )?;
        self.append_checked(block)
    }

    /// Hands the note to `target_user_id`. `private_key` must belong to the current owner.
    pub fn create_transfer_block(
        &mut self,
        target_user_id: &str,
        private_key: &str,
        time: Tick,
    ) -> Result<Block, ChainError> {
        let signer = KeyPair::from_private_key(private_key)?.public_key;
        if self.current_owner.as_deref() != Some(signer.as_str()) {
            return Err(ChainError::InvalidBlock(
                "Only the current owner can transfer this note".to_string(),
            ));
        }
        let tail = self.tail().ok_or(ChainError::MissingRoot)?.id().to_string();
        let block = Block::create_signed(
            BlockPayload::Transfer {
                blockchain_id: self.id.clone(),
                target_user_id: target_user_id.to_string(),
            },
            Some(tail),
            private_key,
            time,
        )?;
        self.append_checked(block)
    }

    fn append_checked(&mut self, block: Block) -> Result<Block, ChainError> {
        if self.add_block(block.clone()) {
            Ok(block)
        } else {
            Err(ChainError::InvalidBlock(format!(
                "Chain {} refused block {}",
                short_id(&self.id),
                short_id(block.id())
            )))
        }
    }

    /// Appends `block` if it is well formed and extends the current tail.
    /// A refused block leaves the chain untouched.
    pub fn add_block(&mut self, block: Block) -> bool {
        if block.id().is_empty() {
            warn!("Refusing block without id");
            return false;
        }
        if self.positions.contains_key(block.id()) {
            warn!("Refusing duplicate block {}", short_id(block.id()));
            return false;
        }
        if block.is_root() && !self.blocks.is_empty() {
            warn!("Refusing block {}: chain already has a root", short_id(block.id()));
            return false;
        }
        if !block.validate_basic() {
            warn!("Refusing block {}: basic validation failed", short_id(block.id()));
            return false;
        }
        if let Some(tail) = self.tail() {
            if block.prev_block_id() != Some(tail.id()) {
                warn!(
                    "Refusing block {}: does not extend tail {}",
                    short_id(block.id()),
                    short_id(tail.id())
                );
                return false;
            }
        }

        self.append(block);
        true
    }

    pub(super) fn append(&mut self, block: Block) {
        let position = self.blocks.len();
        if let Some(owner) = block.payload().new_owner() {
            self.current_owner = Some(owner.to_string());
        }
        self.forks.record(position, &block);
        self.positions.insert(block.id().to_string(), position);
        debug!(
            "Appended {} block {} at position {}",
            block.payload().kind(),
            short_id(block.id()),
            position
        );
        self.blocks.push(block);
    }

    /// Checks `new_block` against the history for a competing successor or a double spend.
    pub fn detect_fork(&self, new_block: &Block) -> ForkResult {
        let result = self.forks.detect(&self.blocks, new_block);
        if let Some(reason) = result.reason {
            warn!(
                "Detected {:?} on chain {}: block {}",
                reason,
                short_id(&self.id),
                short_id(new_block.id())
            );
        }
        result
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition(&self) -> &ChainDefinition {
        &self.definition
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn current_owner(&self) -> Option<&str> {
        self.current_owner.as_deref()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in append order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn order(&self) -> Vec<&str> {
        self.blocks.iter().map(Block::id).collect()
    }

    pub fn get_block(&self, id: &str) -> Option<&Block> {
        self.positions.get(id).map(|&p| &self.blocks[p])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn tail(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn root_block(&self) -> Option<&Block> {
        self.blocks.iter().find(|b| b.is_root())
    }

    /// The first ownership assignment, if the note has been issued.
    pub fn owner_block(&self) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|b| matches!(b.payload(), BlockPayload::Ownership { .. }))
    }

    /// Every owner the note has had, oldest first.
    pub fn owner_history(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|b| b.payload().new_owner())
            .collect()
    }
}

pub(crate) fn short_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(12)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    &id[..end]
}
