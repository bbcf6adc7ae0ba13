use super::chain::{short_id, BlockChain};
use super::payload::BlockPayload;
use rayon::prelude::*;
use tracing::warn;

impl BlockChain {
    /// Linear integrity sweep: root first and only there, every successor
    /// linked to its predecessor and passing `validate_basic`.
    pub fn validate_chain(&self) -> bool {
        let Some(first) = self.blocks.first() else {
            warn!("Chain validation failed: chain is empty");
            return false;
        };
        if !first.is_root() {
            warn!("Chain validation failed: first block is not a root");
            return false;
        }

        for pair in self.blocks.windows(2) {
            let (prev, block) = (&pair[0], &pair[1]);
            if block.is_root() {
                warn!(
                    "Chain validation failed: root block {} after genesis",
                    short_id(block.id())
                );
                return false;
            }
            if block.prev_block_id() != Some(prev.id()) {
                warn!(
                    "Chain validation failed: {} does not link to {}",
                    short_id(block.id()),
                    short_id(prev.id())
                );
                return false;
            }
            if !block.validate_basic() {
                warn!(
                    "Chain validation failed: block {} is invalid",
                    short_id(block.id())
                );
                return false;
            }
        }
        true
    }

    /// Full re-verification, for callers that do not trust how the chain was
    /// built (e.g. after deserialization). On top of `validate_chain` it
    /// checks that every id is the one its content derives, that the root is
    /// bound to this chain's definition and serial, and that the recorded
    /// owner matches history. Signatures are checked in parallel.
    pub fn verify_full(&self) -> bool {
        if !self.validate_chain() {
            return false;
        }

        let root_bound = match self.blocks[0].payload() {
            BlockPayload::Root {
                definition_hash,
                serial_number,
            } => {
                definition_hash == self.definition.definition_hash()
                    && serial_number == &self.serial_number
                    && self.blocks[0].id() == self.id
            }
            _ => false,
        };
        if !root_bound {
            warn!("Full verification failed: root is not bound to chain {}", short_id(&self.id));
            return false;
        }

        let derived = self
            .blocks
            .par_iter()
            .all(|block| block.has_derived_id() && block.validate_basic());
        if !derived {
            warn!("Full verification failed: a block id does not match its content");
            return false;
        }

        let expected_owner = self.owner_history().last().map(|s| s.to_string());
        if expected_owner != self.current_owner {
            warn!("Full verification failed: recorded owner disagrees with history");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::blockchain::{Block, BlockChain, BlockPayload};
    use crate::crypto::generate_key_pair;
    use crate::definition::ChainDefinition;

    fn issued_chain() -> BlockChain {
        let issuer = generate_key_pair().unwrap();
        let alice = generate_key_pair().unwrap();
        let bob = generate_key_pair().unwrap();
        let mut chain =
            BlockChain::new(ChainDefinition::parse_text("1-10 20").unwrap(), "3").unwrap();
        chain
            .create_owner_block(&alice.public_key, &issuer.private_key, 1)
            .unwrap();
        chain
            .create_transfer_block(&bob.public_key, &alice.private_key, 2)
            .unwrap();
        chain
    }

    #[test]
    fn test_valid_chain() {
        let chain = issued_chain();
        assert!(chain.validate_chain());
        assert!(chain.verify_full());
    }

    #[test]
    fn test_empty_chain_is_invalid() {
        let mut chain = issued_chain();
        chain.blocks.clear();
        assert!(!chain.validate_chain());
    }

    #[test]
    fn test_non_root_first_block_is_invalid() {
        let mut chain = issued_chain();
        chain.blocks.remove(0);
        assert!(!chain.validate_chain());
    }

    #[test]
    fn test_root_after_genesis_is_invalid() {
        let mut chain = issued_chain();
        let tail = chain.tail().map(|b| b.id().to_string());
        chain.blocks.push(Block::from_parts(
            "forged",
            BlockPayload::Root {
                definition_hash: chain.definition().definition_hash().to_string(),
                serial_number: "3".to_string(),
            },
            tail,
            "mallory",
            3,
            "not-a-signature",
        ));
        assert!(!chain.validate_chain());
        assert!(!chain.verify_full());
    }

    #[test]
    fn test_broken_linkage_is_invalid() {
        let mut chain = issued_chain();
        chain.blocks.swap(1, 2);
        assert!(!chain.validate_chain());
    }

    #[test]
    fn test_tampered_signature_is_invalid() {
        let mut chain = issued_chain();
        let last = chain.blocks[2].clone();
        let mallory = generate_key_pair().unwrap();
        chain.blocks[2] = Block::from_parts(
            last.id(),
            BlockPayload::Transfer {
                blockchain_id: chain.id().to_string(),
                target_user_id: mallory.public_key,
            },
            last.prev_block_id().map(str::to_string),
            last.creator(),
            last.time(),
            last.signature(),
        );
        assert!(!chain.validate_chain());
    }

    #[test]
    fn test_full_verification_catches_owner_drift() {
        let mut chain = issued_chain();
        assert!(chain.validate_chain());
        chain.current_owner = Some("someone-else".to_string());
        assert!(chain.validate_chain());
        assert!(!chain.verify_full());
    }
}
