//! Interchange form of a chain:
//! `{id, definition, serialNumber, currentOwner, value, order, blocks}`.
//!
//! Loading trusts the data: structure is checked, signatures are not.
//! Use `BlockChain::validate_chain` or `verify_full` afterwards.

use super::block::Block;
use super::chain::BlockChain;
use super::fork::ForkIndex;
use crate::definition::ChainDefinition;
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedChain {
    pub id: String,
    pub definition: ChainDefinition,
    pub serial_number: String,
    pub current_owner: Option<String>,
    pub value: f64,
    pub order: Vec<String>,
    pub blocks: BTreeMap<String, Block>,
}

impl BlockChain {
    pub fn serialize(&self) -> SerializedChain {
        SerializedChain {
            id: self.id.clone(),
            definition: self.definition.clone(),
            serial_number: self.serial_number.clone(),
            current_owner: self.current_owner.clone(),
            value: self.value,
            order: self.blocks.iter().map(|b| b.id().to_string()).collect(),
            blocks: self
                .blocks
                .iter()
                .map(|b| (b.id().to_string(), b.clone()))
                .collect(),
        }
    }

    pub fn deserialize(mut data: SerializedChain) -> Result<Self, ChainError> {
        if data.order.is_empty() {
            return Err(ChainError::MissingRoot);
        }
        if data.order.len() != data.blocks.len() {
            return Err(ChainError::Deserialization(format!(
                "order lists {} blocks but {} are present",
                data.order.len(),
                data.blocks.len()
            )));
        }
        if data.order[0] != data.id {
            return Err(ChainError::Deserialization(
                "chain id does not match the first block".to_string(),
            ));
        }

        let mut blocks = Vec::with_capacity(data.order.len());
        let mut positions = HashMap::with_capacity(data.order.len());
        let mut forks = ForkIndex::new();
        for (position, id) in data.order.iter().enumerate() {
            let block = data.blocks.remove(id).ok_or_else(|| {
                ChainError::Deserialization(format!("block {} listed in order is missing", id))
            })?;
            if block.id() != id {
                return Err(ChainError::Deserialization(format!(
                    "block stored under {} carries id {}",
                    id,
                    block.id()
                )));
            }
            forks.record(position, &block);
            positions.insert(id.clone(), position);
            blocks.push(block);
        }

        if !blocks[0].is_root() {
            return Err(ChainError::MissingRoot);
        }

        Ok(BlockChain {
            id: data.id,
            definition: data.definition,
            serial_number: data.serial_number,
            value: data.value,
            blocks,
            positions,
            forks,
            current_owner: data.current_owner,
        })
    }

    pub fn to_json(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string_pretty(&self.serialize())?)
    }

    pub fn from_json(input: &str) -> Result<Self, ChainError> {
        let data: SerializedChain = serde_json::from_str(input)?;
        Self::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_key_pair;

    fn issued_chain() -> BlockChain {
        let issuer = generate_key_pair().unwrap();
        let alice = generate_key_pair().unwrap();
        let mut chain = BlockChain::new(
            ChainDefinition::parse_text("1-100 1\n101-200 5").unwrap(),
            "150",
        )
        .unwrap();
        chain
            .create_owner_block(&alice.public_key, &issuer.private_key, 4)
            .unwrap();
        chain
    }

    #[test]
    fn test_round_trip() {
        let chain = issued_chain();
        let restored = BlockChain::from_json(&chain.to_json().unwrap()).unwrap();

        assert_eq!(restored.id(), chain.id());
        assert_eq!(restored.order(), chain.order());
        assert_eq!(restored.current_owner(), chain.current_owner());
        assert_eq!(restored.value(), chain.value());
        assert_eq!(restored.blocks(), chain.blocks());
        assert_eq!(restored.definition(), chain.definition());
        assert!(restored.validate_chain());
        assert_eq!(
            restored.owner_block().map(Block::id),
            chain.owner_block().map(Block::id)
        );
    }

    #[test]
    fn test_wire_shape() {
        let chain = issued_chain();
        let json: serde_json::Value = serde_json::to_value(chain.serialize()).unwrap();
        for key in ["id", "definition", "serialNumber", "currentOwner", "value", "order", "blocks"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["order"][0], json["id"]);
        assert_eq!(json["blocks"][chain.id()]["payload"]["type"], "root");
    }

    #[test]
    fn test_missing_block_is_rejected() {
        let mut data = issued_chain().serialize();
        let victim = data.order[1].clone();
        data.blocks.remove(&victim);
        data.order.push("phantom".to_string());
        let err = BlockChain::deserialize(data).unwrap_err();
        assert!(matches!(err, ChainError::Deserialization(_)));
    }

    #[test]
    fn test_empty_order_is_rejected() {
        let mut data = issued_chain().serialize();
        data.order.clear();
        data.blocks.clear();
        assert_eq!(BlockChain::deserialize(data).unwrap_err(), ChainError::MissingRoot);
    }

    #[test]
    fn test_load_does_not_check_signatures() {
        let mut data = issued_chain().serialize();
        let owner_id = data.order[1].clone();
        let owner = data.blocks[&owner_id].clone();
        let tampered = Block::from_parts(
            owner.id(),
            owner.payload().clone(),
            owner.prev_block_id().map(str::to_string),
            owner.creator(),
            owner.time() + 100,
            owner.signature(),
        );
        data.blocks.insert(owner_id, tampered);

        let restored = BlockChain::deserialize(data).unwrap();
        assert!(!restored.validate_chain());
    }
}
