//! Reception-time validation under a simulated propagation delay.
//!
//! A block is expected to reach every node within the broadcast time of the
//! network, modelled as `maxDelay * ln(nodeCount) / ln(avgConnections)` (hops
//! across a random graph). A receiver accepts blocks that arrive within twice
//! that window and may reject later ones by issuing a rejection block.

use crate::blockchain::{Block, BlockPayload, RejectionReason, Tick, UnsignedBlock};
use crate::crypto::{self, KeyPair};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Broadcast time used when the network parameters cannot produce one.
pub const DEFAULT_MAX_DELAY: f64 = 9.0;

/// Broadcast time never drops below one tick.
pub const MIN_BROADCAST_TIME: f64 = 1.0;

/// Simulated network shape. Missing or non-positive values fall back to defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParams {
    #[serde(default)]
    pub node_count: Option<f64>,
    #[serde(default)]
    pub avg_connections: Option<f64>,
    #[serde(default)]
    pub max_delay: Option<f64>,
}

impl NetworkParams {
    pub fn new(node_count: u32, avg_connections: f64, max_delay: f64) -> Self {
        Self {
            node_count: Some(node_count as f64),
            avg_connections: Some(avg_connections),
            max_delay: Some(max_delay),
        }
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Modelled time for a block to reach the whole network.
pub fn calculate_broadcast_time(params: Option<&NetworkParams>) -> f64 {
    let Some(params) = params else {
        return DEFAULT_MAX_DELAY;
    };
    let max_delay = positive(params.max_delay).unwrap_or(DEFAULT_MAX_DELAY);
    let avg_connections = match positive(params.avg_connections) {
        Some(c) if c > 1.0 => c,
        _ => return max_delay,
    };
    // A network of at most one node needs no hops.
    let node_count = positive(params.node_count).unwrap_or(1.0).max(1.0);

    (max_delay * node_count.ln() / avg_connections.ln()).max(MIN_BROADCAST_TIME)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceptionError {
    BlockNull,
    TimeViolation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceptionValidation {
    pub is_valid: bool,
    pub error: Option<ReceptionError>,
    pub should_reject: bool,
    /// `receive_time - block_time`, saturated to the `i64` range; negative
    /// when the receiver's clock lags.
    pub actual_delay: Option<i64>,
    pub block_time: Option<Tick>,
    pub receive_time: Tick,
    pub broadcast_time: f64,
    pub max_allowed_delay: f64,
}

/// Checks that `block` arrived within twice the broadcast time.
/// Early arrival (negative delay) is tolerated as clock skew.
pub fn validate_reception_time(
    block: Option<&Block>,
    receive_time: Tick,
    params: Option<&NetworkParams>,
) -> ReceptionValidation {
    let broadcast_time = calculate_broadcast_time(params);
    let max_allowed_delay = 2.0 * broadcast_time;

    let Some(block) = block else {
        return ReceptionValidation {
            is_valid: false,
            error: Some(ReceptionError::BlockNull),
            should_reject: false,
            actual_delay: None,
            block_time: None,
            receive_time,
            broadcast_time,
            max_allowed_delay,
        };
    };

    // Ticks span all of u64, so the difference needs i128.
    let delay = i128::from(receive_time) - i128::from(block.time());
    let actual_delay = i64::try_from(delay).unwrap_or(if delay < 0 { i64::MIN } else { i64::MAX });
    let is_valid = delay as f64 <= max_allowed_delay;
    if is_valid {
        debug!("Block received after {} ticks (limit {:.2})", actual_delay, max_allowed_delay);
    } else {
        warn!(
            "Block received after {} ticks, beyond limit {:.2}",
            actual_delay, max_allowed_delay
        );
    }

    ReceptionValidation {
        is_valid,
        error: (!is_valid).then_some(ReceptionError::TimeViolation),
        should_reject: !is_valid,
        actual_delay: Some(actual_delay),
        block_time: Some(block.time()),
        receive_time,
        broadcast_time,
        max_allowed_delay,
    }
}

fn rejection_payload(
    original: &Block,
    rejector_id: &str,
    reason: RejectionReason,
    current_tick: Tick,
) -> UnsignedBlock {
    UnsignedBlock::new(
        BlockPayload::Rejection {
            original_block_id: original.id().to_string(),
            original_block_creator: original.creator().to_string(),
            original_block_time: original.time(),
            rejection_reason: reason,
            rejector_id: rejector_id.to_string(),
            rejection_time: current_tick,
        },
        Some(original.id().to_string()),
        rejector_id,
        current_tick,
    )
}

/// Records that `rejector_id` refused `original`. The block is unsigned; its
/// id hashes the content together with a random nonce, so every rejection gets
/// a fresh id.
pub fn create_rejection_block(
    original: &Block,
    rejector_id: &str,
    reason: RejectionReason,
    current_tick: Tick,
) -> Result<Block, ChainError> {
    let unsigned = rejection_payload(original, rejector_id, reason, current_tick);
    let nonce: u128 = rand::random();
    let id = format!(
        "rejection-{}",
        crypto::hash(&format!("{}{:032x}", unsigned.canonical_payload()?, nonce))
    );
    Ok(unsigned.identify(String::new(), id))
}

/// Like [`create_rejection_block`], but signed by the rejector so the record
/// passes `validate_basic`. The rejector id is the key's public half.
pub fn create_signed_rejection_block(
    original: &Block,
    private_key: &str,
    reason: RejectionReason,
    current_tick: Tick,
) -> Result<Block, ChainError> {
    let rejector_id = KeyPair::from_private_key(private_key)?.public_key;
    rejection_payload(original, &rejector_id, reason, current_tick).sign(private_key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceptionDecision {
    Accept,
    Reject(RejectionReason),
}

/// Reception checks bound to one set of network parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    params: NetworkParams,
}

impl Validator {
    pub fn new(params: NetworkParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn broadcast_time(&self) -> f64 {
        calculate_broadcast_time(Some(&self.params))
    }

    pub fn max_allowed_delay(&self) -> f64 {
        2.0 * self.broadcast_time()
    }

    pub fn validate_reception(&self, block: &Block, receive_time: Tick) -> ReceptionValidation {
        validate_reception_time(Some(block), receive_time, Some(&self.params))
    }

    pub fn should_accept(&self, block: &Block, receive_time: Tick) -> ReceptionDecision {
        if self.validate_reception(block, receive_time).should_reject {
            ReceptionDecision::Reject(RejectionReason::TimeViolation)
        } else {
            ReceptionDecision::Accept
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::SYSTEM_SIGNATURE;

    fn block_at(time: Tick) -> Block {
        Block::from_parts(
            "B",
            BlockPayload::Ownership {
                owner_id: "U".to_string(),
            },
            Some("R".to_string()),
            "C",
            time,
            "sig",
        )
    }

    #[test]
    fn test_broadcast_time_for_reference_network() {
        let params = NetworkParams::new(10, 3.0, 9.0);
        let t = calculate_broadcast_time(Some(&params));
        let expected = 9.0 * 10f64.ln() / 3f64.ln();
        assert!((t - expected).abs() < 1e-9);
        assert!((t - 18.86).abs() < 0.05);
    }

    #[test]
    fn test_broadcast_time_defaults() {
        assert_eq!(calculate_broadcast_time(None), DEFAULT_MAX_DELAY);
        assert_eq!(calculate_broadcast_time(Some(&NetworkParams::default())), 9.0);

        let parsed: NetworkParams = serde_json::from_str("{}").unwrap();
        assert_eq!(calculate_broadcast_time(Some(&parsed)), 9.0);

        // avgConnections <= 1 degenerates to maxDelay
        assert_eq!(calculate_broadcast_time(Some(&NetworkParams::new(100, 1.0, 4.0))), 4.0);
        assert_eq!(calculate_broadcast_time(Some(&NetworkParams::new(100, 0.5, 4.0))), 4.0);
    }

    #[test]
    fn test_broadcast_time_clamps_bad_inputs() {
        let negative = NetworkParams {
            node_count: Some(-5.0),
            avg_connections: Some(3.0),
            max_delay: Some(-2.0),
        };
        assert_eq!(calculate_broadcast_time(Some(&negative)), MIN_BROADCAST_TIME);

        let nan = NetworkParams {
            node_count: Some(f64::NAN),
            avg_connections: Some(f64::NAN),
            max_delay: Some(f64::NAN),
        };
        assert_eq!(calculate_broadcast_time(Some(&nan)), DEFAULT_MAX_DELAY);

        // Tiny networks floor at one tick.
        assert_eq!(calculate_broadcast_time(Some(&NetworkParams::new(2, 1000.0, 1.0))), 1.0);
    }

    #[test]
    fn test_reception_boundary() {
        let params = NetworkParams::new(10, 3.0, 9.0);
        let block = block_at(100);

        let on_time = validate_reception_time(Some(&block), 137, Some(&params));
        assert!(on_time.is_valid);
        assert!(!on_time.should_reject);
        assert_eq!(on_time.actual_delay, Some(37));
        assert!((on_time.max_allowed_delay - 2.0 * on_time.broadcast_time).abs() < 1e-12);

        let late = validate_reception_time(Some(&block), 139, Some(&params));
        assert!(!late.is_valid);
        assert!(late.should_reject);
        assert_eq!(late.error, Some(ReceptionError::TimeViolation));
        assert_eq!(late.block_time, Some(100));
        assert_eq!(late.receive_time, 139);
    }

    #[test]
    fn test_negative_delay_is_tolerated() {
        let result = validate_reception_time(Some(&block_at(50)), 10, None);
        assert!(result.is_valid);
        assert_eq!(result.actual_delay, Some(-40));
    }

    #[test]
    fn test_extreme_ticks_do_not_overflow() {
        let params = NetworkParams::new(10, 3.0, 9.0);

        let from_far_future = validate_reception_time(Some(&block_at(1 << 63)), 0, Some(&params));
        assert!(from_far_future.is_valid);
        assert_eq!(from_far_future.actual_delay, Some(i64::MIN));

        let ancient = validate_reception_time(Some(&block_at(0)), u64::MAX, Some(&params));
        assert!(!ancient.is_valid);
        assert!(ancient.should_reject);
        assert_eq!(ancient.actual_delay, Some(i64::MAX));

        let late = validate_reception_time(Some(&block_at(1 << 63)), u64::MAX, Some(&params));
        assert!(!late.is_valid);
        assert_eq!(late.actual_delay, Some(i64::MAX));
    }

    #[test]
    fn test_missing_block() {
        let result = validate_reception_time(None, 10, None);
        assert!(!result.is_valid);
        assert_eq!(result.error, Some(ReceptionError::BlockNull));
        assert_eq!(result.actual_delay, None);
        assert!(!result.should_reject);
    }

    #[test]
    fn test_rejection_blocks_are_unique() {
        let original = block_at(100);
        let a = create_rejection_block(&original, "node-1", RejectionReason::TimeViolation, 140).unwrap();
        let b = create_rejection_block(&original, "node-2", RejectionReason::TimeViolation, 141).unwrap();
        let c = create_rejection_block(&original, "node-1", RejectionReason::TimeViolation, 140).unwrap();

        assert_ne!(a.id(), original.id());
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert!(a.id().starts_with("rejection-"));
        assert_ne!(a.signature(), SYSTEM_SIGNATURE);

        match a.payload() {
            BlockPayload::Rejection {
                original_block_id,
                original_block_creator,
                original_block_time,
                rejection_reason,
                rejector_id,
                rejection_time,
            } => {
                assert_eq!(original_block_id, "B");
                assert_eq!(original_block_creator, "C");
                assert_eq!(*original_block_time, 100);
                assert_eq!(*rejection_reason, RejectionReason::TimeViolation);
                assert_eq!(rejector_id, "node-1");
                assert_eq!(*rejection_time, 140);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_signed_rejection_validates() {
        let node = crypto::generate_key_pair().unwrap();
        let rejection =
            create_signed_rejection_block(&block_at(1), &node.private_key, RejectionReason::DoubleSpend, 9)
                .unwrap();
        assert_eq!(rejection.creator(), node.public_key);
        assert!(rejection.validate_basic());
    }

    #[test]
    fn test_validator_decision() {
        let validator = Validator::new(NetworkParams::new(10, 3.0, 9.0));
        assert_eq!(validator.should_accept(&block_at(100), 120), ReceptionDecision::Accept);
        assert_eq!(
            validator.should_accept(&block_at(100), 200),
            ReceptionDecision::Reject(RejectionReason::TimeViolation)
        );
    }
}
