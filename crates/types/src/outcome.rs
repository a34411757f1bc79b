//! Asset-partitioned fund distribution.
//!
//! An [`Outcome`] is an ordered sequence of per-asset-holder entries, each
//! carrying either an allocation (destination/amount pairs) or a guarantee
//! (a reprioritised view of another channel's allocation).
//!
//! The encodings here mirror the adjudicator's ABI exactly. Empty content
//! hashes to the zero sentinel rather than the hash of an empty structure,
//! matching what the adjudicator treats as "nothing allocated".

use crate::ChannelId;
use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::{sol, SolValue};
use serde::{Deserialize, Serialize};

sol! {
    struct SolAllocationItem {
        bytes32 destination;
        uint256 amount;
    }

    struct SolGuarantee {
        bytes32 targetChannelId;
        bytes32[] destinations;
    }

    struct SolAssetOutcome {
        uint8 outcomeType;
        bytes content;
    }

    struct SolOutcomeItem {
        address assetHolderAddress;
        bytes assetOutcomeBytes;
    }
}

const OUTCOME_TYPE_ALLOCATION: u8 = 0;
const OUTCOME_TYPE_GUARANTEE: u8 = 1;

/// A single `(destination, amount)` entry within an allocation.
///
/// The destination is either a channel id or an external address padded to
/// 32 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationItem {
    /// Where the funds go.
    pub destination: B256,
    /// How much goes there.
    pub amount: alloy_primitives::U256,
}

/// Ordered destination/amount pairs for one asset.
pub type Allocation = Vec<AllocationItem>;

/// A guarantee reprioritising the target channel's allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guarantee {
    /// The channel whose allocation is being guaranteed.
    pub target_channel_id: ChannelId,
    /// Destination priority order.
    pub destinations: Vec<B256>,
}

/// Per-asset outcome content: either an allocation or a guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetOutcome {
    /// Direct destination/amount pairs.
    Allocation(Allocation),
    /// Reprioritised claim on another channel's allocation.
    Guarantee(Guarantee),
}

impl AssetOutcome {
    fn outcome_type(&self) -> u8 {
        match self {
            AssetOutcome::Allocation(_) => OUTCOME_TYPE_ALLOCATION,
            AssetOutcome::Guarantee(_) => OUTCOME_TYPE_GUARANTEE,
        }
    }

    fn content_bytes(&self) -> Vec<u8> {
        match self {
            AssetOutcome::Allocation(items) => encode_allocation(items),
            AssetOutcome::Guarantee(guarantee) => encode_guarantee(guarantee),
        }
    }
}

/// The asset-partitioned distribution of channel funds.
///
/// Order is significant and preserved through encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Outcome(pub Vec<(Address, AssetOutcome)>);

impl Outcome {
    /// An outcome with no entries.
    pub fn empty() -> Self {
        Outcome(Vec::new())
    }

    /// Convenience constructor for a single-asset allocation.
    pub fn single_allocation(asset_holder: Address, items: Allocation) -> Self {
        Outcome(vec![(asset_holder, AssetOutcome::Allocation(items))])
    }

    /// Sum of allocated amounts for `asset_holder` (zero for guarantees).
    pub fn total_allocated(&self, asset_holder: Address) -> alloy_primitives::U256 {
        self.0
            .iter()
            .filter(|(holder, _)| *holder == asset_holder)
            .map(|(_, content)| match content {
                AssetOutcome::Allocation(items) => {
                    items.iter().map(|i| i.amount).sum()
                }
                AssetOutcome::Guarantee(_) => alloy_primitives::U256::ZERO,
            })
            .sum()
    }

    /// Asset holder addresses appearing in this outcome, in order.
    pub fn asset_holders(&self) -> Vec<Address> {
        self.0.iter().map(|(holder, _)| *holder).collect()
    }

    /// Canonical hash, with the zero sentinel for an empty outcome.
    pub fn hash(&self) -> B256 {
        hash_outcome(self)
    }
}

/// ABI-encode an allocation as `tuple(bytes32,uint256)[]`.
pub fn encode_allocation(allocation: &Allocation) -> Vec<u8> {
    let items: Vec<SolAllocationItem> = allocation
        .iter()
        .map(|item| SolAllocationItem {
            destination: item.destination,
            amount: item.amount,
        })
        .collect();
    (items,).abi_encode_params()
}

/// ABI-encode a guarantee as `tuple(bytes32,bytes32[])`.
pub fn encode_guarantee(guarantee: &Guarantee) -> Vec<u8> {
    let sol = SolGuarantee {
        targetChannelId: guarantee.target_channel_id.0,
        destinations: guarantee.destinations.clone(),
    };
    (sol,).abi_encode_params()
}

/// Hash one asset's outcome content.
///
/// An empty allocation hashes to `B256::ZERO`, the sentinel the adjudicator
/// stores for "nothing allocated".
pub fn hash_asset_outcome(content: &AssetOutcome) -> B256 {
    if let AssetOutcome::Allocation(items) = content {
        if items.is_empty() {
            return B256::ZERO;
        }
    }
    let sol = SolAssetOutcome {
        outcomeType: content.outcome_type(),
        content: Bytes::from(content.content_bytes()),
    };
    keccak256((sol,).abi_encode_params())
}

/// ABI-encode a full outcome as `tuple(address,bytes)[]`.
pub fn encode_outcome(outcome: &Outcome) -> Vec<u8> {
    let items: Vec<SolOutcomeItem> = outcome
        .0
        .iter()
        .map(|(asset_holder, content)| {
            let inner = SolAssetOutcome {
                outcomeType: content.outcome_type(),
                content: Bytes::from(content.content_bytes()),
            };
            SolOutcomeItem {
                assetHolderAddress: *asset_holder,
                assetOutcomeBytes: Bytes::from((inner,).abi_encode_params()),
            }
        })
        .collect();
    (items,).abi_encode_params()
}

/// Hash a full outcome, with the zero sentinel for an empty one.
pub fn hash_outcome(outcome: &Outcome) -> B256 {
    if outcome.0.is_empty() {
        return B256::ZERO;
    }
    keccak256(encode_outcome(outcome))
}
