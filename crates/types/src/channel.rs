//! Channel identity.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique channel identifier (32 bytes).
///
/// Derived as `keccak256(abi.encode(chainId, participants, channelNonce))`.
/// Two channels are the same channel iff their ids match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub B256);

impl ChannelId {
    /// Zero id, used as a placeholder destination.
    pub const ZERO: ChannelId = ChannelId(B256::ZERO);

    /// The raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }

    /// Interpret this id as an outcome destination (`bytes32`).
    pub fn as_destination(&self) -> B256 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl From<B256> for ChannelId {
    fn from(value: B256) -> Self {
        ChannelId(value)
    }
}

/// A channel's fixed parameters.
///
/// Immutable after creation: the engine never mutates a `Channel`, it only
/// derives new [`crate::State`]s referencing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Chain the adjudicator lives on.
    pub chain_id: U256,
    /// Disambiguates channels between the same participants.
    pub channel_nonce: U256,
    /// Ordered participant signing addresses. Order is significant:
    /// `whoSignedWhat` indices are positional into this list.
    pub participants: Vec<Address>,
}

impl Channel {
    /// Create a new channel.
    pub fn new(chain_id: U256, channel_nonce: U256, participants: Vec<Address>) -> Self {
        Self {
            chain_id,
            channel_nonce,
            participants,
        }
    }

    /// The canonical channel id.
    pub fn id(&self) -> ChannelId {
        let encoded = (self.chain_id, self.participants.clone(), self.channel_nonce)
            .abi_encode_params();
        ChannelId(keccak256(encoded))
    }

    /// Position of `address` in the participant list, if it is a participant.
    pub fn participant_index(&self, address: Address) -> Option<usize> {
        self.participants.iter().position(|p| *p == address)
    }

    /// Number of participants.
    pub fn num_participants(&self) -> usize {
        self.participants.len()
    }
}
