//! The adjudicator's per-channel dispute status record.

use crate::{Outcome, State};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// Mirror of the adjudicator's per-channel storage slot.
///
/// The hash of this record is the single most important cross-boundary
/// contract in the system: the adjudicator recomputes it on every call and
/// compares against the stored slot, so any encoding drift here surfaces as
/// an "incorrect fingerprint" revert rather than a type error.
///
/// Lifecycle: created empty (`turn_num_record = 0`, `finalizes_at = 0`) at
/// channel genesis, mutated only by the four adjudicator operations, and
/// conceptually destroyed once `conclude` fixes `finalizes_at` in the past.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelStorage {
    /// Highest turn number the adjudicator has committed to.
    pub turn_num_record: u64,
    /// Unix time the current challenge becomes unanswerable; `0` means no
    /// active challenge.
    pub finalizes_at: u64,
    /// The state a challenge was registered with, while one is active.
    pub challenge_state: Option<State>,
    /// Who registered the active challenge.
    pub challenger_address: Option<Address>,
    /// Outcome committed on finalisation.
    pub outcome: Option<Outcome>,
}

impl ChannelStorage {
    /// Storage with no active challenge.
    pub fn open(turn_num_record: u64) -> Self {
        ChannelStorage {
            turn_num_record,
            ..Default::default()
        }
    }

    /// Whether a challenge is registered and still answerable at `now`.
    pub fn challenge_active(&self, now: u64) -> bool {
        self.finalizes_at != 0 && now < self.finalizes_at
    }

    /// Whether the channel has finalised (challenge expired or concluded).
    pub fn finalized(&self, now: u64) -> bool {
        self.finalizes_at != 0 && now >= self.finalizes_at
    }

    /// The on-chain storage-slot hash.
    ///
    /// When `finalizes_at == 0` the state hash, challenger and outcome hash
    /// are encoded as zero regardless of what the optional fields hold; this
    /// is the canonical "cleared" representation the adjudicator writes when
    /// a challenge is answered.
    pub fn hash(&self) -> B256 {
        let (state_hash, challenger, outcome_hash) = if self.finalizes_at == 0 {
            (B256::ZERO, Address::ZERO, B256::ZERO)
        } else {
            (
                self.challenge_state
                    .as_ref()
                    .map(State::hash)
                    .unwrap_or(B256::ZERO),
                self.challenger_address.unwrap_or(Address::ZERO),
                self.outcome.as_ref().map(Outcome::hash).unwrap_or(B256::ZERO),
            )
        };
        let encoded = (
            U256::from(self.turn_num_record),
            U256::from(self.finalizes_at),
            state_hash,
            challenger,
            outcome_hash,
        )
            .abi_encode_params();
        keccak256(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AllocationItem, Channel};
    use alloy_primitives::Bytes;

    fn challenge_state() -> State {
        State {
            channel: Channel::new(
                U256::from(1234),
                U256::from(1),
                vec![Address::repeat_byte(0x11), Address::repeat_byte(0x22)],
            ),
            turn_num: 5,
            is_final: false,
            outcome: Outcome::empty(),
            app_definition: Address::repeat_byte(0xaa),
            app_data: Bytes::new(),
            challenge_duration: 60,
        }
    }

    #[test]
    fn cleared_storage_ignores_optional_fields() {
        let bare = ChannelStorage::open(5);
        let with_leftovers = ChannelStorage {
            turn_num_record: 5,
            finalizes_at: 0,
            challenge_state: Some(challenge_state()),
            challenger_address: Some(Address::repeat_byte(0x99)),
            outcome: Some(Outcome::single_allocation(
                Address::repeat_byte(0x01),
                vec![AllocationItem {
                    destination: B256::repeat_byte(0xaa),
                    amount: U256::from(7),
                }],
            )),
        };
        assert_eq!(bare.hash(), with_leftovers.hash());
    }

    #[test]
    fn active_challenge_changes_the_hash() {
        let open = ChannelStorage::open(5);
        let challenged = ChannelStorage {
            turn_num_record: 5,
            finalizes_at: 1_000_000_000_000,
            challenge_state: Some(challenge_state()),
            challenger_address: Some(Address::repeat_byte(0x11)),
            outcome: None,
        };
        assert_ne!(open.hash(), challenged.hash());
        assert!(challenged.challenge_active(0));
        assert!(challenged.finalized(2_000_000_000_000));
    }

    #[test]
    fn hash_is_deterministic() {
        let storage = ChannelStorage {
            turn_num_record: 3,
            finalizes_at: 42,
            challenge_state: Some(challenge_state()),
            challenger_address: Some(Address::repeat_byte(0x11)),
            outcome: None,
        };
        assert_eq!(storage.hash(), storage.clone().hash());
    }

    #[test]
    fn turn_num_record_changes_the_hash() {
        assert_ne!(ChannelStorage::open(5).hash(), ChannelStorage::open(6).hash());
    }
}
