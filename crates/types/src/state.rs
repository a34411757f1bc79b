//! Ledger snapshots and participant signatures over them.

use crate::{hash_message, Channel, KeyPair, Outcome, Signature, SignatureError};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// One snapshot of the shared ledger.
///
/// States are immutable; advancing the channel always produces a new `State`
/// with a higher `turn_num`. Application-specific transition validity is
/// delegated to the app-definition collaborator; this crate only fixes the
/// canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// The channel this state belongs to.
    pub channel: Channel,
    /// Monotonically increasing turn counter.
    pub turn_num: u64,
    /// Whether this state can be used in a conclusion proof.
    pub is_final: bool,
    /// Fund distribution if the channel finalised in this state.
    pub outcome: Outcome,
    /// Address of the application rules contract.
    pub app_definition: Address,
    /// Opaque application data, interpreted only by the app definition.
    pub app_data: Bytes,
    /// Seconds a registered challenge stays answerable.
    pub challenge_duration: u64,
}

impl State {
    /// Hash of the application-controlled part:
    /// `keccak256(abi.encode(challengeDuration, appDefinition, appData))`.
    pub fn app_part_hash(&self) -> B256 {
        let encoded = (
            U256::from(self.challenge_duration),
            self.app_definition,
            self.app_data.clone(),
        )
            .abi_encode_params();
        keccak256(encoded)
    }

    /// Canonical state hash:
    /// `keccak256(abi.encode(turnNum, isFinal, channelId, appPartHash, outcomeHash))`.
    ///
    /// This is the digest the adjudicator recomputes; signatures are made
    /// over its EIP-191 wrapping, never over the raw hash.
    pub fn hash(&self) -> B256 {
        let encoded = (
            U256::from(self.turn_num),
            self.is_final,
            self.channel.id().0,
            self.app_part_hash(),
            self.outcome.hash(),
        )
            .abi_encode_params();
        keccak256(encoded)
    }

    /// The digest participants actually sign.
    pub fn signing_digest(&self) -> B256 {
        hash_message(self.hash())
    }

    /// Sign this state with `key`, producing a [`SignedState`].
    pub fn sign(&self, key: &KeyPair) -> Result<SignedState, SignatureError> {
        let signature = key.sign_digest(self.signing_digest())?;
        Ok(SignedState {
            state: self.clone(),
            signature,
        })
    }

    /// A copy of this state advanced to `turn_num`, other fields unchanged.
    pub fn advance(&self, turn_num: u64) -> State {
        State {
            turn_num,
            ..self.clone()
        }
    }

    /// A final copy of this state at `turn_num`.
    pub fn finalize(&self, turn_num: u64) -> State {
        State {
            turn_num,
            is_final: true,
            ..self.clone()
        }
    }
}

/// A [`State`] plus one participant's recoverable signature.
///
/// Multiple participants signing the identical state each produce a distinct
/// `SignedState` over the same `State` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedState {
    pub state: State,
    pub signature: Signature,
}

impl SignedState {
    /// Recover the signer address from the signature.
    pub fn signer(&self) -> Result<Address, SignatureError> {
        self.signature.recover(self.state.signing_digest())
    }
}
