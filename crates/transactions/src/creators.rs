//! Pure builders for the adjudicator call shapes.

use crate::{create_signature_arguments, TransactionError};
use forcemove_types::{
    Address, ChannelId, ChannelStorage, Outcome, Signature, SignedState, State, B256, U256,
};

/// A fully-specified adjudicator call, ready for submission.
///
/// This is the opaque payload boundary: builders produce it, the chain
/// service submits it, and nothing in between inspects chain state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjudicatorCall {
    /// Register a challenge.
    ForceMove {
        turn_num_record: u64,
        states: Vec<State>,
        signatures: Vec<Signature>,
        who_signed_what: Vec<usize>,
        /// Signature over the latest state proving the challenger is a
        /// participant.
        challenger_signature: Signature,
    },
    /// Clear a challenge with a single newer signed state.
    Respond {
        turn_num_record: u64,
        finalizes_at: u64,
        challenge_state: State,
        response_state: State,
        response_signature: Signature,
    },
    /// Advance the turn number record, clearing any active challenge.
    Checkpoint {
        turn_num_record: u64,
        finalizes_at: u64,
        challenge_state: Option<State>,
        states: Vec<State>,
        signatures: Vec<Signature>,
        who_signed_what: Vec<usize>,
    },
    /// Finalise a channel with no challenge active.
    ConcludeFromOpen {
        turn_num_record: u64,
        states: Vec<State>,
        signatures: Vec<Signature>,
        who_signed_what: Vec<usize>,
    },
    /// Finalise a channel while a challenge is active.
    ConcludeFromChallenge {
        turn_num_record: u64,
        finalizes_at: u64,
        challenge_state: State,
        states: Vec<State>,
        signatures: Vec<Signature>,
        who_signed_what: Vec<usize>,
    },
    /// Deposit into an asset holder with the optimistic-concurrency guard.
    Deposit {
        asset_holder: Address,
        destination: B256,
        expected_held: U256,
        amount: U256,
    },
    /// Pay out a finalized outcome to the listed allocation indices.
    Transfer {
        asset_holder: Address,
        channel_id: ChannelId,
        outcome: Outcome,
        indices: Vec<usize>,
    },
}

impl AdjudicatorCall {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            AdjudicatorCall::ForceMove { .. } => "forceMove",
            AdjudicatorCall::Respond { .. } => "respond",
            AdjudicatorCall::Checkpoint { .. } => "checkpoint",
            AdjudicatorCall::ConcludeFromOpen { .. }
            | AdjudicatorCall::ConcludeFromChallenge { .. } => "conclude",
            AdjudicatorCall::Deposit { .. } => "deposit",
            AdjudicatorCall::Transfer { .. } => "transfer",
        }
    }
}

/// Build a forceMove call opening a challenge with the given support proof.
///
/// `storage.turn_num_record` rides along as the optimistic-concurrency
/// check; the adjudicator reverts if its stored record moved in between.
pub fn create_force_move_transaction(
    storage: &ChannelStorage,
    signed_states: &[SignedState],
    challenger_signature: Signature,
) -> Result<AdjudicatorCall, TransactionError> {
    let args = create_signature_arguments(signed_states)?;
    Ok(AdjudicatorCall::ForceMove {
        turn_num_record: storage.turn_num_record,
        states: args.states,
        signatures: args.signatures,
        who_signed_what: args.who_signed_what,
        challenger_signature,
    })
}

/// Build a respond call clearing the stored challenge with one newer state.
pub fn create_respond_transaction(
    storage: &ChannelStorage,
    response: &SignedState,
) -> Result<AdjudicatorCall, TransactionError> {
    let challenge_state = storage
        .challenge_state
        .clone()
        .ok_or(TransactionError::NoChallengeState)?;
    Ok(AdjudicatorCall::Respond {
        turn_num_record: storage.turn_num_record,
        finalizes_at: storage.finalizes_at,
        challenge_state,
        response_state: response.state.clone(),
        response_signature: response.signature,
    })
}

/// Build a checkpoint call advancing the record with a full support proof.
pub fn create_checkpoint_transaction(
    storage: &ChannelStorage,
    signed_states: &[SignedState],
) -> Result<AdjudicatorCall, TransactionError> {
    let args = create_signature_arguments(signed_states)?;
    Ok(AdjudicatorCall::Checkpoint {
        turn_num_record: storage.turn_num_record,
        finalizes_at: storage.finalizes_at,
        challenge_state: storage.challenge_state.clone(),
        states: args.states,
        signatures: args.signatures,
        who_signed_what: args.who_signed_what,
    })
}

/// Build a conclude call from a conclusion proof of final states.
///
/// Branches on whether a challenge is currently active in storage, since the
/// adjudicator exposes distinct entry points for the two cases.
pub fn create_conclude_transaction(
    storage: &ChannelStorage,
    conclusion_proof: &[SignedState],
) -> Result<AdjudicatorCall, TransactionError> {
    if let Some(non_final) = conclusion_proof.iter().find(|s| !s.state.is_final) {
        return Err(TransactionError::NonFinalState(non_final.state.turn_num));
    }
    let args = create_signature_arguments(conclusion_proof)?;
    match storage.challenge_state.clone() {
        None => Ok(AdjudicatorCall::ConcludeFromOpen {
            turn_num_record: storage.turn_num_record,
            states: args.states,
            signatures: args.signatures,
            who_signed_what: args.who_signed_what,
        }),
        Some(challenge_state) => Ok(AdjudicatorCall::ConcludeFromChallenge {
            turn_num_record: storage.turn_num_record,
            finalizes_at: storage.finalizes_at,
            challenge_state,
            states: args.states,
            signatures: args.signatures,
            who_signed_what: args.who_signed_what,
        }),
    }
}

/// Build a deposit call. `expected_held` makes a racing deposit from another
/// participant revert deterministically instead of overfunding.
pub fn create_deposit_transaction(
    asset_holder: Address,
    destination: ChannelId,
    expected_held: U256,
    amount: U256,
) -> AdjudicatorCall {
    AdjudicatorCall::Deposit {
        asset_holder,
        destination: destination.as_destination(),
        expected_held,
        amount,
    }
}

/// Build a transfer call paying out the listed allocation indices of a
/// finalized outcome. Indices must be ascending; the adjudicator enforces it.
pub fn create_transfer_transaction(
    asset_holder: Address,
    channel_id: ChannelId,
    outcome: Outcome,
    indices: Vec<usize>,
) -> AdjudicatorCall {
    AdjudicatorCall::Transfer {
        asset_holder,
        channel_id,
        outcome,
        indices,
    }
}
