//! Engine fault taxonomy.

use forcemove_types::{
    Address, ChannelId, InvalidTransition, ObjectiveId, SignatureError, B256,
};
use forcemove_transactions::TransactionError;
use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// Most variants are caller mistakes and fail fast. `StorageMismatch` is the
/// exception: it marks a divergence between the local mirror and the chain's
/// actual channel storage, after which the record is frozen against further
/// writes rather than risk acting on wrong data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown channel {0}")]
    ChannelNotFound(ChannelId),

    #[error("channel {0} already exists")]
    ChannelExists(ChannelId),

    #[error("channel {0} is frozen after a storage mismatch")]
    ChannelFrozen(ChannelId),

    #[error("unknown objective {0}")]
    ObjectiveNotFound(ObjectiveId),

    #[error("{0} is not a participant of this channel")]
    NotParticipant(Address),

    #[error("channel {channel_id}: conflicting state at turn {turn_num}")]
    StateConflict {
        channel_id: ChannelId,
        turn_num: u64,
    },

    #[error("channel {0} has no fully-signed state to support")]
    NoSupportedState(ChannelId),

    #[error("channel {channel_id}: storage fingerprint mismatch (expected {expected}, chain has {actual})")]
    StorageMismatch {
        channel_id: ChannelId,
        expected: B256,
        actual: B256,
    },

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Objective(#[from] InvalidTransition),
}
