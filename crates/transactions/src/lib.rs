//! Turning partially-signed off-chain states into on-chain adjudicator calls.
//!
//! This crate is pure: every function is a deterministic mapping from typed
//! inputs to either a typed validation error or an [`AdjudicatorCall`]
//! payload. Nothing here retries, inspects chain state, or performs I/O;
//! that is the chain service's job.

mod args;
mod creators;
pub mod revert;

pub use args::{create_signature_arguments, SignatureArguments};
pub use creators::{
    create_checkpoint_transaction, create_conclude_transaction, create_deposit_transaction,
    create_force_move_transaction, create_respond_transaction, create_transfer_transaction,
    AdjudicatorCall,
};

use forcemove_types::Address;
use thiserror::Error;

/// Validation errors from aggregation and call construction.
///
/// These fail fast and are never retried; a caller hitting one has a bug or
/// incomplete inputs, not a transient condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// No signed states were supplied.
    #[error("no signed states supplied")]
    Empty,
    /// Supplied signed states reference different channels.
    #[error("signed states span multiple channels")]
    MixedChannels,
    /// No signature could be attributed to this participant.
    #[error("missing signature for participant {0}")]
    MissingSignature(Address),
    /// Two signatures recovered to the same participant.
    #[error("duplicate signature from participant {0}")]
    DuplicateSigner(Address),
    /// A signature recovered to an address outside the participant list.
    #[error("signature from non-participant {0}")]
    NonParticipant(Address),
    /// Signature recovery itself failed.
    #[error(transparent)]
    Signature(#[from] forcemove_types::SignatureError),
    /// Respond requires an active challenge in storage.
    #[error("no challenge state in channel storage")]
    NoChallengeState,
    /// Conclusion proofs must consist of final states only.
    #[error("conclusion proof contains a non-final state at turn {0}")]
    NonFinalState(u64),
}
