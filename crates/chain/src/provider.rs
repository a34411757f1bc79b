//! The chain collaborator boundary.

use async_trait::async_trait;
use forcemove_transactions::AdjudicatorCall;
use forcemove_types::{Address, ChannelId, State, B256, U256};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors surfaced by the chain collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The adjudicator rejected a call. The reason string is part of the
    /// contract surface and matched verbatim by callers; revert errors are
    /// recoverable by re-reading storage/holdings and retrying with
    /// corrected parameters.
    #[error("transaction reverted: {0}")]
    Revert(String),
    /// RPC-level failure, unrelated to the call's validity.
    #[error("chain provider failure: {0}")]
    Provider(String),
}

impl ChainError {
    /// The revert reason, if this is a revert.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            ChainError::Revert(reason) => Some(reason),
            ChainError::Provider(_) => None,
        }
    }
}

/// Events emitted by the adjudicator and asset holders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// Funds arrived at an asset holder for a destination.
    Deposited {
        asset_holder: Address,
        destination: B256,
        amount_deposited: U256,
        /// Absolute holdings after the deposit; consumers reconcile against
        /// this rather than summing deltas.
        destination_holdings: U256,
    },
    /// A challenge was registered.
    ChallengeRegistered {
        channel_id: ChannelId,
        turn_num_record: u64,
        finalizes_at: u64,
        challenger: Address,
        is_final: bool,
        challenge_state: State,
    },
    /// A challenge was answered.
    ChallengeCleared {
        channel_id: ChannelId,
        turn_num_record: u64,
    },
    /// The channel finalised via conclude.
    Concluded { channel_id: ChannelId },
    /// The stored outcome fingerprint changed (after transfer payouts).
    FingerprintUpdated {
        channel_id: ChannelId,
        outcome: forcemove_types::Outcome,
    },
}

impl ChainEvent {
    /// Event name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ChainEvent::Deposited { .. } => "Deposited",
            ChainEvent::ChallengeRegistered { .. } => "ChallengeRegistered",
            ChainEvent::ChallengeCleared { .. } => "ChallengeCleared",
            ChainEvent::Concluded { .. } => "Concluded",
            ChainEvent::FingerprintUpdated { .. } => "FingerprintUpdated",
        }
    }
}

/// Read/write/watch access to the adjudicator and asset holders.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Current holdings for `destination` under `asset_holder`.
    async fn holdings(&self, asset_holder: Address, destination: B256) -> Result<U256, ChainError>;

    /// The adjudicator's current storage-slot hash for a channel
    /// (`B256::ZERO` for a channel it has never seen).
    async fn storage_hash(&self, channel_id: ChannelId) -> Result<B256, ChainError>;

    /// Submit a call. Resolves once the call is accepted or reverted.
    async fn submit(&self, call: AdjudicatorCall) -> Result<(), ChainError>;

    /// Subscribe to the event feed.
    fn subscribe(&self) -> broadcast::Receiver<ChainEvent>;
}
