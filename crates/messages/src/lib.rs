//! Wire messages exchanged between channel participants.
//!
//! The wire shape is transport-agnostic: `{ objectives, signedStates }`,
//! both lists optional and possibly empty. Receivers must be idempotent
//! under redelivery; a duplicate signed state for an already-stored turn
//! number is a no-op, not an error.

use async_trait::async_trait;
use forcemove_types::{Address, Objective, SignedState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One participant-to-participant message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Objective proposals or re-proposals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<Objective>,
    /// Signed states, each carrying enough to recover its signer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signed_states: Vec<SignedState>,
}

impl Message {
    /// A message with nothing in it.
    pub fn empty() -> Self {
        Message::default()
    }

    /// Whether both lists are empty.
    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty() && self.signed_states.is_empty()
    }

    /// Merge another message's contents into this one.
    pub fn merge(&mut self, other: Message) {
        self.objectives.extend(other.objectives);
        self.signed_states.extend(other.signed_states);
    }
}

/// A message plus its recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressedMessage {
    /// Recipient participant address.
    pub to: Address,
    /// Payload.
    pub message: Message,
}

/// Transport failure. Delivery is best-effort; the wallet's retry loop is
/// the recovery mechanism, so transports report rather than retry.
#[derive(Debug, Error)]
#[error("message transport failure: {0}")]
pub struct TransportError(pub String);

/// The message-transport collaborator the wallet sends through.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver a batch of addressed messages.
    async fn send(&self, messages: Vec<AddressedMessage>) -> Result<(), TransportError>;
}
