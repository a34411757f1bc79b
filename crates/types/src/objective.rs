//! Objectives: named units of coordination work.
//!
//! An objective tracks one goal (open, close or challenge a channel) through
//! a flat status machine. The transition table is a plain function over a
//! tagged union; guards live with the engine, which owns the channel data
//! the guards inspect.

use crate::ChannelId;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable objective identifier, derived from kind and channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectiveId(String);

impl ObjectiveId {
    /// The canonical id for `kind` targeting `channel_id`.
    pub fn new(kind: ObjectiveKind, channel_id: ChannelId) -> Self {
        ObjectiveId(format!("{kind}-{channel_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of coordination an objective drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// Create, fund and run a channel.
    OpenChannel,
    /// Finalise a channel cooperatively.
    CloseChannel,
    /// Register an on-chain challenge for a stalled channel.
    ChallengeChannel,
}

impl fmt::Display for ObjectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectiveKind::OpenChannel => f.write_str("OpenChannel"),
            ObjectiveKind::CloseChannel => f.write_str("CloseChannel"),
            ObjectiveKind::ChallengeChannel => f.write_str("ChallengeChannel"),
        }
    }
}

/// Objective lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveStatus {
    /// Observed (locally requested or remotely proposed) but not yet
    /// approved by this participant.
    Proposed,
    /// Approved; the engine may act on it.
    Approved,
    /// First round of outbound messages sent; waiting for completion.
    InProgress,
    /// Completion signal fired.
    Succeeded,
    /// Retry budget exhausted.
    Failed,
}

/// Inputs to the status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveEvent {
    /// Local authorship or explicit local approval.
    Approved,
    /// First outbound messages sent.
    Started,
    /// Completion signal (signatures collected, challenge registered, ...).
    Completed,
    /// Retry budget exhausted without completion.
    Exhausted,
}

/// The flat `(status, event) -> status` transition table.
///
/// Returns `None` for undefined transitions; terminal states accept nothing.
pub fn next_status(status: ObjectiveStatus, event: ObjectiveEvent) -> Option<ObjectiveStatus> {
    use ObjectiveEvent as E;
    use ObjectiveStatus as S;
    match (status, event) {
        (S::Proposed, E::Approved) => Some(S::Approved),
        (S::Approved, E::Started) => Some(S::InProgress),
        // Completion can race the first send round.
        (S::Approved, E::Completed) | (S::InProgress, E::Completed) => Some(S::Succeeded),
        (S::InProgress, E::Exhausted) => Some(S::Failed),
        _ => None,
    }
}

/// Attempted transition not present in the table.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("objective {id}: no transition from {from:?} on {event:?}")]
pub struct InvalidTransition {
    pub id: ObjectiveId,
    pub from: ObjectiveStatus,
    pub event: ObjectiveEvent,
}

/// A tracked coordination goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    /// Stable identifier.
    pub id: ObjectiveId,
    /// The kind of work.
    pub kind: ObjectiveKind,
    /// The channel this objective targets.
    pub channel_id: ChannelId,
    /// Participants that must approve before the engine acts.
    pub participants: Vec<Address>,
    /// Current lifecycle status. Not part of the wire identity; receivers
    /// track their own status for a proposed objective.
    pub status: ObjectiveStatus,
}

impl Objective {
    /// A freshly observed objective in `Proposed` status.
    pub fn new(kind: ObjectiveKind, channel_id: ChannelId, participants: Vec<Address>) -> Self {
        Objective {
            id: ObjectiveId::new(kind, channel_id),
            kind,
            channel_id,
            participants,
            status: ObjectiveStatus::Proposed,
        }
    }

    /// Apply `event` through the transition table.
    pub fn apply(&mut self, event: ObjectiveEvent) -> Result<(), InvalidTransition> {
        match next_status(self.status, event) {
            Some(next) => {
                self.status = next;
                Ok(())
            }
            None => Err(InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                event,
            }),
        }
    }
}
