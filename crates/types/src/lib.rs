//! Core types for the ForceMove state channel protocol.
//!
//! This crate provides the foundational value types used throughout the
//! off-chain protocol core:
//!
//! - **Channel identity**: [`Channel`], [`ChannelId`]
//! - **Ledger snapshots**: [`State`], [`SignedState`]
//! - **Fund distribution**: [`Outcome`], [`Allocation`], [`Guarantee`]
//! - **Dispute status**: [`ChannelStorage`]
//! - **Coordination**: [`Objective`] and its status machine
//! - **Crypto**: [`KeyPair`], [`Signature`] (recoverable secp256k1 ECDSA)
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other workspace
//! crates. All types are immutable values: a new turn number always produces
//! a new [`State`], and two [`Channel`]s are the same channel iff their
//! [`ChannelId`]s match.
//!
//! Every hash produced here must bit-exactly match what the on-chain
//! adjudicator recomputes. A deviation is silent (wrong hash, not an error),
//! so the encodings are pinned by unit tests rather than by type safety.

mod channel;
mod objective;
mod outcome;
mod signing;
mod state;
mod storage;

pub use channel::{Channel, ChannelId};
pub use objective::{
    next_status, InvalidTransition, Objective, ObjectiveEvent, ObjectiveId, ObjectiveKind,
    ObjectiveStatus,
};
pub use outcome::{
    encode_allocation, encode_guarantee, encode_outcome, hash_asset_outcome, hash_outcome,
    Allocation, AllocationItem, AssetOutcome, Guarantee, Outcome,
};
pub use signing::{hash_message, KeyPair, Signature, SignatureError};
pub use state::{SignedState, State};
pub use storage::ChannelStorage;

// Re-export the Ethereum-typed primitives so downstream crates share one
// version of Address/U256/B256.
pub use alloy_primitives::{Address, Bytes, B256, U256};
