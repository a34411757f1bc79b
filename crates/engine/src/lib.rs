//! The off-chain wallet engine.
//!
//! The engine owns the per-channel signed-state store and the objective
//! state machine: it decides which states to counter-sign, detects when an
//! objective's completion condition holds, and emits the outbound messages
//! peers still need. The [`Wallet`] wraps an engine with the delivery side:
//! a transport, a chain service, and the exponential-backoff ensure loop
//! that keeps resending until an objective completes or the retry budget
//! runs out.
//!
//! Concurrency model: every channel is guarded by its own async lock, keyed
//! by channel id. Short-lived table lookups use `parking_lot`; anything held
//! across an await point uses `tokio::sync::Mutex`. Records are always
//! mutated before outbound messages are handed back, so a crash between the
//! two leaves the store ahead of the network, never behind.

mod engine;
mod error;
mod store;
mod wallet;

pub use engine::{CreateChannelArgs, Engine, EngineEvent};
pub use error::EngineError;
pub use store::{ChannelRecord, StateEntry};
pub use wallet::{EnsureObjectiveFailed, ObjectiveHandle, RetryOptions, Wallet, WalletError};
