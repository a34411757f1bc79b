//! In-memory collaborators for protocol testing.
//!
//! [`SimulatedChain`] is a full in-process adjudicator plus asset holders:
//! it enforces the ForceMove call semantics, reverts with the contract's
//! reason strings, and exposes a manually-advanced clock so challenge
//! timeouts are testable without waiting. [`SimulatedNetwork`] delivers
//! wire messages between registered participants with a configurable loss
//! rate. Together they let the full wallet stack run end to end with no
//! chain node and no sockets.

mod chain;
mod network;

pub use chain::SimulatedChain;
pub use network::{attach_wallet, SimulatedNetwork};
