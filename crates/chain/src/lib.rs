//! Chain-facing plumbing: event reconciliation and transaction submission.
//!
//! The adjudicator and asset holders are external collaborators reached
//! through the [`ChainProvider`] trait. This crate keeps the off-chain
//! belief about on-chain funding consistent: the chain is authoritative, the
//! local holdings copy is a cache that may be stale between events.

mod provider;
mod service;

pub use provider::{ChainError, ChainEvent, ChainProvider};
pub use service::{ChainEventSubscriber, ChainService, FundChannelArg, SetFundingArg};
