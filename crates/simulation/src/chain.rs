//! An in-process adjudicator and asset holder.

use async_trait::async_trait;
use forcemove_chain::{ChainError, ChainEvent, ChainProvider};
use forcemove_transactions::{revert, AdjudicatorCall};
use forcemove_types::{
    Address, AssetOutcome, Channel, ChannelId, ChannelStorage, Outcome, Signature, State, B256,
    U256,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// The adjudicator's world state: a clock, holdings per asset holder and
/// destination, and one storage slot per channel.
struct Inner {
    now: u64,
    holdings: HashMap<(Address, B256), U256>,
    channels: HashMap<ChannelId, ChannelStorage>,
}

/// In-memory chain honouring the ForceMove call semantics.
///
/// Every rejection uses the adjudicator's revert reason strings, and the
/// clock only moves through [`SimulatedChain::advance_time`], so challenge
/// timeouts are deterministic.
pub struct SimulatedChain {
    inner: Mutex<Inner>,
    events: broadcast::Sender<ChainEvent>,
}

fn reverted(reason: &str) -> ChainError {
    ChainError::Revert(reason.to_owned())
}

impl SimulatedChain {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(SimulatedChain {
            inner: Mutex::new(Inner {
                // A nonzero genesis time keeps `finalizes_at = now` distinct
                // from the no-challenge sentinel.
                now: 1_000,
                holdings: HashMap::new(),
                channels: HashMap::new(),
            }),
            events,
        })
    }

    /// Current simulated unix time.
    pub fn now(&self) -> u64 {
        self.inner.lock().now
    }

    /// Move the clock forward.
    pub fn advance_time(&self, seconds: u64) {
        let mut inner = self.inner.lock();
        inner.now += seconds;
        debug!(now = inner.now, "clock advanced");
    }

    fn apply(&self, call: AdjudicatorCall) -> Result<ChainEvent, ChainError> {
        let mut inner = self.inner.lock();
        match call {
            AdjudicatorCall::Deposit {
                asset_holder,
                destination,
                expected_held,
                amount,
            } => {
                let held = inner
                    .holdings
                    .get(&(asset_holder, destination))
                    .copied()
                    .unwrap_or(U256::ZERO);
                if held < expected_held {
                    return Err(reverted(revert::HOLDINGS_LT_EXPECTED));
                }
                if held >= expected_held + amount {
                    return Err(reverted(revert::HOLDINGS_ALREADY_SUFFICIENT));
                }
                // Top up to the target rather than over-deposit.
                let target = expected_held + amount;
                let amount_deposited = target - held;
                inner.holdings.insert((asset_holder, destination), target);
                Ok(ChainEvent::Deposited {
                    asset_holder,
                    destination,
                    amount_deposited,
                    destination_holdings: target,
                })
            }

            AdjudicatorCall::ForceMove {
                turn_num_record,
                states,
                signatures,
                who_signed_what,
                challenger_signature,
            } => {
                let (channel, largest) = support_shape(&states)?;
                let channel_id = channel.id();
                let stored = stored_or_empty(&inner, channel_id);

                // Only open storage can be challenged here; a stale or
                // already-challenged context fails the fingerprint check.
                if stored.finalizes_at != 0 || stored.turn_num_record != turn_num_record {
                    return Err(reverted(revert::INCORRECT_FINGERPRINT));
                }
                if largest.turn_num <= stored.turn_num_record {
                    return Err(reverted(revert::TURN_NUM_RECORD_NOT_INCREASED));
                }
                verify_support(&channel, &states, &signatures, &who_signed_what)?;

                let challenger = challenger_signature
                    .recover(largest.signing_digest())
                    .map_err(|_| reverted(revert::CHALLENGER_NOT_PARTICIPANT))?;
                if channel.participant_index(challenger).is_none() {
                    return Err(reverted(revert::CHALLENGER_NOT_PARTICIPANT));
                }

                let finalizes_at = inner.now + largest.challenge_duration;
                inner.channels.insert(
                    channel_id,
                    ChannelStorage {
                        turn_num_record: largest.turn_num,
                        finalizes_at,
                        challenge_state: Some(largest.clone()),
                        challenger_address: Some(challenger),
                        outcome: Some(largest.outcome.clone()),
                    },
                );
                Ok(ChainEvent::ChallengeRegistered {
                    channel_id,
                    turn_num_record: largest.turn_num,
                    finalizes_at,
                    challenger,
                    is_final: largest.is_final,
                    challenge_state: largest,
                })
            }

            AdjudicatorCall::Respond {
                turn_num_record,
                finalizes_at,
                challenge_state,
                response_state,
                response_signature,
            } => {
                let channel_id = challenge_state.channel.id();
                let stored = stored_or_empty(&inner, channel_id);
                let matches_stored = stored.finalizes_at != 0
                    && stored.turn_num_record == turn_num_record
                    && stored.finalizes_at == finalizes_at
                    && stored.challenge_state.as_ref().map(State::hash)
                        == Some(challenge_state.hash());
                if !matches_stored {
                    return Err(reverted(revert::CHALLENGE_STATE_MISMATCH));
                }
                if inner.now >= stored.finalizes_at {
                    return Err(reverted(revert::CHALLENGE_TIMED_OUT));
                }
                if response_state.channel.id() != channel_id
                    || response_state.turn_num != challenge_state.turn_num + 1
                {
                    return Err(reverted(revert::TURN_NUM_RECORD_NOT_INCREASED));
                }

                // Only the participant whose turn it is may respond.
                let mover_index =
                    (response_state.turn_num % challenge_state.channel.num_participants() as u64)
                        as usize;
                let mover = challenge_state.channel.participants[mover_index];
                let signer = response_signature
                    .recover(response_state.signing_digest())
                    .map_err(|_| reverted(revert::RESPONSE_UNAUTHORIZED))?;
                if signer != mover {
                    return Err(reverted(revert::RESPONSE_UNAUTHORIZED));
                }

                let turn_num_record = response_state.turn_num;
                inner
                    .channels
                    .insert(channel_id, ChannelStorage::open(turn_num_record));
                Ok(ChainEvent::ChallengeCleared {
                    channel_id,
                    turn_num_record,
                })
            }

            AdjudicatorCall::Checkpoint {
                turn_num_record,
                finalizes_at,
                challenge_state,
                states,
                signatures,
                who_signed_what,
            } => {
                let (channel, largest) = support_shape(&states)?;
                let channel_id = channel.id();
                let stored = stored_or_empty(&inner, channel_id);

                let matches_stored = stored.turn_num_record == turn_num_record
                    && stored.finalizes_at == finalizes_at
                    && stored.challenge_state.as_ref().map(State::hash)
                        == challenge_state.as_ref().map(State::hash);
                if !matches_stored {
                    return Err(reverted(revert::INCORRECT_FINGERPRINT));
                }
                if stored.finalized(inner.now) {
                    return Err(reverted(revert::CHALLENGE_TIMED_OUT));
                }
                if largest.turn_num <= stored.turn_num_record {
                    return Err(reverted(revert::TURN_NUM_RECORD_NOT_INCREASED));
                }
                verify_support(&channel, &states, &signatures, &who_signed_what)?;

                let turn_num_record = largest.turn_num;
                inner
                    .channels
                    .insert(channel_id, ChannelStorage::open(turn_num_record));
                Ok(ChainEvent::ChallengeCleared {
                    channel_id,
                    turn_num_record,
                })
            }

            AdjudicatorCall::ConcludeFromOpen {
                turn_num_record,
                states,
                signatures,
                who_signed_what,
            } => {
                let (channel, largest) = support_shape(&states)?;
                let channel_id = channel.id();
                let stored = stored_or_empty(&inner, channel_id);
                if stored.finalizes_at != 0 || stored.turn_num_record != turn_num_record {
                    return Err(reverted(revert::INCORRECT_FINGERPRINT));
                }
                verify_support(&channel, &states, &signatures, &who_signed_what)?;

                conclude(&mut inner, channel_id, largest)
            }

            AdjudicatorCall::ConcludeFromChallenge {
                turn_num_record,
                finalizes_at,
                challenge_state,
                states,
                signatures,
                who_signed_what,
            } => {
                let (channel, largest) = support_shape(&states)?;
                let channel_id = channel.id();
                let stored = stored_or_empty(&inner, channel_id);
                let matches_stored = stored.finalizes_at != 0
                    && stored.turn_num_record == turn_num_record
                    && stored.finalizes_at == finalizes_at
                    && stored.challenge_state.as_ref().map(State::hash)
                        == Some(challenge_state.hash());
                if !matches_stored {
                    return Err(reverted(revert::INCORRECT_FINGERPRINT));
                }
                if stored.finalized(inner.now) {
                    return Err(reverted(revert::CHALLENGE_TIMED_OUT));
                }
                verify_support(&channel, &states, &signatures, &who_signed_what)?;

                conclude(&mut inner, channel_id, largest)
            }

            AdjudicatorCall::Transfer {
                asset_holder,
                channel_id,
                outcome,
                indices,
            } => {
                let stored = stored_or_empty(&inner, channel_id);
                if !stored.finalized(inner.now) {
                    return Err(reverted(revert::CHANNEL_NOT_FINALIZED));
                }
                if indices.windows(2).any(|pair| pair[0] >= pair[1]) {
                    return Err(reverted(revert::INDICES_MUST_BE_SORTED));
                }
                if stored.outcome.as_ref().map(Outcome::hash) != Some(outcome.hash()) {
                    return Err(reverted(revert::INCORRECT_FINGERPRINT));
                }

                let Some((_, AssetOutcome::Allocation(items))) = outcome
                    .0
                    .iter()
                    .find(|(holder, _)| *holder == asset_holder)
                else {
                    return Err(reverted(revert::INCORRECT_FINGERPRINT));
                };
                if indices.iter().any(|&idx| idx >= items.len()) {
                    return Err(ChainError::Provider(
                        "allocation index out of bounds".to_owned(),
                    ));
                }

                // Pay what the holdings can afford, in ascending index
                // order; paid destinations are credited under the same
                // asset holder so ledger-funded channels keep working.
                let source = (asset_holder, channel_id.as_destination());
                let mut held = inner.holdings.get(&source).copied().unwrap_or(U256::ZERO);
                let mut payouts = Vec::with_capacity(indices.len());
                for &idx in &indices {
                    let item = &items[idx];
                    let affordable = item.amount.min(held);
                    held -= affordable;
                    *inner
                        .holdings
                        .entry((asset_holder, item.destination))
                        .or_insert(U256::ZERO) += affordable;
                    payouts.push((idx, affordable));
                }
                inner.holdings.insert(source, held);

                // Remove top-down so earlier indices stay valid.
                let mut remaining = items.clone();
                for &(idx, paid) in payouts.iter().rev() {
                    if paid == remaining[idx].amount {
                        remaining.remove(idx);
                    } else {
                        remaining[idx].amount -= paid;
                    }
                }

                let new_outcome = Outcome(
                    outcome
                        .0
                        .iter()
                        .map(|(holder, content)| {
                            if *holder == asset_holder {
                                (*holder, AssetOutcome::Allocation(remaining.clone()))
                            } else {
                                (*holder, content.clone())
                            }
                        })
                        .collect(),
                );
                if let Some(storage) = inner.channels.get_mut(&channel_id) {
                    storage.outcome = Some(new_outcome.clone());
                }
                Ok(ChainEvent::FingerprintUpdated {
                    channel_id,
                    outcome: new_outcome,
                })
            }
        }
    }
}

fn stored_or_empty(inner: &Inner, channel_id: ChannelId) -> ChannelStorage {
    inner
        .channels
        .get(&channel_id)
        .cloned()
        .unwrap_or_else(|| ChannelStorage::open(0))
}

/// The channel and highest-turn state of a support proof.
fn support_shape(states: &[State]) -> Result<(Channel, State), ChainError> {
    let first = states
        .first()
        .ok_or_else(|| reverted(revert::UNACCEPTABLE_WHO_SIGNED_WHAT))?;
    let channel_id = first.channel.id();
    if states.iter().any(|s| s.channel.id() != channel_id) {
        return Err(reverted(revert::UNACCEPTABLE_WHO_SIGNED_WHAT));
    }
    let largest = states
        .iter()
        .max_by_key(|s| s.turn_num)
        .cloned()
        .ok_or_else(|| reverted(revert::UNACCEPTABLE_WHO_SIGNED_WHAT))?;
    Ok((first.channel.clone(), largest))
}

/// Check that participant `i`'s signature covers `states[who_signed_what[i]]`.
fn verify_support(
    channel: &Channel,
    states: &[State],
    signatures: &[Signature],
    who_signed_what: &[usize],
) -> Result<(), ChainError> {
    let n = channel.num_participants();
    if who_signed_what.len() != n || signatures.len() != n {
        return Err(reverted(revert::UNACCEPTABLE_WHO_SIGNED_WHAT));
    }
    for (i, &participant) in channel.participants.iter().enumerate() {
        let state = states
            .get(who_signed_what[i])
            .ok_or_else(|| reverted(revert::UNACCEPTABLE_WHO_SIGNED_WHAT))?;
        let signer = signatures[i]
            .recover(state.signing_digest())
            .map_err(|_| reverted(revert::UNACCEPTABLE_WHO_SIGNED_WHAT))?;
        if signer != participant {
            return Err(reverted(revert::UNACCEPTABLE_WHO_SIGNED_WHAT));
        }
    }
    Ok(())
}

/// Finalise immediately and commit the outcome.
fn conclude(
    inner: &mut Inner,
    channel_id: ChannelId,
    final_state: State,
) -> Result<ChainEvent, ChainError> {
    inner.channels.insert(
        channel_id,
        ChannelStorage {
            turn_num_record: final_state.turn_num,
            finalizes_at: inner.now,
            challenge_state: None,
            challenger_address: None,
            outcome: Some(final_state.outcome),
        },
    );
    Ok(ChainEvent::Concluded { channel_id })
}

#[async_trait]
impl ChainProvider for SimulatedChain {
    async fn holdings(&self, asset_holder: Address, destination: B256) -> Result<U256, ChainError> {
        Ok(self
            .inner
            .lock()
            .holdings
            .get(&(asset_holder, destination))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn storage_hash(&self, channel_id: ChannelId) -> Result<B256, ChainError> {
        Ok(self
            .inner
            .lock()
            .channels
            .get(&channel_id)
            .map(ChannelStorage::hash)
            .unwrap_or(B256::ZERO))
    }

    async fn submit(&self, call: AdjudicatorCall) -> Result<(), ChainError> {
        let kind = call.kind();
        match self.apply(call) {
            Ok(event) => {
                debug!(call = kind, event = event.type_name(), "call accepted");
                let _ = self.events.send(event);
                Ok(())
            }
            Err(err) => {
                debug!(call = kind, error = %err, "call rejected");
                Err(err)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forcemove_transactions::{
        create_checkpoint_transaction, create_conclude_transaction, create_deposit_transaction,
        create_force_move_transaction, create_respond_transaction, create_transfer_transaction,
    };
    use forcemove_types::{AllocationItem, Bytes, KeyPair};

    fn keys() -> Vec<KeyPair> {
        (1u8..=2)
            .map(|seed| KeyPair::from_seed(&[seed; 32]).unwrap())
            .collect()
    }

    fn channel(keys: &[KeyPair]) -> Channel {
        Channel::new(
            U256::from(1234),
            U256::from(1),
            keys.iter().map(|k| k.address()).collect(),
        )
    }

    fn state(keys: &[KeyPair], turn_num: u64, is_final: bool) -> State {
        State {
            channel: channel(keys),
            turn_num,
            is_final,
            outcome: Outcome::single_allocation(
                Address::repeat_byte(0x01),
                vec![
                    AllocationItem {
                        destination: keys[0].address().into_word(),
                        amount: U256::from(6),
                    },
                    AllocationItem {
                        destination: keys[1].address().into_word(),
                        amount: U256::from(4),
                    },
                ],
            ),
            app_definition: Address::repeat_byte(0xaa),
            app_data: Bytes::new(),
            challenge_duration: 300,
        }
    }

    fn sign_all(keys: &[KeyPair], state: &State) -> Vec<forcemove_types::SignedState> {
        keys.iter().map(|k| state.sign(k).unwrap()).collect()
    }

    #[tokio::test]
    async fn deposit_guards_reject_stale_expectations() {
        let chain = SimulatedChain::new();
        let asset_holder = Address::repeat_byte(0x01);
        let destination = ChannelId(B256::repeat_byte(0xaa));

        let err = chain
            .submit(create_deposit_transaction(
                asset_holder,
                destination,
                U256::from(5),
                U256::from(5),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.revert_reason(), Some(revert::HOLDINGS_LT_EXPECTED));

        chain
            .submit(create_deposit_transaction(
                asset_holder,
                destination,
                U256::ZERO,
                U256::from(5),
            ))
            .await
            .unwrap();
        assert_eq!(
            chain
                .holdings(asset_holder, destination.as_destination())
                .await
                .unwrap(),
            U256::from(5)
        );

        let err = chain
            .submit(create_deposit_transaction(
                asset_holder,
                destination,
                U256::ZERO,
                U256::from(3),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.revert_reason(), Some(revert::HOLDINGS_ALREADY_SUFFICIENT));
    }

    #[tokio::test]
    async fn checkpoint_enforces_turn_monotonicity() {
        let chain = SimulatedChain::new();
        let keys = keys();
        let proof = sign_all(&keys, &state(&keys, 2, false));

        chain
            .submit(create_checkpoint_transaction(&ChannelStorage::open(0), &proof).unwrap())
            .await
            .unwrap();

        // Replaying the same support cannot advance the record.
        let err = chain
            .submit(create_checkpoint_transaction(&ChannelStorage::open(2), &proof).unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err.revert_reason(),
            Some(revert::TURN_NUM_RECORD_NOT_INCREASED)
        );
    }

    #[tokio::test]
    async fn force_move_requires_a_turn_beyond_the_record() {
        let chain = SimulatedChain::new();
        let keys = keys();
        let proof = sign_all(&keys, &state(&keys, 2, false));

        chain
            .submit(create_checkpoint_transaction(&ChannelStorage::open(0), &proof).unwrap())
            .await
            .unwrap();

        // The record already sits at the proof's largest turn.
        let err = chain
            .submit(
                create_force_move_transaction(&ChannelStorage::open(2), &proof, proof[0].signature)
                    .unwrap(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.revert_reason(),
            Some(revert::TURN_NUM_RECORD_NOT_INCREASED)
        );
    }

    #[tokio::test]
    async fn force_move_then_respond_clears_with_responders_turn() {
        let chain = SimulatedChain::new();
        let keys = keys();
        let channel_id = channel(&keys).id();
        let challenged = state(&keys, 1, false);
        let proof = sign_all(&keys, &challenged);
        let mut events = chain.subscribe();

        // keys[1] raises the challenge.
        let challenger_signature = proof[1].signature;
        chain
            .submit(
                create_force_move_transaction(
                    &ChannelStorage::open(0),
                    &proof,
                    challenger_signature,
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let registered = events.recv().await.unwrap();
        let ChainEvent::ChallengeRegistered {
            turn_num_record,
            finalizes_at,
            challenger,
            ..
        } = registered
        else {
            panic!("expected ChallengeRegistered, got {registered:?}");
        };
        assert_eq!(turn_num_record, 1);
        assert_eq!(finalizes_at, chain.now() + 300);
        assert_eq!(challenger, keys[1].address());

        // Turn 2 belongs to participant 0, who answers.
        let storage = ChannelStorage {
            turn_num_record: 1,
            finalizes_at,
            challenge_state: Some(challenged.clone()),
            challenger_address: Some(challenger),
            outcome: Some(challenged.outcome.clone()),
        };
        let response = challenged.advance(2).sign(&keys[0]).unwrap();
        chain
            .submit(create_respond_transaction(&storage, &response).unwrap())
            .await
            .unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            ChainEvent::ChallengeCleared {
                channel_id,
                turn_num_record: 2,
            }
        );
        assert_eq!(
            chain.storage_hash(channel_id).await.unwrap(),
            ChannelStorage::open(2).hash()
        );
    }

    #[tokio::test]
    async fn respond_after_timeout_is_rejected() {
        let chain = SimulatedChain::new();
        let keys = keys();
        let challenged = state(&keys, 1, false);
        let proof = sign_all(&keys, &challenged);
        let challenger_signature = proof[0].signature;

        chain
            .submit(
                create_force_move_transaction(
                    &ChannelStorage::open(0),
                    &proof,
                    challenger_signature,
                )
                .unwrap(),
            )
            .await
            .unwrap();
        let finalizes_at = chain.now() + 300;
        chain.advance_time(301);

        let storage = ChannelStorage {
            turn_num_record: 1,
            finalizes_at,
            challenge_state: Some(challenged.clone()),
            challenger_address: Some(keys[0].address()),
            outcome: Some(challenged.outcome.clone()),
        };
        let response = challenged.advance(2).sign(&keys[0]).unwrap();
        let err = chain
            .submit(create_respond_transaction(&storage, &response).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.revert_reason(), Some(revert::CHALLENGE_TIMED_OUT));
    }

    #[tokio::test]
    async fn respond_with_stale_challenge_context_is_rejected() {
        let chain = SimulatedChain::new();
        let keys = keys();
        let challenged = state(&keys, 1, false);
        let proof = sign_all(&keys, &challenged);
        let challenger_signature = proof[0].signature;

        chain
            .submit(
                create_force_move_transaction(
                    &ChannelStorage::open(0),
                    &proof,
                    challenger_signature,
                )
                .unwrap(),
            )
            .await
            .unwrap();

        // A context naming the wrong challenge state must not clear it.
        let storage = ChannelStorage {
            turn_num_record: 1,
            finalizes_at: chain.now() + 300,
            challenge_state: Some(state(&keys, 0, false)),
            challenger_address: Some(keys[0].address()),
            outcome: None,
        };
        let response = challenged.advance(2).sign(&keys[0]).unwrap();
        let err = chain
            .submit(create_respond_transaction(&storage, &response).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.revert_reason(), Some(revert::CHALLENGE_STATE_MISMATCH));
    }

    #[tokio::test]
    async fn transfer_pays_out_a_concluded_channel() {
        let chain = SimulatedChain::new();
        let keys = keys();
        let channel_id = channel(&keys).id();
        let asset_holder = Address::repeat_byte(0x01);
        let final_state = state(&keys, 3, true);
        let proof = sign_all(&keys, &final_state);

        chain
            .submit(create_deposit_transaction(
                asset_holder,
                channel_id,
                U256::ZERO,
                U256::from(10),
            ))
            .await
            .unwrap();

        // Transfer before finalisation is refused.
        let early = create_transfer_transaction(
            asset_holder,
            channel_id,
            final_state.outcome.clone(),
            vec![0, 1],
        );
        let err = chain.submit(early.clone()).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some(revert::CHANNEL_NOT_FINALIZED));

        chain
            .submit(create_conclude_transaction(&ChannelStorage::open(0), &proof).unwrap())
            .await
            .unwrap();

        let unsorted = create_transfer_transaction(
            asset_holder,
            channel_id,
            final_state.outcome.clone(),
            vec![1, 0],
        );
        let err = chain.submit(unsorted).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some(revert::INDICES_MUST_BE_SORTED));

        let mut events = chain.subscribe();
        chain.submit(early).await.unwrap();

        let ChainEvent::FingerprintUpdated { outcome, .. } = events.recv().await.unwrap() else {
            panic!("expected FingerprintUpdated");
        };
        assert!(outcome.total_allocated(asset_holder).is_zero());
        assert_eq!(
            chain
                .holdings(asset_holder, keys[0].address().into_word())
                .await
                .unwrap(),
            U256::from(6)
        );
        assert_eq!(
            chain
                .holdings(asset_holder, keys[1].address().into_word())
                .await
                .unwrap(),
            U256::from(4)
        );
        assert_eq!(
            chain
                .holdings(asset_holder, channel_id.as_destination())
                .await
                .unwrap(),
            U256::ZERO
        );
    }

    #[tokio::test]
    async fn challenge_timeout_finalizes_for_transfer() {
        let chain = SimulatedChain::new();
        let keys = keys();
        let channel_id = channel(&keys).id();
        let asset_holder = Address::repeat_byte(0x01);
        let challenged = state(&keys, 1, false);
        let proof = sign_all(&keys, &challenged);

        chain
            .submit(create_deposit_transaction(
                asset_holder,
                channel_id,
                U256::ZERO,
                U256::from(10),
            ))
            .await
            .unwrap();
        chain
            .submit(
                create_force_move_transaction(&ChannelStorage::open(0), &proof, proof[0].signature)
                    .unwrap(),
            )
            .await
            .unwrap();
        chain.advance_time(301);

        // The unanswered challenge finalised the channel with its outcome.
        chain
            .submit(create_transfer_transaction(
                asset_holder,
                channel_id,
                challenged.outcome.clone(),
                vec![0, 1],
            ))
            .await
            .unwrap();
        assert_eq!(
            chain
                .holdings(asset_holder, keys[0].address().into_word())
                .await
                .unwrap(),
            U256::from(6)
        );
    }
}
