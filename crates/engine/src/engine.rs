//! The objective-cranking engine.

use crate::store::ChannelRecord;
use crate::EngineError;
use forcemove_chain::ChainEvent;
use forcemove_messages::{AddressedMessage, Message};
use forcemove_transactions::{create_force_move_transaction, AdjudicatorCall};
use forcemove_types::{
    Address, Bytes, Channel, ChannelId, ChannelStorage, KeyPair, Objective, ObjectiveEvent,
    ObjectiveId, ObjectiveKind, ObjectiveStatus, Outcome, SignedState, B256, U256,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Notifications broadcast to engine observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A peer proposed an objective we have not approved yet.
    ObjectiveProposed { objective_id: ObjectiveId },
    /// An objective's completion condition was observed.
    ObjectiveSucceeded { objective_id: ObjectiveId },
    /// A storage mismatch froze the channel.
    ChannelFrozen { channel_id: ChannelId },
}

/// Parameters for opening a new channel.
#[derive(Debug, Clone)]
pub struct CreateChannelArgs {
    pub chain_id: U256,
    pub channel_nonce: U256,
    pub participants: Vec<Address>,
    pub outcome: Outcome,
    pub app_definition: Address,
    pub app_data: Bytes,
    pub challenge_duration: u64,
}

/// The wallet core: signed-state store plus objective cranking.
///
/// Every public operation follows the same shape: lock the channel record,
/// mutate it, and only then hand back the outbound messages the mutation
/// implies. The channel id is the locking key; operations on different
/// channels never contend.
pub struct Engine {
    key: KeyPair,
    channels: Mutex<HashMap<ChannelId, Arc<tokio::sync::Mutex<ChannelRecord>>>>,
    objectives: Mutex<HashMap<ObjectiveId, Objective>>,
    completed: Mutex<HashSet<ObjectiveId>>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn new(key: KeyPair) -> Self {
        let (events, _) = broadcast::channel(256);
        Engine {
            key,
            channels: Mutex::new(HashMap::new()),
            objectives: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashSet::new()),
            events,
        }
    }

    /// This participant's signing address.
    pub fn address(&self) -> Address {
        self.key.address()
    }

    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Whether `objective_id` has already completed.
    pub fn is_completed(&self, objective_id: &ObjectiveId) -> bool {
        self.completed.lock().contains(objective_id)
    }

    /// Current status of a tracked objective, if still active.
    pub fn objective_status(&self, objective_id: &ObjectiveId) -> Option<ObjectiveStatus> {
        self.objectives
            .lock()
            .get(objective_id)
            .map(|o| o.status)
    }

    /// Open a channel: create the record, sign the prefund state, and
    /// propose an `OpenChannel` objective to the other participants.
    pub async fn create_channel(
        &self,
        args: CreateChannelArgs,
    ) -> Result<(ObjectiveId, Vec<AddressedMessage>), EngineError> {
        let channel = Channel::new(args.chain_id, args.channel_nonce, args.participants);
        let my_index = channel
            .participant_index(self.key.address())
            .ok_or(EngineError::NotParticipant(self.key.address()))?;
        let channel_id = channel.id();

        let record = {
            let mut channels = self.channels.lock();
            if channels.contains_key(&channel_id) {
                return Err(EngineError::ChannelExists(channel_id));
            }
            let record = Arc::new(tokio::sync::Mutex::new(ChannelRecord::new(
                channel.clone(),
                my_index,
            )));
            channels.insert(channel_id, record.clone());
            record
        };

        let mut objective = Objective::new(
            ObjectiveKind::OpenChannel,
            channel_id,
            channel.participants.clone(),
        );
        objective.apply(ObjectiveEvent::Approved)?;
        let objective_id = objective.id.clone();

        let prefund = forcemove_types::State {
            channel,
            turn_num: 0,
            is_final: false,
            outcome: args.outcome,
            app_definition: args.app_definition,
            app_data: args.app_data,
            challenge_duration: args.challenge_duration,
        };

        let mut record = record.lock().await;
        let signed = record
            .sign_state(prefund, &self.key)?
            .map(|s| vec![s])
            .unwrap_or_default();
        objective.apply(ObjectiveEvent::Started)?;
        self.objectives
            .lock()
            .insert(objective_id.clone(), objective.clone());

        info!(%channel_id, objective = %objective_id, "channel created");
        Ok((
            objective_id,
            to_peers(&record, Some(objective), signed),
        ))
    }

    /// Approve a remotely-proposed objective and act on it.
    pub async fn approve_objective(
        &self,
        objective_id: &ObjectiveId,
    ) -> Result<Vec<AddressedMessage>, EngineError> {
        let (channel_id, mut objective) = {
            let objectives = self.objectives.lock();
            let objective = objectives
                .get(objective_id)
                .ok_or_else(|| EngineError::ObjectiveNotFound(objective_id.clone()))?;
            (objective.channel_id, objective.clone())
        };
        objective.apply(ObjectiveEvent::Approved)?;
        self.objectives
            .lock()
            .insert(objective_id.clone(), objective);

        debug!(objective = %objective_id, "objective approved");
        self.crank(channel_id).await
    }

    /// Propose cooperative finalisation: sign a final state and open a
    /// `CloseChannel` objective.
    pub async fn close_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<(ObjectiveId, Vec<AddressedMessage>), EngineError> {
        let record = self.record(channel_id)?;
        let mut record = record.lock().await;

        let latest = record
            .latest_state()
            .ok_or(EngineError::NoSupportedState(channel_id))?
            .clone();
        let final_state = if latest.is_final {
            latest
        } else {
            latest.finalize(latest.turn_num + 1)
        };

        let mut objective = Objective::new(
            ObjectiveKind::CloseChannel,
            channel_id,
            record.channel.participants.clone(),
        );
        objective.apply(ObjectiveEvent::Approved)?;
        objective.apply(ObjectiveEvent::Started)?;
        let objective_id = objective.id.clone();

        let signed = record
            .sign_state(final_state, &self.key)?
            .map(|s| vec![s])
            .unwrap_or_default();
        self.objectives
            .lock()
            .insert(objective_id.clone(), objective.clone());

        info!(%channel_id, objective = %objective_id, "close proposed");
        Ok((
            objective_id,
            to_peers(&record, Some(objective), signed),
        ))
    }

    /// Open a `ChallengeChannel` objective and build the forceMove call.
    ///
    /// The support proof is the latest fully-signed state; the challenger
    /// signature is our own signature over it, proving participation to the
    /// adjudicator. Completion is chain-driven: the objective succeeds when
    /// the matching `ChallengeRegistered` event arrives.
    pub async fn challenge_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<(ObjectiveId, AdjudicatorCall), EngineError> {
        let record = self.record(channel_id)?;
        let mut record = record.lock().await;
        record.ensure_writable()?;

        let supported_turn = record
            .latest_fully_signed()
            .ok_or(EngineError::NoSupportedState(channel_id))?;
        let proof = record.support_proof(supported_turn);
        let my_index = record.my_index;
        let challenger_signature = record.entries[&supported_turn].signatures[&my_index];

        let call = create_force_move_transaction(&record.on_chain, &proof, challenger_signature)?;

        let mut objective = Objective::new(
            ObjectiveKind::ChallengeChannel,
            channel_id,
            record.channel.participants.clone(),
        );
        objective.apply(ObjectiveEvent::Approved)?;
        objective.apply(ObjectiveEvent::Started)?;
        let objective_id = objective.id.clone();
        self.objectives
            .lock()
            .insert(objective_id.clone(), objective);

        info!(%channel_id, turn = supported_turn, "challenge prepared");
        Ok((objective_id, call))
    }

    /// Ingest a wire message. Idempotent: redelivering a known objective or
    /// signed state changes nothing and returns no new outbound messages
    /// beyond what cranking still owes the peers.
    pub async fn push_message(
        &self,
        message: Message,
    ) -> Result<Vec<AddressedMessage>, EngineError> {
        let mut touched: HashSet<ChannelId> = HashSet::new();

        for objective in message.objectives {
            if self.is_completed(&objective.id) {
                continue;
            }
            touched.insert(objective.channel_id);
            let mut objectives = self.objectives.lock();
            if !objectives.contains_key(&objective.id) {
                // Remote proposals start unapproved; approval is an explicit
                // local decision.
                let mut proposed = objective;
                proposed.status = ObjectiveStatus::Proposed;
                let objective_id = proposed.id.clone();
                objectives.insert(objective_id.clone(), proposed);
                drop(objectives);
                debug!(objective = %objective_id, "remote objective proposed");
                let _ = self
                    .events
                    .send(EngineEvent::ObjectiveProposed { objective_id });
            }
        }

        for signed in message.signed_states {
            let channel_id = signed.state.channel.id();
            touched.insert(channel_id);
            let record = self.record_or_create(&signed)?;
            let mut record = record.lock().await;
            if record.add_signed_state(&signed)? {
                debug!(%channel_id, turn = signed.state.turn_num, "signature recorded");
            }
        }

        let mut outbound = Vec::new();
        for channel_id in touched {
            outbound.extend(self.crank(channel_id).await?);
        }
        Ok(outbound)
    }

    /// Recompute the outbound messages an objective still needs: the
    /// objective itself plus every signed state we hold for its channel.
    pub async fn sync_objective(
        &self,
        objective_id: &ObjectiveId,
    ) -> Result<Vec<AddressedMessage>, EngineError> {
        if self.is_completed(objective_id) {
            return Ok(Vec::new());
        }
        let objective = self
            .objectives
            .lock()
            .get(objective_id)
            .cloned()
            .ok_or_else(|| EngineError::ObjectiveNotFound(objective_id.clone()))?;
        let record = self.record(objective.channel_id)?;
        let record = record.lock().await;
        Ok(to_peers(
            &record,
            Some(objective),
            record.all_signed_states(),
        ))
    }

    /// Record observed holdings and crank anything newly unblocked.
    pub async fn update_funding(
        &self,
        channel_id: ChannelId,
        asset_holder: Address,
        amount: U256,
    ) -> Result<Vec<AddressedMessage>, EngineError> {
        let record = self.record(channel_id)?;
        {
            let mut record = record.lock().await;
            record.ensure_writable()?;
            record.set_funding(asset_holder, amount);
        }
        debug!(%channel_id, %asset_holder, holdings = %amount, "funding updated");
        self.crank(channel_id).await
    }

    /// Apply a chain event to the local storage mirror.
    pub async fn handle_chain_event(
        &self,
        event: ChainEvent,
    ) -> Result<Vec<AddressedMessage>, EngineError> {
        match event {
            ChainEvent::Deposited {
                asset_holder,
                destination,
                destination_holdings,
                ..
            } => {
                let channel_id = ChannelId(destination);
                if self.channels.lock().contains_key(&channel_id) {
                    self.update_funding(channel_id, asset_holder, destination_holdings)
                        .await
                } else {
                    Ok(Vec::new())
                }
            }
            ChainEvent::ChallengeRegistered {
                channel_id,
                turn_num_record,
                finalizes_at,
                challenger,
                challenge_state,
                ..
            } => {
                let Ok(record) = self.record(channel_id) else {
                    return Ok(Vec::new());
                };
                {
                    let mut record = record.lock().await;
                    let outcome = challenge_state.outcome.clone();
                    record.on_chain = ChannelStorage {
                        turn_num_record,
                        finalizes_at,
                        challenge_state: Some(challenge_state),
                        challenger_address: Some(challenger),
                        outcome: Some(outcome),
                    };
                }
                warn!(%channel_id, turn_num_record, finalizes_at, "challenge registered");
                self.complete_objective(&ObjectiveId::new(
                    ObjectiveKind::ChallengeChannel,
                    channel_id,
                ));
                Ok(Vec::new())
            }
            ChainEvent::ChallengeCleared {
                channel_id,
                turn_num_record,
            } => {
                let Ok(record) = self.record(channel_id) else {
                    return Ok(Vec::new());
                };
                record.lock().await.on_chain = ChannelStorage::open(turn_num_record);
                info!(%channel_id, turn_num_record, "challenge cleared");
                Ok(Vec::new())
            }
            ChainEvent::Concluded { channel_id } => {
                info!(%channel_id, "channel concluded on chain");
                Ok(Vec::new())
            }
            ChainEvent::FingerprintUpdated {
                channel_id,
                outcome,
            } => {
                let Ok(record) = self.record(channel_id) else {
                    return Ok(Vec::new());
                };
                record.lock().await.on_chain.outcome = Some(outcome);
                Ok(Vec::new())
            }
        }
    }

    /// The full conclusion proof: every participant's signature over the
    /// final state.
    pub async fn conclusion_proof(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<SignedState>, EngineError> {
        let record = self.record(channel_id)?;
        let record = record.lock().await;
        let turn = record
            .final_turn()
            .ok_or(EngineError::NoSupportedState(channel_id))?;
        let proof = record.support_proof(turn);
        if proof.is_empty() {
            return Err(EngineError::NoSupportedState(channel_id));
        }
        Ok(proof)
    }

    /// Snapshot of the local mirror of the adjudicator's storage.
    pub async fn storage_mirror(
        &self,
        channel_id: ChannelId,
    ) -> Result<ChannelStorage, EngineError> {
        let record = self.record(channel_id)?;
        let record = record.lock().await;
        Ok(record.on_chain.clone())
    }

    /// Compare an observed storage fingerprint against the local mirror.
    ///
    /// On mismatch the channel is frozen: the mirror can no longer be
    /// trusted, so every further write is refused until an operator
    /// intervenes.
    pub async fn verify_storage(
        &self,
        channel_id: ChannelId,
        observed: B256,
    ) -> Result<(), EngineError> {
        let record = self.record(channel_id)?;
        let mut record = record.lock().await;
        let expected = record.on_chain.hash();
        if expected == observed {
            return Ok(());
        }
        record.freeze();
        error!(%channel_id, %expected, %observed, "storage fingerprint mismatch, channel frozen");
        let _ = self.events.send(EngineEvent::ChannelFrozen { channel_id });
        Err(EngineError::StorageMismatch {
            channel_id,
            expected,
            actual: observed,
        })
    }

    fn record(
        &self,
        channel_id: ChannelId,
    ) -> Result<Arc<tokio::sync::Mutex<ChannelRecord>>, EngineError> {
        self.channels
            .lock()
            .get(&channel_id)
            .cloned()
            .ok_or(EngineError::ChannelNotFound(channel_id))
    }

    /// Look up the record for a wire state, creating it when this is the
    /// first we hear of the channel and we are one of its participants.
    fn record_or_create(
        &self,
        signed: &SignedState,
    ) -> Result<Arc<tokio::sync::Mutex<ChannelRecord>>, EngineError> {
        let channel_id = signed.state.channel.id();
        let mut channels = self.channels.lock();
        if let Some(record) = channels.get(&channel_id) {
            return Ok(record.clone());
        }
        let my_index = signed
            .state
            .channel
            .participant_index(self.key.address())
            .ok_or(EngineError::NotParticipant(self.key.address()))?;
        let record = Arc::new(tokio::sync::Mutex::new(ChannelRecord::new(
            signed.state.channel.clone(),
            my_index,
        )));
        channels.insert(channel_id, record.clone());
        Ok(record)
    }

    /// Progress every active objective on `channel_id`: counter-sign what
    /// the objective calls for, detect completion, and emit what peers are
    /// owed.
    async fn crank(&self, channel_id: ChannelId) -> Result<Vec<AddressedMessage>, EngineError> {
        let Ok(record) = self.record(channel_id) else {
            return Ok(Vec::new());
        };
        let active: Vec<Objective> = self
            .objectives
            .lock()
            .values()
            .filter(|o| o.channel_id == channel_id)
            .cloned()
            .collect();

        let mut outbound = Vec::new();
        let mut record = record.lock().await;
        for objective in active {
            if !matches!(
                objective.status,
                ObjectiveStatus::Approved | ObjectiveStatus::InProgress
            ) {
                continue;
            }
            if record.frozen {
                continue;
            }

            let newly_signed = self.crank_objective(&mut record, &objective)?;
            if !newly_signed.is_empty() {
                self.mark_started(&objective.id);
                outbound.extend(to_peers(&record, Some(objective.clone()), newly_signed));
            }
            if objective_complete(&record, &objective) {
                self.complete_objective(&objective.id);
            }
        }
        Ok(outbound)
    }

    fn crank_objective(
        &self,
        record: &mut ChannelRecord,
        objective: &Objective,
    ) -> Result<Vec<SignedState>, EngineError> {
        let mut signed = Vec::new();
        match objective.kind {
            ObjectiveKind::OpenChannel => {
                // Counter-sign the prefund setup state first.
                if let Some(prefund) = record.entries.get(&0).map(|e| e.state.clone()) {
                    signed.extend(record.sign_state(prefund, &self.key)?);
                }
                // The postfund state is only safe once the prefund round is
                // complete and the chain actually holds the funds.
                if record.is_fully_signed(0) && record.is_funded() {
                    let postfund = match record.entries.get(&1) {
                        Some(entry) => entry.state.clone(),
                        None => record.entries[&0].state.advance(1),
                    };
                    signed.extend(record.sign_state(postfund, &self.key)?);
                }
            }
            ObjectiveKind::CloseChannel => {
                if let Some(turn) = record.final_turn() {
                    let final_state = record.entries[&turn].state.clone();
                    signed.extend(record.sign_state(final_state, &self.key)?);
                }
            }
            // Chain-driven; nothing to counter-sign.
            ObjectiveKind::ChallengeChannel => {}
        }
        Ok(signed)
    }

    fn mark_started(&self, objective_id: &ObjectiveId) {
        let mut objectives = self.objectives.lock();
        if let Some(objective) = objectives.get_mut(objective_id) {
            if objective.status == ObjectiveStatus::Approved {
                // The table guarantees Approved -> InProgress exists.
                let _ = objective.apply(ObjectiveEvent::Started);
            }
        }
    }

    /// Mark an objective failed after its retry budget ran out.
    pub fn mark_failed(&self, objective_id: &ObjectiveId) {
        let mut objectives = self.objectives.lock();
        if let Some(objective) = objectives.get_mut(objective_id) {
            if objective.apply(ObjectiveEvent::Exhausted).is_ok() {
                warn!(objective = %objective_id, "objective failed");
            }
        }
    }

    fn complete_objective(&self, objective_id: &ObjectiveId) {
        let mut objectives = self.objectives.lock();
        let Some(mut objective) = objectives.remove(objective_id) else {
            return;
        };
        if objective.apply(ObjectiveEvent::Completed).is_err() {
            // Unapproved proposals cannot complete; put it back untouched.
            objectives.insert(objective_id.clone(), objective);
            return;
        }
        drop(objectives);
        self.completed.lock().insert(objective_id.clone());
        info!(objective = %objective_id, "objective succeeded");
        let _ = self.events.send(EngineEvent::ObjectiveSucceeded {
            objective_id: objective_id.clone(),
        });
    }
}

/// Whether the objective's completion condition holds on this record.
fn objective_complete(record: &ChannelRecord, objective: &Objective) -> bool {
    match objective.kind {
        ObjectiveKind::OpenChannel => record.is_fully_signed(1),
        ObjectiveKind::CloseChannel => record
            .final_turn()
            .map(|turn| record.is_fully_signed(turn))
            .unwrap_or(false),
        // Completion is the registration itself, not the timeout.
        ObjectiveKind::ChallengeChannel => record.on_chain.finalizes_at != 0,
    }
}

/// Address one message carrying `objective` and `signed_states` to every
/// participant except ourselves.
fn to_peers(
    record: &ChannelRecord,
    objective: Option<Objective>,
    signed_states: Vec<SignedState>,
) -> Vec<AddressedMessage> {
    if objective.is_none() && signed_states.is_empty() {
        return Vec::new();
    }
    let message = Message {
        objectives: objective.into_iter().collect(),
        signed_states,
    };
    record
        .channel
        .participants
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != record.my_index)
        .map(|(_, &to)| AddressedMessage {
            to,
            message: message.clone(),
        })
        .collect()
}
