//! Delivery and retry around the engine.

use crate::{CreateChannelArgs, Engine, EngineError, EngineEvent};
use forcemove_chain::{
    ChainError, ChainEventSubscriber, ChainProvider, ChainService, FundChannelArg, SetFundingArg,
};
use forcemove_messages::{AddressedMessage, MessageTransport, TransportError};
use forcemove_transactions::{
    create_conclude_transaction, create_transfer_transaction, revert, TransactionError,
};
use forcemove_types::{Address, ChannelId, ObjectiveId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Backoff schedule for the ensure loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    pub number_of_attempts: u32,
    pub initial_delay: Duration,
    pub multiple: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        RetryOptions {
            number_of_attempts: 10,
            initial_delay: Duration::from_millis(50),
            multiple: 2,
        }
    }
}

/// The objective did not complete within the retry budget.
///
/// Not a protocol fault: peers may simply be offline. The caller decides
/// whether to re-ensure later or escalate to a challenge.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("objective not complete after {number_of_attempts} attempts")]
pub struct EnsureObjectiveFailed {
    pub number_of_attempts: u32,
}

/// Errors from wallet operations, before the ensure loop takes over.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// A spawned ensure loop for one objective.
pub struct ObjectiveHandle {
    pub objective_id: ObjectiveId,
    pub task: JoinHandle<Result<(), EnsureObjectiveFailed>>,
}

/// An [`Engine`] wired to a transport and a chain service.
///
/// The wallet owns delivery: operations mutate the engine, then the ensure
/// loop keeps resending the objective's outstanding messages on an
/// exponential backoff until completion or exhaustion. Calls for the same
/// objective id serialize behind a per-id lock; distinct ids run in
/// parallel.
pub struct Wallet<P: ChainProvider + 'static> {
    engine: Arc<Engine>,
    chain: Arc<ChainService<P>>,
    transport: Arc<dyn MessageTransport>,
    retry: RetryOptions,
    in_flight: Mutex<HashMap<ObjectiveId, Arc<tokio::sync::Mutex<()>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Forwards funding observations from the chain service into the engine.
struct FundingForwarder {
    tx: mpsc::UnboundedSender<SetFundingArg>,
}

impl ChainEventSubscriber for FundingForwarder {
    fn set_funding(&self, arg: SetFundingArg) {
        let _ = self.tx.send(arg);
    }
}

impl<P: ChainProvider + 'static> Wallet<P> {
    pub fn new(
        engine: Arc<Engine>,
        chain: Arc<ChainService<P>>,
        transport: Arc<dyn MessageTransport>,
        retry: RetryOptions,
    ) -> Arc<Self> {
        let wallet = Arc::new(Wallet {
            engine,
            chain,
            transport,
            retry,
            in_flight: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        });
        wallet.spawn_chain_event_pump();
        wallet
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn address(&self) -> Address {
        self.engine.address()
    }

    /// Open a channel and keep pushing until every participant has signed
    /// the postfund state.
    pub async fn create_channel(
        self: &Arc<Self>,
        args: CreateChannelArgs,
    ) -> Result<ObjectiveHandle, WalletError> {
        let (objective_id, initial) = self.engine.create_channel(args).await?;
        Ok(self.spawn_ensure(objective_id, initial))
    }

    /// Approve a remotely-proposed objective and drive it to completion.
    pub async fn approve_objective(
        self: &Arc<Self>,
        objective_id: ObjectiveId,
    ) -> Result<ObjectiveHandle, WalletError> {
        let initial = self.engine.approve_objective(&objective_id).await?;
        Ok(self.spawn_ensure(objective_id, initial))
    }

    /// Propose cooperative finalisation and drive it to completion.
    pub async fn close_channel(
        self: &Arc<Self>,
        channel_id: ChannelId,
    ) -> Result<ObjectiveHandle, WalletError> {
        let (objective_id, initial) = self.engine.close_channel(channel_id).await?;
        Ok(self.spawn_ensure(objective_id, initial))
    }

    /// Submit an on-chain challenge; completes when the adjudicator emits
    /// the matching registration event.
    pub async fn challenge_channel(
        self: &Arc<Self>,
        channel_id: ChannelId,
    ) -> Result<ObjectiveHandle, WalletError> {
        let (objective_id, call) = self.engine.challenge_channel(channel_id).await?;
        self.chain.submit(call).await?;
        Ok(self.spawn_ensure(objective_id, Vec::new()))
    }

    /// Watch a channel's holdings under each asset holder, feeding reads
    /// and deposit events into the engine.
    pub async fn register_channel(
        self: &Arc<Self>,
        channel_id: ChannelId,
        asset_holders: &[Address],
    ) -> Result<(), WalletError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.chain
            .register_channel(channel_id, asset_holders, Arc::new(FundingForwarder { tx }))
            .await?;

        let wallet = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(arg) = rx.recv().await {
                match wallet
                    .engine
                    .update_funding(arg.channel_id, arg.asset_holder, arg.amount)
                    .await
                {
                    Ok(outbound) => wallet.send(outbound).await,
                    Err(err) => warn!(error = %err, "funding update rejected"),
                }
            }
        });
        self.tasks.lock().push(handle);
        Ok(())
    }

    /// Finalise the channel on chain with the collected conclusion proof.
    pub async fn conclude(&self, channel_id: ChannelId) -> Result<(), WalletError> {
        let proof = self.engine.conclusion_proof(channel_id).await?;
        let mirror = self.engine.storage_mirror(channel_id).await?;
        let call = create_conclude_transaction(&mirror, &proof)?;
        self.chain.submit(call).await?;
        Ok(())
    }

    /// Pay out the listed allocation indices of the finalised outcome.
    pub async fn transfer(
        &self,
        channel_id: ChannelId,
        asset_holder: Address,
        indices: Vec<usize>,
    ) -> Result<(), WalletError> {
        let mirror = self.engine.storage_mirror(channel_id).await?;
        // A challenge commits the outcome into the mirror; a cooperative
        // conclude commits the final state's outcome. Without either the
        // adjudicator would refuse anyway, so surface the same reason
        // without burning a transaction.
        let outcome = match mirror.outcome {
            Some(outcome) => outcome,
            None => match self.engine.conclusion_proof(channel_id).await {
                Ok(proof) => proof[0].state.outcome.clone(),
                Err(_) => {
                    return Err(
                        ChainError::Revert(revert::CHANNEL_NOT_FINALIZED.to_owned()).into()
                    )
                }
            },
        };
        let call = create_transfer_transaction(asset_holder, channel_id, outcome, indices);
        self.chain.submit(call).await?;
        Ok(())
    }

    /// Deposit with the optimistic-concurrency guard. A revert means
    /// another participant's deposit landed first; refresh holdings and
    /// retry with the new `expected_held`.
    pub async fn deposit(&self, arg: FundChannelArg) -> Result<(), ChainError> {
        self.chain.fund_channel(arg).await
    }

    /// Keep resending until `objective_id` completes or the retry budget
    /// runs out.
    ///
    /// The completion listener is subscribed before the first send, so a
    /// reply that races the send cannot be missed. Each round waits
    /// `initial_delay * multiple^i`, then resynchronises the objective's
    /// outstanding messages and resends; a completion event cancels the
    /// wait mid-delay.
    pub async fn ensure_objective(
        &self,
        objective_id: ObjectiveId,
        initial: Vec<AddressedMessage>,
    ) -> Result<(), EnsureObjectiveFailed> {
        let gate = self
            .in_flight
            .lock()
            .entry(objective_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let outcome = {
            let _serialized = gate.lock().await;
            self.drive_objective(&objective_id, initial).await
        };
        self.release_gate(&objective_id, &gate);
        outcome
    }

    /// One serialized pass of the ensure loop.
    async fn drive_objective(
        &self,
        objective_id: &ObjectiveId,
        initial: Vec<AddressedMessage>,
    ) -> Result<(), EnsureObjectiveFailed> {
        let mut events = self.engine.events();
        // The initial messages go out unconditionally: a counter-signature
        // can complete the objective locally (the approver of a close
        // already holds every other signature) while the peers still need
        // ours.
        self.send(initial).await;
        if self.engine.is_completed(objective_id) {
            return Ok(());
        }

        for attempt in 0..self.retry.number_of_attempts {
            let delay = self.retry.initial_delay * self.retry.multiple.pow(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if self.engine.is_completed(objective_id) {
                        return Ok(());
                    }
                    debug!(objective = %objective_id, attempt, "resending");
                    match self.engine.sync_objective(objective_id).await {
                        Ok(outbound) => self.send(outbound).await,
                        Err(err) => warn!(error = %err, "resync failed"),
                    }
                }
                _ = wait_for_completion(&mut events, &self.engine, objective_id) => {
                    return Ok(());
                }
            }
        }

        self.engine.mark_failed(objective_id);
        Err(EnsureObjectiveFailed {
            number_of_attempts: self.retry.number_of_attempts,
        })
    }

    /// Drop the serialization gate once the last waiter is done with it.
    fn release_gate(&self, objective_id: &ObjectiveId, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        // New clones only appear under this lock, so a count of exactly two
        // means just the map's entry and ours remain.
        if Arc::strong_count(gate) == 2 {
            in_flight.remove(objective_id);
        }
    }

    fn spawn_ensure(
        self: &Arc<Self>,
        objective_id: ObjectiveId,
        initial: Vec<AddressedMessage>,
    ) -> ObjectiveHandle {
        let wallet = self.clone();
        let id = objective_id.clone();
        let task = tokio::spawn(async move { wallet.ensure_objective(id, initial).await });
        ObjectiveHandle { objective_id, task }
    }

    /// Pump raw chain events (challenges, conclusions, fingerprints) into
    /// the engine.
    fn spawn_chain_event_pump(self: &Arc<Self>) {
        let wallet = self.clone();
        let mut events = self.chain.events();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match wallet.engine.handle_chain_event(event).await {
                        Ok(outbound) => wallet.send(outbound).await,
                        Err(err) => warn!(error = %err, "chain event rejected"),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "chain event feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Delivery failures are transient as far as the ensure loop is
    /// concerned; the next round resends everything anyway.
    async fn send(&self, outbound: Vec<AddressedMessage>) {
        if outbound.is_empty() {
            return;
        }
        if let Err(err) = self.transport.send(outbound).await {
            warn!(error = %err, "send failed, will retry");
        }
    }
}

impl<P: ChainProvider + 'static> Drop for Wallet<P> {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

/// Resolves only when `objective_id` completes.
async fn wait_for_completion(
    events: &mut broadcast::Receiver<EngineEvent>,
    engine: &Engine,
    objective_id: &ObjectiveId,
) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::ObjectiveSucceeded { objective_id: id }) if &id == objective_id => {
                return;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {
                if engine.is_completed(objective_id) {
                    return;
                }
            }
            // The engine outlives the wallet; if the feed closes anyway,
            // fall back to the per-round completion poll.
            Err(broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forcemove_chain::ChainEvent;
    use forcemove_messages::Message;
    use forcemove_transactions::AdjudicatorCall;
    use forcemove_types::{
        AllocationItem, Bytes, Channel, KeyPair, Outcome, B256, U256,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        events: broadcast::Sender<ChainEvent>,
    }

    impl StubProvider {
        fn new() -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self { events })
        }
    }

    #[async_trait]
    impl ChainProvider for StubProvider {
        async fn holdings(&self, _: Address, _: B256) -> Result<U256, ChainError> {
            Ok(U256::ZERO)
        }

        async fn storage_hash(&self, _: ChannelId) -> Result<B256, ChainError> {
            Ok(B256::ZERO)
        }

        async fn submit(&self, _: AdjudicatorCall) -> Result<(), ChainError> {
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
            self.events.subscribe()
        }
    }

    /// Accepts every message and counts the send calls.
    struct CountingTransport {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl MessageTransport for CountingTransport {
        async fn send(&self, _: Vec<AddressedMessage>) -> Result<(), TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wallet(
        retry: RetryOptions,
    ) -> (Arc<Wallet<StubProvider>>, Arc<CountingTransport>, KeyPair) {
        let alice = KeyPair::from_seed(&[1u8; 32]).unwrap();
        let engine = Arc::new(Engine::new(alice.clone()));
        let chain = Arc::new(ChainService::new(StubProvider::new()));
        let transport = Arc::new(CountingTransport {
            sends: AtomicUsize::new(0),
        });
        (
            Wallet::new(engine, chain, transport.clone(), retry),
            transport,
            alice,
        )
    }

    fn open_args(alice: &KeyPair) -> CreateChannelArgs {
        let bob = KeyPair::from_seed(&[2u8; 32]).unwrap();
        CreateChannelArgs {
            chain_id: U256::from(1234),
            channel_nonce: U256::from(7),
            participants: vec![alice.address(), bob.address()],
            outcome: Outcome::single_allocation(
                Address::repeat_byte(0x01),
                vec![AllocationItem {
                    destination: alice.address().into_word(),
                    amount: U256::from(10),
                }],
            ),
            app_definition: Address::repeat_byte(0xaa),
            app_data: Bytes::new(),
            challenge_duration: 300,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_is_exhausted_with_exponential_backoff() {
        let retry = RetryOptions::default();
        let (wallet, transport, alice) = wallet(retry);

        let started = tokio::time::Instant::now();
        let handle = wallet.create_channel(open_args(&alice)).await.unwrap();
        let err = handle.task.await.unwrap().unwrap_err();

        assert_eq!(err, EnsureObjectiveFailed { number_of_attempts: 10 });
        // Initial send plus one resend per attempt.
        assert_eq!(transport.sends.load(Ordering::SeqCst), 11);
        // 50ms * (2^10 - 1).
        assert_eq!(
            started.elapsed(),
            Duration::from_millis(50 * ((1 << 10) - 1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_ensures_for_one_objective_serialize() {
        let retry = RetryOptions {
            number_of_attempts: 2,
            ..RetryOptions::default()
        };
        let (wallet, transport, alice) = wallet(retry);

        let handle = wallet.create_channel(open_args(&alice)).await.unwrap();
        let second = {
            let wallet = wallet.clone();
            let id = handle.objective_id.clone();
            tokio::spawn(async move { wallet.ensure_objective(id, Vec::new()).await })
        };

        assert!(handle.task.await.unwrap().is_err());
        assert!(second.await.unwrap().is_err());
        // 2 initial sends (one empty, skipped) plus 2 resends each.
        assert_eq!(transport.sends.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn completed_objective_still_sends_the_initial_messages() {
        let (wallet, transport, alice) = wallet(RetryOptions::default());

        // A single-participant channel completes its open objective as soon
        // as funding lands; no wire traffic is involved.
        let solo = CreateChannelArgs {
            participants: vec![alice.address()],
            ..open_args(&alice)
        };
        let (objective_id, _) = wallet.engine().create_channel(solo).await.unwrap();
        let channel_id = Channel::new(U256::from(1234), U256::from(7), vec![alice.address()]).id();
        wallet
            .engine()
            .update_funding(channel_id, Address::repeat_byte(0x01), U256::from(10))
            .await
            .unwrap();
        assert!(wallet.engine().is_completed(&objective_id));

        // The peers still need whatever the caller owes them, even though
        // nothing remains to wait for locally.
        let owed = vec![AddressedMessage {
            to: Address::repeat_byte(0x99),
            message: Message::empty(),
        }];
        wallet.ensure_objective(objective_id, owed).await.unwrap();
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn serialization_gates_are_released_when_the_loop_exits() {
        let retry = RetryOptions {
            number_of_attempts: 1,
            ..RetryOptions::default()
        };
        let (wallet, _transport, alice) = wallet(retry);

        let handle = wallet.create_channel(open_args(&alice)).await.unwrap();
        assert!(handle.task.await.unwrap().is_err());
        assert!(wallet.in_flight.lock().is_empty());
    }
}
