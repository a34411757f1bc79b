//! The funding feed: subscribe once per asset holder, multicast, replay.

use crate::{ChainError, ChainEvent, ChainProvider};
use forcemove_transactions::create_deposit_transaction;
use forcemove_types::{Address, ChannelId, U256};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Latest known holdings for one `(asset_holder, channel)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetFundingArg {
    pub channel_id: ChannelId,
    pub asset_holder: Address,
    pub amount: U256,
}

/// Arguments for a guarded deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundChannelArg {
    pub channel_id: ChannelId,
    pub asset_holder: Address,
    /// Holdings the depositor believes are already present. A racing
    /// deposit makes the call revert deterministically instead of
    /// overfunding; treat that revert as "refresh holdings and retry".
    pub expected_held: U256,
    pub amount: U256,
}

/// Consumer of funding observations.
pub trait ChainEventSubscriber: Send + Sync {
    /// Called with the catch-up read at registration time and again on
    /// every subsequent deposit for the registered channel.
    fn set_funding(&self, arg: SetFundingArg);
}

/// Watches asset holders and submits funding transactions.
///
/// One underlying subscription exists per asset holder regardless of how
/// many channels register against it; registrations fan out from a shared
/// broadcast feed, each filtered to its own channel id.
pub struct ChainService<P: ChainProvider + 'static> {
    provider: Arc<P>,
    /// Per-asset-holder fan-out feeds. Keyed cache: a duplicate
    /// registration reuses the sender instead of opening a second
    /// provider subscription.
    feeds: Mutex<HashMap<Address, broadcast::Sender<SetFundingArg>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: ChainProvider + 'static> ChainService<P> {
    /// Create a service over the given provider.
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            feeds: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register interest in a channel's holdings under each asset holder.
    ///
    /// The subscriber immediately receives the holdings read at
    /// registration time, then every later deposit for that channel.
    pub async fn register_channel(
        &self,
        channel_id: ChannelId,
        asset_holders: &[Address],
        subscriber: Arc<dyn ChainEventSubscriber>,
    ) -> Result<(), ChainError> {
        for &asset_holder in asset_holders {
            let feed = self.feed_for(asset_holder);
            let mut live = feed.subscribe();

            // Catch-up read before the live loop: new registrants see the
            // current value, not just future events.
            let current = self
                .provider
                .holdings(asset_holder, channel_id.as_destination())
                .await?;
            subscriber.set_funding(SetFundingArg {
                channel_id,
                asset_holder,
                amount: current,
            });
            debug!(%channel_id, %asset_holder, holdings = %current, "registered funding watch");

            let subscriber = subscriber.clone();
            let handle = tokio::spawn(async move {
                // Deposits only ever raise holdings, so an event carrying a
                // value at or below the registration read was queued before
                // that read and must not regress the subscriber's view.
                let mut latest = current;
                loop {
                    match live.recv().await {
                        Ok(arg) if arg.channel_id == channel_id && arg.amount > latest => {
                            latest = arg.amount;
                            subscriber.set_funding(arg);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Holdings events are absolute, so only the
                            // latest matters; keep going.
                            warn!(%channel_id, skipped, "funding feed lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            self.tasks.lock().push(handle);
        }
        Ok(())
    }

    /// Submit a guarded deposit.
    pub async fn fund_channel(&self, arg: FundChannelArg) -> Result<(), ChainError> {
        let call = create_deposit_transaction(
            arg.asset_holder,
            arg.channel_id,
            arg.expected_held,
            arg.amount,
        );
        self.provider.submit(call).await
    }

    /// Submit any adjudicator call.
    pub async fn submit(
        &self,
        call: forcemove_transactions::AdjudicatorCall,
    ) -> Result<(), ChainError> {
        self.provider.submit(call).await
    }

    /// The raw chain event feed (challenges, conclusions, fingerprints).
    pub fn events(&self) -> broadcast::Receiver<ChainEvent> {
        self.provider.subscribe()
    }

    fn feed_for(&self, asset_holder: Address) -> broadcast::Sender<SetFundingArg> {
        let mut feeds = self.feeds.lock();
        if let Some(sender) = feeds.get(&asset_holder) {
            return sender.clone();
        }

        let (sender, _) = broadcast::channel(64);
        let mut events = self.provider.subscribe();
        let feed = sender.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChainEvent::Deposited {
                        asset_holder: holder,
                        destination,
                        destination_holdings,
                        ..
                    }) if holder == asset_holder => {
                        // Nobody listening yet is fine; catch-up reads cover
                        // late registrants.
                        let _ = feed.send(SetFundingArg {
                            channel_id: ChannelId(destination),
                            asset_holder,
                            amount: destination_holdings,
                        });
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.tasks.lock().push(handle);
        feeds.insert(asset_holder, sender.clone());
        sender
    }

    /// Number of distinct asset-holder subscriptions currently open.
    pub fn subscription_count(&self) -> usize {
        self.feeds.lock().len()
    }
}

impl<P: ChainProvider + 'static> Drop for ChainService<P> {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}
