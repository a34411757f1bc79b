//! In-memory message delivery between participants.

use async_trait::async_trait;
use forcemove_chain::ChainProvider;
use forcemove_engine::Wallet;
use forcemove_messages::{AddressedMessage, Message, MessageTransport, TransportError};
use forcemove_types::Address;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Routes wire messages to registered inboxes, dropping a configurable
/// fraction on the floor.
///
/// Loss is sampled per message: `1.0` blackholes everything (for retry
/// exhaustion tests), `0.0` delivers everything. A send to an unregistered
/// address is silently dropped, matching a real network's behaviour toward
/// an offline peer.
pub struct SimulatedNetwork {
    inboxes: Mutex<HashMap<Address, mpsc::UnboundedSender<Message>>>,
    loss_rate: Mutex<f64>,
}

impl SimulatedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(SimulatedNetwork {
            inboxes: Mutex::new(HashMap::new()),
            loss_rate: Mutex::new(0.0),
        })
    }

    /// Register a participant inbox.
    pub fn register(&self, address: Address) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().insert(address, tx);
        rx
    }

    /// Set the fraction of messages dropped in transit.
    pub fn set_loss_rate(&self, rate: f64) {
        *self.loss_rate.lock() = rate;
    }
}

#[async_trait]
impl MessageTransport for SimulatedNetwork {
    async fn send(&self, messages: Vec<AddressedMessage>) -> Result<(), TransportError> {
        let loss_rate = *self.loss_rate.lock();
        for addressed in messages {
            if loss_rate > 0.0 && rand::random::<f64>() < loss_rate {
                debug!(to = %addressed.to, "message dropped in transit");
                continue;
            }
            if let Some(inbox) = self.inboxes.lock().get(&addressed.to) {
                let _ = inbox.send(addressed.message);
            }
        }
        Ok(())
    }
}

/// Wire a wallet into the network: register its inbox and spawn the pump
/// that feeds incoming messages through the engine and sends the replies.
pub fn attach_wallet<P: ChainProvider + 'static>(
    network: &Arc<SimulatedNetwork>,
    wallet: &Arc<Wallet<P>>,
) -> JoinHandle<()> {
    let mut inbox = network.register(wallet.address());
    let network = network.clone();
    let wallet = wallet.clone();
    tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            match wallet.engine().push_message(message).await {
                Ok(outbound) => {
                    if !outbound.is_empty() {
                        let _ = network.send(outbound).await;
                    }
                }
                Err(err) => warn!(error = %err, "inbound message rejected"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_registered_inboxes_only() {
        let network = SimulatedNetwork::new();
        let alice = Address::repeat_byte(0x11);
        let mut inbox = network.register(alice);

        network
            .send(vec![
                AddressedMessage {
                    to: alice,
                    message: Message::empty(),
                },
                AddressedMessage {
                    to: Address::repeat_byte(0x22),
                    message: Message::empty(),
                },
            ])
            .await
            .unwrap();

        assert!(inbox.recv().await.is_some());
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_loss_blackholes_everything() {
        let network = SimulatedNetwork::new();
        let alice = Address::repeat_byte(0x11);
        let mut inbox = network.register(alice);
        network.set_loss_rate(1.0);

        network
            .send(vec![AddressedMessage {
                to: alice,
                message: Message::empty(),
            }])
            .await
            .unwrap();
        assert!(inbox.try_recv().is_err());
    }
}
