//! bridge-bus: the internal publish/subscribe broker coupling device
//! sessions (Senso TCP, Flex serial, PC/SC) to WebSocket handlers.
//!
//! Four fixed topics, each a bounded, lossy mailbox: publishers never block
//! and a full mailbox drops the oldest value rather than stall the producer.
//! `tokio::sync::broadcast` gives us exactly this for free — a slow or absent
//! subscriber never backs up the device-control loop.

use std::sync::Arc;

use bridge_protocol::RfidMessage;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A chunk of raw device bytes. `Arc<[u8]>` so fan-out to many subscribers is
/// a refcount bump, not a copy.
pub type SampleBytes = Arc<[u8]>;

const RX_CAP: usize = 32;
const TX_CAP: usize = 8;
const FLEX_RX_CAP: usize = 32;
const RFID_CAP: usize = 16;

/// The process-wide bus. Cheap to clone; every clone shares the same
/// underlying channels and shutdown token.
#[derive(Clone)]
pub struct Bus {
    rx: broadcast::Sender<SampleBytes>,
    tx: broadcast::Sender<SampleBytes>,
    flex_rx: broadcast::Sender<SampleBytes>,
    rfid_tokens: broadcast::Sender<RfidMessage>,
    shutdown: CancellationToken,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            rx: broadcast::channel(RX_CAP).0,
            tx: broadcast::channel(TX_CAP).0,
            flex_rx: broadcast::channel(FLEX_RX_CAP).0,
            rfid_tokens: broadcast::channel(RFID_CAP).0,
            shutdown: CancellationToken::new(),
        }
    }

    /// Publish a chunk of bytes read from the Senso TCP socket.
    pub fn publish_rx(&self, bytes: SampleBytes) {
        publish(&self.rx, bytes, "rx");
    }

    /// Publish a chunk of bytes to be written to the Senso TCP socket.
    pub fn publish_tx(&self, bytes: SampleBytes) {
        publish(&self.tx, bytes, "tx");
    }

    /// Publish one completed Flex sample set.
    pub fn publish_flex_rx(&self, bytes: SampleBytes) {
        publish(&self.flex_rx, bytes, "flex-rx");
    }

    /// Publish an RFID reader/card event.
    pub fn publish_rfid_token(&self, msg: RfidMessage) {
        publish(&self.rfid_tokens, msg, "rfid-tokens");
    }

    pub fn subscribe_rx(&self) -> broadcast::Receiver<SampleBytes> {
        self.rx.subscribe()
    }

    pub fn subscribe_tx(&self) -> broadcast::Receiver<SampleBytes> {
        self.tx.subscribe()
    }

    pub fn subscribe_flex_rx(&self) -> broadcast::Receiver<SampleBytes> {
        self.flex_rx.subscribe()
    }

    pub fn subscribe_rfid_tokens(&self) -> broadcast::Receiver<RfidMessage> {
        self.rfid_tokens.subscribe()
    }

    /// The root cancellation token. Every long-running task (sessions,
    /// engines, WebSocket pumps) should select on `cancelled()` alongside its
    /// own work and return promptly when it fires.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel the root scope. All tasks selecting on `shutdown_token()`
    /// observe this within one poll; there is no separate per-topic
    /// teardown. A subscriber simply drops its `Receiver` to unsubscribe.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

fn publish<T: Clone>(tx: &broadcast::Sender<T>, msg: T, topic: &'static str) {
    match tx.send(msg) {
        Ok(n) => debug!(topic, receivers = n, "published"),
        Err(_) => debug!(topic, "published with no subscribers"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(v: &[u8]) -> SampleBytes {
        Arc::from(v)
    }

    #[test]
    fn publish_and_receive_single_chunk() {
        let bus = Bus::new();
        let mut r = bus.subscribe_rx();
        bus.publish_rx(bytes(&[1, 2, 3]));
        assert_eq!(&*r.try_recv().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn multiple_subscribers_all_receive() {
        let bus = Bus::new();
        let mut r1 = bus.subscribe_flex_rx();
        let mut r2 = bus.subscribe_flex_rx();
        bus.publish_flex_rx(bytes(&[9, 9]));
        assert_eq!(&*r1.try_recv().unwrap(), &[9, 9]);
        assert_eq!(&*r2.try_recv().unwrap(), &[9, 9]);
    }

    #[test]
    fn topics_are_isolated() {
        let bus = Bus::new();
        let mut rx_sub = bus.subscribe_rx();
        let mut tx_sub = bus.subscribe_tx();
        bus.publish_rx(bytes(&[1]));
        assert!(rx_sub.try_recv().is_ok());
        assert!(tx_sub.try_recv().is_err());
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = Bus::new();
        bus.publish_rx(bytes(&[1, 2]));
    }

    #[test]
    fn full_mailbox_reports_lag_then_yields_oldest_retained() {
        let bus = Bus::new();
        let mut r = bus.subscribe_tx();
        let total_sent = TX_CAP as u8 + 4;
        for i in 0..total_sent {
            bus.publish_tx(bytes(&[i]));
        }
        match r.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(n)) => assert_eq!(n, 4),
            other => panic!("expected Lagged, got {other:?}"),
        }
        let oldest_retained = r.try_recv().unwrap();
        assert_eq!(oldest_retained[0], total_sent - TX_CAP as u8);
    }

    #[test]
    fn rfid_tokens_carry_typed_messages() {
        let bus = Bus::new();
        let mut r = bus.subscribe_rfid_tokens();
        bus.publish_rfid_token(RfidMessage::Identified {
            token: "04A224".into(),
        });
        assert_eq!(
            r.try_recv().unwrap(),
            RfidMessage::Identified {
                token: "04A224".into()
            }
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_token() {
        let bus = Bus::new();
        let token = bus.shutdown_token();
        assert!(!token.is_cancelled());
        bus.shutdown();
        assert!(token.is_cancelled());
        token.cancelled().await;
    }

    #[test]
    fn clone_shares_the_same_channels() {
        let bus = Bus::new();
        let bus2 = bus.clone();
        let mut r = bus.subscribe_rx();
        bus2.publish_rx(bytes(&[7]));
        assert_eq!(&*r.try_recv().unwrap(), &[7]);
    }
}
