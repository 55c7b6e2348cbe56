//! Shared application state: the bus, the Senso handle, the root
//! cancellation scope, and the last-known RFID reader list.

use std::sync::Arc;

use bridge_bus::Bus;
use bridge_protocol::RfidMessage;
use senso_session::Handle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::process_info;

pub struct AppState {
    pub bus: Bus,
    pub senso: Handle,
    pub root_cancel: CancellationToken,
    pub config: BridgeConfig,
    /// Resolved once at startup; see `process_info::current`.
    pub machine_id: String,
    known_readers: Mutex<Vec<String>>,
}

impl AppState {
    pub fn new(bus: Bus, senso: Handle, root_cancel: CancellationToken, config: BridgeConfig) -> Arc<Self> {
        Arc::new(Self {
            bus,
            senso,
            root_cancel,
            config,
            machine_id: process_info::machine_id(),
            known_readers: Mutex::new(Vec::new()),
        })
    }

    pub async fn known_readers(&self) -> Vec<String> {
        self.known_readers.lock().await.clone()
    }

    /// Spawns a background task that keeps `known_readers` in sync with the
    /// PC/SC engine's `ReadersChanged` events, for the `/rfid/readers` HTTP
    /// endpoint to read without needing its own bus subscription.
    pub fn spawn_reader_tracker(self: &Arc<Self>) {
        let state = self.clone();
        let mut rx = self.bus.subscribe_rfid_tokens();
        let cancel = self.root_cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    received = rx.recv() => {
                        match received {
                            Ok(RfidMessage::ReadersChanged { readers }) => {
                                *state.known_readers.lock().await = readers;
                            }
                            Ok(RfidMessage::Identified { .. }) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                        }
                    }
                }
            }
        });
    }
}
