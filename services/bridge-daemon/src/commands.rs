//! Dispatches a decoded `SensoCommand` arriving as a text frame on `/senso`.
//!
//! While a firmware update is in progress, every command except `GetStatus`
//! and `Discover` is silently dropped — the resolved reading of spec.md's
//! open question on concurrent commands during an update.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use bridge_protocol::{SensoCommand, SensoMessage};
use tokio::sync::mpsc;
use tracing::warn;

use crate::state::AppState;
use crate::ws::{send_senso_message, WsSink};

pub async fn handle_senso_command(text: &str, state: &Arc<AppState>, sink: &WsSink) {
    let command = match serde_json::from_str::<SensoCommand>(text) {
        Ok(command) => command,
        Err(error) => {
            warn!(%error, "could not decode senso command");
            return;
        }
    };

    if state.senso.is_updating() && !matches!(command, SensoCommand::GetStatus | SensoCommand::Discover { .. }) {
        warn!("dropping command received during firmware update");
        return;
    }

    match command {
        SensoCommand::GetStatus => {
            let message = SensoMessage::Status { address: state.senso.address() };
            let _ = send_senso_message(sink, &message).await;
        }
        SensoCommand::Connect { address } => {
            state.senso.connect(address);
        }
        SensoCommand::Disconnect => {
            state.senso.disconnect();
        }
        SensoCommand::Discover { duration } => {
            run_discover(state, sink, duration).await;
        }
        SensoCommand::UpdateFirmware { serial_number, image, address } => {
            run_update_firmware(state, sink, serial_number, image, address).await;
        }
    }
}

async fn run_discover(state: &Arc<AppState>, sink: &WsSink, duration_secs: u64) {
    let mut rx = state.senso.discover(Duration::from_secs(duration_secs));
    while let Some(service) = rx.recv().await {
        let message = SensoMessage::Discovered { ip: vec![service.address.clone()], service };
        if !send_senso_message(sink, &message).await {
            return;
        }
    }
}

async fn run_update_firmware(
    state: &Arc<AppState>,
    sink: &WsSink,
    serial_number: Option<String>,
    image: String,
    address: Option<String>,
) {
    let image = match base64::engine::general_purpose::STANDARD.decode(image) {
        Ok(bytes) => bytes,
        Err(error) => {
            let message = SensoMessage::FirmwareUpdateFailure {
                message: format!("firmware image is not valid base64: {error}"),
            };
            let _ = send_senso_message(sink, &message).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<SensoMessage>();
    let sink_for_drain = sink.clone();
    let drain = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if !send_senso_message(&sink_for_drain, &message).await {
                break;
            }
        }
    });

    let request = senso_firmware::UpdateRequest {
        serial: serial_number,
        address,
        image,
        dfu_port: state.config.senso.dfu_port,
        tftp_port: state.config.tftp.port,
    };
    let result = state.senso.process_firmware_update(request, move |message| {
        let _ = tx.send(message);
    }).await;
    let _ = drain.await;

    if let Err(error) = result {
        warn!(%error, "firmware update failed");
    }
}
