//! Component F: the PC/SC polling engine. Establishes a smart-card context,
//! watches for reader add/remove via the PnP pseudo-reader, and polls each
//! physical reader for a card's UID.
//!
//! The blocking `pcsc` crate calls all live on a single `spawn_blocking`
//! thread per context lifetime; cancellation is observed between polls via
//! an `AtomicBool` flipped by a watcher task, the same pattern flex-serial
//! uses to bridge its blocking serial port into async.

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_bus::Bus;
use bridge_protocol::RfidMessage;
use pcsc::{Context, Protocols, ReaderState, Scope, ShareMode, State, PNP_NOTIFICATION};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::apdu::{parse_uid_response, GET_UID, SILENCE_BUZZER};
use crate::backoff::Backoff;
use crate::dedup::Dedup;
use crate::error::RfidError;
use crate::failure::FailureTracker;

const CONTEXT_BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const CONTEXT_BACKOFF_MULTIPLIER: f64 = 2.0;
const CONTEXT_BACKOFF_MAX: Duration = Duration::from_secs(120);
const STATUS_CHANGE_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_CONSECUTIVE_FAILURES: u8 = 10;

/// Runs until `cancel` fires. On any unrecoverable PC/SC error the whole
/// context is torn down and re-established from scratch, as if the service
/// had just started.
pub async fn run(cancel: CancellationToken, bus: Bus) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = {
            let stop = stop.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                stop.store(true, Ordering::Relaxed);
            })
        };

        let bus_for_blocking = bus.clone();
        let stop_for_blocking = stop.clone();
        let result =
            tokio::task::spawn_blocking(move || run_blocking(&stop_for_blocking, &bus_for_blocking)).await;
        watcher.abort();

        match result {
            Ok(()) => debug!("pcsc engine stopped"),
            Err(error) => warn!(%error, "pcsc engine task panicked"),
        }

        if cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
}

fn run_blocking(stop: &AtomicBool, bus: &Bus) {
    let mut backoff = Backoff::new(CONTEXT_BACKOFF_INITIAL, CONTEXT_BACKOFF_MULTIPLIER, CONTEXT_BACKOFF_MAX);
    let ctx = loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        match Context::establish(Scope::User) {
            Ok(ctx) => break ctx,
            Err(error) => {
                warn!(%error, "could not establish pcsc context, retrying");
                std::thread::sleep(backoff.next());
            }
        }
    };
    info!("pcsc context established");

    let mut known_readers: Vec<String> = Vec::new();
    let mut dedup = Dedup::new();
    let mut failures = FailureTracker::new(MAX_CONSECUTIVE_FAILURES);
    // Each reader's last-known state flag, carried across polls so
    // `get_status_change` only returns early on a genuine event rather than
    // treating every poll as a change from `UNAWARE`.
    let mut last_known_state: HashMap<String, State> = HashMap::new();
    let mut pnp_last_state = State::UNAWARE;

    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }

        let readers = match list_reader_names(&ctx) {
            Ok(readers) => readers,
            Err(error) => {
                warn!(%error, "could not list readers, tearing down context");
                return;
            }
        };
        if readers != known_readers {
            bus.publish_rfid_token(RfidMessage::ReadersChanged { readers: readers.clone() });
            known_readers = readers.clone();
            last_known_state.retain(|name, _| readers.contains(name));
        }

        let mut states: Vec<ReaderState> = readers
            .iter()
            .map(|name| {
                let state = last_known_state.get(name).copied().unwrap_or(State::UNAWARE);
                ReaderState::new(name.clone(), state)
            })
            .collect();
        states.push(ReaderState::new(PNP_NOTIFICATION(), pnp_last_state));

        match ctx.get_status_change(STATUS_CHANGE_TIMEOUT, &mut states) {
            Ok(()) => {}
            Err(pcsc::Error::Timeout) => continue,
            Err(error) => {
                warn!(%error, "pcsc status change failed, tearing down context");
                return;
            }
        }

        for state in &mut states {
            let name = state.name().to_string_lossy().into_owned();
            if name.contains("PnP") {
                state.sync_current_state();
                pnp_last_state = state.current_state();
                continue;
            }

            let present = state.event_state().contains(State::PRESENT);
            if !present {
                dedup.observe(&name, None);
                failures.reset(&name);
                state.sync_current_state();
                last_known_state.insert(name, state.current_state());
                continue;
            }

            match read_uid(&ctx, &name) {
                Ok(uid) => {
                    failures.reset(&name);
                    if let Some(token) = dedup.observe(&name, Some(&uid)) {
                        bus.publish_rfid_token(RfidMessage::Identified { token });
                    }
                }
                Err(error) => {
                    debug!(reader = %name, %error, "card read failed");
                    if failures.record_failure(&name) {
                        warn!(reader = %name, "forcing unknown after repeated read failures");
                        dedup.observe(&name, None);
                    }
                }
            }
            state.sync_current_state();
            last_known_state.insert(name, state.current_state());
        }
    }
}

fn list_reader_names(ctx: &Context) -> pcsc::Result<Vec<String>> {
    let mut buf = Vec::new();
    let readers = ctx.list_readers(&mut buf)?;
    Ok(readers.map(|name| name.to_string_lossy().into_owned()).collect())
}

fn read_uid(ctx: &Context, reader: &str) -> Result<String, RfidError> {
    let reader_cstr = CString::new(reader).map_err(|_| RfidError::InvalidUidResponse)?;
    let card = ctx.connect(&reader_cstr, ShareMode::Shared, Protocols::ANY)?;

    let mut scratch = [0u8; 256];
    let _ = card.transmit(&SILENCE_BUZZER, &mut scratch);

    let mut response_buf = [0u8; 256];
    let response = card.transmit(&GET_UID, &mut response_buf)?;
    parse_uid_response(response).ok_or(RfidError::InvalidUidResponse)
}
