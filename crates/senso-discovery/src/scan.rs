//! `scan`/`list`/`find` over the `Browser` abstraction, plus the composable
//! filters `list`/`find` accept.

use std::sync::Arc;
use std::time::Duration;

use bridge_protocol::{Service, ServiceType};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::browse::{Browser, RawEntry};
use crate::txt::parse_txt;

const SCAN_CHANNEL_CAP: usize = 32;

/// Concurrently browse both Senso service types; yields each discovered
/// entry once parsed. Ends when `cancel` fires or both underlying browsers
/// end on their own. Mirrors the two-goroutines-per-type / wait-group shape
/// of the original driver: one task drives the mDNS browse, a second
/// converts and forwards. Here the channel closing itself (once every
/// forwarding task's sender clone drops) stands in for an explicit wait
/// counter.
pub fn scan(browser: Arc<dyn Browser>, cancel: CancellationToken) -> mpsc::Receiver<Service> {
    let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAP);
    for service_type in [ServiceType::SensoUpdate, ServiceType::SensoControl] {
        let (raw_tx, raw_rx) = mpsc::channel(SCAN_CHANNEL_CAP);
        let browser = browser.clone();
        let browse_cancel = cancel.clone();
        tokio::spawn(async move {
            browser.browse(service_type, browse_cancel, raw_tx).await;
        });
        tokio::spawn(forward_entries(service_type, raw_rx, tx.clone()));
    }
    rx
}

async fn forward_entries(
    service_type: ServiceType,
    mut raw_rx: mpsc::Receiver<RawEntry>,
    tx: mpsc::Sender<Service>,
) {
    let mut unknown_count: u32 = 0;
    while let Some(entry) = raw_rx.recv().await {
        if entry.address == "0.0.0.0" {
            continue;
        }
        let text = parse_txt(&entry.txt);
        let serial = text.serial.unwrap_or_else(|| {
            let synthesized = format!("UNKNOWN-{unknown_count}");
            unknown_count += 1;
            synthesized
        });
        let service = Service {
            serial,
            address: entry.address,
            service_type,
            mode: text.mode,
            port: entry.port,
        };
        if tx.send(service).await.is_err() {
            break;
        }
    }
}

/// Collect every entry discovered within `timeout`.
pub async fn list(
    browser: Arc<dyn Browser>,
    parent: CancellationToken,
    timeout: Duration,
) -> Vec<Service> {
    let child = parent.child_token();
    let mut rx = scan(browser, child.clone());
    let mut result = Vec::new();
    let sleep = tokio::time::sleep(timeout);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => break,
            () = child.cancelled() => break,
            maybe = rx.recv() => match maybe {
                Some(service) => result.push(service),
                None => break,
            },
        }
    }
    child.cancel();
    result
}

/// Return the first discovered entry satisfying `filter`, cancelling
/// outstanding browsing as soon as a match is found.
pub async fn find(
    browser: Arc<dyn Browser>,
    parent: CancellationToken,
    timeout: Duration,
    filter: impl Fn(&Service) -> bool,
) -> Option<Service> {
    let child = parent.child_token();
    let mut rx = scan(browser, child.clone());
    let sleep = tokio::time::sleep(timeout);
    tokio::pin!(sleep);
    let found = loop {
        tokio::select! {
            () = &mut sleep => break None,
            () = child.cancelled() => break None,
            maybe = rx.recv() => match maybe {
                Some(service) if filter(&service) => break Some(service),
                Some(_) => continue,
                None => break None,
            },
        }
    };
    child.cancel();
    found
}

/// Filter matching an exact serial number.
pub fn by_serial(serial: impl Into<String>) -> impl Fn(&Service) -> bool {
    let serial = serial.into();
    move |service| service.serial == serial
}

/// Filter matching an exact address.
pub fn by_address(address: impl Into<String>) -> impl Fn(&Service) -> bool {
    let address = address.into();
    move |service| service.address == address
}

/// Filter matching services already in DFU mode.
pub fn is_dfu(service: &Service) -> bool {
    service.is_dfu()
}
