//! The `Browser` abstraction over mDNS, and the real `mdns-sd`-backed
//! implementation. Kept separate from `scan`/`list`/`find` so those
//! operations can be tested against a fake browser without a real network.

use std::future::Future;
use std::pin::Pin;

use bridge_protocol::ServiceType;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One raw, unparsed mDNS resolution: an address, a port, and the raw TXT
/// `key=value` strings as advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub address: String,
    pub port: u16,
    pub txt: Vec<String>,
}

/// A source of raw mDNS entries for one service type. Mirrors the
/// `Checker`/`WorkflowState` trait-object pattern used elsewhere in this
/// workspace to keep discovery testable without a live network.
pub trait Browser: Send + Sync {
    /// Browse `service_type` until `cancel` fires or the underlying browse
    /// stream ends, forwarding every resolved entry to `out`.
    fn browse<'a>(
        &'a self,
        service_type: ServiceType,
        cancel: CancellationToken,
        out: mpsc::Sender<RawEntry>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// `Browser` backed by a real `mdns-sd` daemon.
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
}

impl MdnsBrowser {
    pub fn new() -> Result<Self, mdns_sd::Error> {
        Ok(Self {
            daemon: ServiceDaemon::new()?,
        })
    }
}

impl Browser for MdnsBrowser {
    fn browse<'a>(
        &'a self,
        service_type: ServiceType,
        cancel: CancellationToken,
        out: mpsc::Sender<RawEntry>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let ty = format!("{}.local.", service_type.as_str());
            let receiver = match self.daemon.browse(&ty) {
                Ok(r) => r,
                Err(error) => {
                    warn!(%error, service_type = ty, "mdns browse failed to start");
                    return;
                }
            };
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = receiver.recv_async() => {
                        match event {
                            Ok(ServiceEvent::ServiceResolved(info)) => {
                                let Some(address) = info
                                    .get_addresses()
                                    .iter()
                                    .find(|a| a.is_ipv4())
                                    .map(std::net::IpAddr::to_string)
                                else {
                                    continue;
                                };
                                let txt = info
                                    .get_properties()
                                    .iter()
                                    .map(|p| format!("{}={}", p.key(), p.val_str()))
                                    .collect();
                                let entry = RawEntry {
                                    address,
                                    port: info.get_port(),
                                    txt,
                                };
                                if out.send(entry).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => continue,
                            Err(_) => break,
                        }
                    }
                }
            }
        })
    }
}
