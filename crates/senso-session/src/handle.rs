//! Component C: the Senso handle. Owns the current target address, the
//! active TCP session's cancellation, and the firmware-update-in-progress
//! flag. The only caller of these operations is WebSocket command dispatch.

use std::sync::{Arc, Mutex};

use bridge_bus::Bus;
use bridge_protocol::{SensoMessage, Service};
use senso_discovery::{Browser, MdnsBrowser};
use senso_firmware::{DfuSender, FirmwareError, SessionOwner, TcpDfuSender, TftpClientUploader, TftpUploader, UpdateRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::tcp_session;

pub const CONTROL_PORT: u16 = 55567;

struct Inner {
    address: Option<String>,
    session_cancel: Option<CancellationToken>,
}

/// Process-wide Senso state. Cheap to clone; clones share the same
/// underlying connection state and bus.
#[derive(Clone)]
pub struct Handle {
    bus: Bus,
    root_cancel: CancellationToken,
    inner: Arc<Mutex<Inner>>,
    updating: Arc<Mutex<bool>>,
    browser: Arc<dyn Browser>,
    dfu: Arc<dyn DfuSender>,
    tftp: Arc<dyn TftpUploader>,
    control_port: u16,
}

impl Handle {
    pub fn new(bus: Bus, root_cancel: CancellationToken) -> Result<Self, senso_discovery::DiscoveryError> {
        Self::with_control_port(bus, root_cancel, CONTROL_PORT)
    }

    pub fn with_control_port(
        bus: Bus,
        root_cancel: CancellationToken,
        control_port: u16,
    ) -> Result<Self, senso_discovery::DiscoveryError> {
        Ok(Self::with_collaborators(
            bus,
            root_cancel,
            Arc::new(MdnsBrowser::new()?),
            Arc::new(TcpDfuSender),
            Arc::new(TftpClientUploader),
            control_port,
        ))
    }

    pub fn with_collaborators(
        bus: Bus,
        root_cancel: CancellationToken,
        browser: Arc<dyn Browser>,
        dfu: Arc<dyn DfuSender>,
        tftp: Arc<dyn TftpUploader>,
        control_port: u16,
    ) -> Self {
        Self {
            bus,
            root_cancel,
            inner: Arc::new(Mutex::new(Inner {
                address: None,
                session_cancel: None,
            })),
            updating: Arc::new(Mutex::new(false)),
            browser,
            dfu,
            tftp,
            control_port,
        }
    }

    pub fn address(&self) -> Option<String> {
        self.inner.lock().unwrap().address.clone()
    }

    /// Cancel any prior session, record the address, and start a new one in
    /// a child scope of the root.
    pub fn connect(&self, address: String) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(prior) = inner.session_cancel.take() {
            prior.cancel();
        }
        let child = self.root_cancel.child_token();
        inner.address = Some(address.clone());
        inner.session_cancel = Some(child.clone());
        drop(inner);
        let bus = self.bus.clone();
        let control_port = self.control_port;
        tokio::spawn(async move {
            tcp_session::run(address, control_port, child, bus).await;
        });
    }

    /// Cancel the active session's scope and clear the address. Does not
    /// affect any firmware update in progress — that has its own scope.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.session_cancel.take() {
            session.cancel();
        }
        inner.address = None;
    }

    /// Thin wrapper over service discovery: discover for up to `duration`.
    pub fn discover(&self, duration: std::time::Duration) -> mpsc::Receiver<Service> {
        let child = self.root_cancel.child_token();
        let rx = senso_discovery::scan_services(self.browser.clone(), child.clone());
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            child.cancel();
        });
        rx
    }

    pub fn is_updating(&self) -> bool {
        *self.updating.lock().unwrap()
    }

    pub fn set_updating(&self, updating: bool) {
        *self.updating.lock().unwrap() = updating;
    }

    pub async fn process_firmware_update(
        &self,
        request: UpdateRequest,
        emit: impl FnMut(SensoMessage),
    ) -> Result<(), FirmwareError> {
        let child = self.root_cancel.child_token();
        senso_firmware::update_firmware(
            self,
            self.browser.clone(),
            child,
            self.dfu.as_ref(),
            self.tftp.as_ref(),
            request,
            emit,
        )
        .await
    }
}

impl SessionOwner for Handle {
    fn disconnect(&self) {
        Handle::disconnect(self);
    }

    fn is_updating(&self) -> bool {
        Handle::is_updating(self)
    }

    fn set_updating(&self, updating: bool) {
        Handle::set_updating(self, updating);
    }
}
