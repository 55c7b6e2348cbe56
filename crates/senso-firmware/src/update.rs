//! Orchestrates firmware updates: locate the target, send the DFU command,
//! rediscover the bootloader, and upload the image over TFTP.

use std::sync::Arc;
use std::time::Duration;

use bridge_protocol::{Service, SensoMessage};
use senso_discovery::{Browser, by_address, by_serial, find, is_dfu, list};
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::dfu::DfuSender;
use crate::error::FirmwareError;
use crate::session_owner::SessionOwner;
use crate::tftp_upload::TftpUploader;

const LOCATE_TIMEOUT: Duration = Duration::from_secs(15);
const REDISCOVER_TIMEOUT: Duration = Duration::from_secs(30);
const DFU_RETRY_MAX_ELAPSED: Duration = Duration::from_secs(30);
const DFU_RETRY_MAX_INTERVAL: Duration = Duration::from_secs(10);
const TFTP_STARTUP_WAIT: Duration = Duration::from_secs(12);
pub const DEFAULT_CONTROL_PORT: u16 = 55567;
pub const DEFAULT_TFTP_PORT: u16 = 69;

pub struct UpdateRequest {
    pub serial: Option<String>,
    pub address: Option<String>,
    pub image: Vec<u8>,
    /// Senso control port to send the DFU command to.
    pub dfu_port: u16,
    /// Port the bootloader's TFTP server listens on.
    pub tftp_port: u16,
}

/// Drives one firmware update end to end, emitting progress through `emit`.
/// Disconnects and re-marks the handle as updating for the whole duration
/// regardless of outcome.
pub async fn update_firmware(
    owner: &dyn SessionOwner,
    browser: Arc<dyn Browser>,
    cancel: CancellationToken,
    dfu: &dyn DfuSender,
    tftp: &dyn TftpUploader,
    request: UpdateRequest,
    mut emit: impl FnMut(SensoMessage),
) -> Result<(), FirmwareError> {
    owner.disconnect();
    owner.set_updating(true);
    let result = run(browser, cancel, dfu, tftp, request, &mut emit).await;
    owner.set_updating(false);
    match &result {
        Ok(()) => emit(SensoMessage::FirmwareUpdateSuccess {
            message: "Success! Firmware transmitted to Senso.".to_owned(),
        }),
        Err(error) => emit(SensoMessage::FirmwareUpdateFailure {
            message: error.to_string(),
        }),
    }
    result
}

async fn run(
    browser: Arc<dyn Browser>,
    cancel: CancellationToken,
    dfu: &dyn DfuSender,
    tftp: &dyn TftpUploader,
    request: UpdateRequest,
    emit: &mut impl FnMut(SensoMessage),
) -> Result<(), FirmwareError> {
    let mut target = locate(&browser, &cancel, &request, emit).await?;
    progress(emit, format!("Discovered Senso at {}", target.address));

    if !is_dfu(&target) {
        send_dfu_with_retry(dfu, &target, request.dfu_port, &cancel, emit).await?;
        progress(emit, "Looking for Senso in bootloader mode".to_owned());

        let serial = target.serial.clone();
        let rediscovered = find(
            browser.clone(),
            cancel.clone(),
            REDISCOVER_TIMEOUT,
            move |s| s.serial == serial && s.is_dfu(),
        )
        .await
        .ok_or(FirmwareError::RediscoverFailed)?;
        target = rediscovered;

        progress(
            emit,
            format!(
                "Waiting {} seconds to ensure proper TFTP startup",
                TFTP_STARTUP_WAIT.as_secs()
            ),
        );
        if sleep_cancellable(TFTP_STARTUP_WAIT, &cancel).await.is_err() {
            return Err(FirmwareError::Cancelled);
        }
    } else {
        progress(emit, "Senso discovered in bootloader mode".to_owned());
    }

    progress(emit, "Transmitting...".to_owned());
    let sent = tftp
        .upload(&target.address, request.tftp_port, &request.image)
        .await
        .map_err(FirmwareError::Tftp)?;
    progress(emit, format!("{sent} bytes sent"));

    Ok(())
}

async fn locate(
    browser: &Arc<dyn Browser>,
    cancel: &CancellationToken,
    request: &UpdateRequest,
    emit: &mut impl FnMut(SensoMessage),
) -> Result<Service, FirmwareError> {
    if let Some(serial) = &request.serial {
        progress(emit, format!("Using specified serial {serial}"));
        return find(browser.clone(), cancel.clone(), LOCATE_TIMEOUT, by_serial(serial.clone()))
            .await
            .ok_or_else(|| FirmwareError::SerialNotFound {
                serial: serial.clone(),
            });
    }
    if let Some(address) = &request.address {
        progress(emit, format!("Using specified address {address}"));
        return find(
            browser.clone(),
            cancel.clone(),
            LOCATE_TIMEOUT,
            by_address(address.clone()),
        )
        .await
        .ok_or_else(|| FirmwareError::AddressNotFound {
            address: address.clone(),
        });
    }
    progress(emit, "Looking for a single Senso".to_owned());
    let mut found = list(browser.clone(), cancel.clone(), LOCATE_TIMEOUT).await;
    if found.len() != 1 {
        return Err(FirmwareError::AmbiguousTarget { count: found.len() });
    }
    Ok(found.remove(0))
}

async fn send_dfu_with_retry(
    dfu: &dyn DfuSender,
    target: &Service,
    dfu_port: u16,
    cancel: &CancellationToken,
    emit: &mut impl FnMut(SensoMessage),
) -> Result<(), FirmwareError> {
    let mut backoff = Backoff::new(Duration::from_millis(500), 1.5, DFU_RETRY_MAX_INTERVAL);
    let started = tokio::time::Instant::now();
    loop {
        match dfu.send(&target.address, dfu_port).await {
            Ok(()) => {
                progress(
                    emit,
                    format!("Sent DFU command to {}:{dfu_port}.", target.address),
                );
                return Ok(());
            }
            Err(error) => {
                if started.elapsed() >= DFU_RETRY_MAX_ELAPSED {
                    return Err(FirmwareError::DfuFailed {
                        address: target.address.clone(),
                        source: error.to_string(),
                    });
                }
                let wait = backoff.next();
                progress(emit, format!("{error}\nRetrying in {wait:?}"));
                if sleep_cancellable(wait, cancel).await.is_err() {
                    return Err(FirmwareError::Cancelled);
                }
            }
        }
    }
}

async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> Result<(), ()> {
    tokio::select! {
        () = cancel.cancelled() => Err(()),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

fn progress(emit: &mut impl FnMut(SensoMessage), message: String) {
    emit(SensoMessage::FirmwareUpdateProgress { message });
}
