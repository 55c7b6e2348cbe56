//! Supervises a flex device's serial port: opens it, pumps bytes through the
//! [`fsm::Parser`], and republishes completed sample sets on the bus. Reopens
//! from scratch on any I/O failure.

use std::sync::Arc;
use std::time::Duration;

use bridge_bus::Bus;
use serialport::SerialPort;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::enumerate::{self, FLEX_USB_VID};
use crate::fsm::{Fed, Parser};

const DEFAULT_BAUD_RATE: u32 = 115_200;
const START_POLL: &[u8] = b"S\n";
const RESCAN_DELAY: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Port-selection parameters: USB vendor ID to match and baud rate to open
/// at. Defaults match the Flex's documented configuration.
#[derive(Debug, Clone, Copy)]
pub struct PortConfig {
    pub usb_vid: u16,
    pub baud: u32,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self { usb_vid: FLEX_USB_VID, baud: DEFAULT_BAUD_RATE }
    }
}

/// Runs until `cancel` fires, reopening the port from scratch after every
/// disconnect.
pub async fn run(cancel: CancellationToken, bus: Bus, port_config: PortConfig) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let Some(port) = open_candidate(port_config) else {
            if sleep_or_cancelled(&cancel, RESCAN_DELAY).await {
                return;
            }
            continue;
        };

        let (byte_tx, byte_rx) = mpsc::channel(256);
        let (write_tx, write_rx) = mpsc::channel(4);
        let child = cancel.child_token();
        let pump = tokio::task::spawn_blocking({
            let child = child.clone();
            move || pump_blocking(port, byte_tx, write_rx, child)
        });

        drive(byte_rx, write_tx, &bus, &child).await;
        child.cancel();
        let _ = pump.await;
        debug!("flex session ended, will rescan");

        if sleep_or_cancelled(&cancel, RESCAN_DELAY).await {
            return;
        }
    }
}

async fn sleep_or_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(duration) => false,
    }
}

fn open_candidate(port_config: PortConfig) -> Option<Box<dyn SerialPort>> {
    for name in enumerate::candidate_ports(port_config.usb_vid) {
        match serialport::new(&name, port_config.baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()
        {
            Ok(port) => {
                info!(port = %name, "opened flex serial port");
                return Some(port);
            }
            Err(error) => warn!(port = %name, %error, "could not open flex candidate port"),
        }
    }
    None
}

/// Blocking read/write pump. Owns the port for the lifetime of one session;
/// returns on any I/O error or once `cancel` fires.
fn pump_blocking(
    mut port: Box<dyn SerialPort>,
    byte_tx: mpsc::Sender<u8>,
    mut write_rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) {
    use std::io::{Read, Write};

    if port.write_all(START_POLL).is_err() {
        return;
    }
    let mut buf = [0u8; 256];
    loop {
        if cancel.is_cancelled() {
            return;
        }
        while let Ok(data) = write_rx.try_recv() {
            if port.write_all(&data).is_err() {
                return;
            }
        }
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                for &byte in &buf[..n] {
                    if byte_tx.blocking_send(byte).is_err() {
                        return;
                    }
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::TimedOut => {}
            Err(_) => return,
        }
    }
}

/// Drives bytes from the port through the parser and onto the bus. Pure
/// orchestration, independent of the real serial port — testable with a
/// plain channel standing in for the device.
async fn drive(
    mut byte_rx: mpsc::Receiver<u8>,
    write_tx: mpsc::Sender<Vec<u8>>,
    bus: &Bus,
    cancel: &CancellationToken,
) {
    let mut parser = Parser::new();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            received = byte_rx.recv() => {
                let Some(byte) = received else { return };
                if let Fed::EmitSet(set) = parser.feed(byte) {
                    bus.publish_flex_rx(Arc::from(set));
                    if write_tx.send(START_POLL.to_vec()).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scenario_full_sample_set_is_published_and_acked() {
        let bus = Bus::new();
        let mut flex_rx = bus.subscribe_flex_rx();
        let cancel = CancellationToken::new();
        let (byte_tx, byte_rx) = mpsc::channel(256);
        let (write_tx, mut write_rx) = mpsc::channel(4);

        let drive_task = tokio::spawn({
            let bus = bus.clone();
            let cancel = cancel.clone();
            async move {
                drive(byte_rx, write_tx, &bus, &cancel).await;
            }
        });

        let mut frame = vec![b'N', b'\n', 0x00, 0x02, b'P', b'\n'];
        frame.extend_from_slice(&[0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18]);
        for byte in frame {
            byte_tx.send(byte).await.unwrap();
        }

        let set = flex_rx.recv().await.unwrap();
        assert_eq!(&*set, &[0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18]);

        let ack = write_rx.recv().await.unwrap();
        assert_eq!(ack, START_POLL);

        cancel.cancel();
        drive_task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_byte_channel_ends_the_drive_loop() {
        let bus = Bus::new();
        let cancel = CancellationToken::new();
        let (byte_tx, byte_rx) = mpsc::channel::<u8>(8);
        let (write_tx, _write_rx) = mpsc::channel(4);
        drop(byte_tx);

        tokio::time::timeout(Duration::from_secs(1), drive(byte_rx, write_tx, &bus, &cancel))
            .await
            .expect("drive should return once the byte channel closes");
    }
}
