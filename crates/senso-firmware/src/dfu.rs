//! The fixed 20-byte DFU command frame and its delivery over a short-lived
//! TCP connection to the Senso control port.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub const DFU_FRAME_LEN: usize = 20;

const PROTOCOL_VERSION: u8 = 0x00;
const NUM_BLOCKS: u8 = 0x01;
const BLOCK_LENGTH: u16 = 0x0008;
const BLOCK_TYPE_DFU: u16 = 0x00F0;
const MAGIC_KEY: u64 = 0xFA17_3CCD_8766_4FBE;

/// Build the fixed DFU command frame.
pub fn build_dfu_frame() -> [u8; DFU_FRAME_LEN] {
    let mut frame = [0u8; DFU_FRAME_LEN];
    frame[0] = PROTOCOL_VERSION;
    frame[1] = NUM_BLOCKS;
    // offsets 2..8 are reserved and stay zero.
    frame[8..10].copy_from_slice(&BLOCK_LENGTH.to_le_bytes());
    frame[10..12].copy_from_slice(&BLOCK_TYPE_DFU.to_le_bytes());
    frame[12..20].copy_from_slice(&MAGIC_KEY.to_be_bytes());
    frame
}

/// Sends the DFU command over a fresh TCP connection to the Senso
/// controller, with a 1s settle delay before writing (mirrors the original
/// driver, which gives the controller time to accept the connection before
/// the bootloader-entry command arrives).
pub trait DfuSender: Send + Sync {
    fn send<'a>(
        &'a self,
        address: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>>;
}

pub struct TcpDfuSender;

impl DfuSender for TcpDfuSender {
    fn send<'a>(
        &'a self,
        address: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut stream = TcpStream::connect((address, port)).await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            stream.write_all(&build_dfu_frame()).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_matches_the_documented_byte_layout() {
        let frame = build_dfu_frame();
        assert_eq!(
            frame,
            [
                0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0xF0, 0x00, 0xFA,
                0x17, 0x3C, 0xCD, 0x87, 0x66, 0x4F, 0xBE,
            ]
        );
    }

    #[test]
    fn frame_is_exactly_twenty_bytes() {
        assert_eq!(build_dfu_frame().len(), DFU_FRAME_LEN);
    }
}
