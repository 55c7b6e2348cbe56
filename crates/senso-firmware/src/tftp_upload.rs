//! TFTP upload of the firmware image to a Senso bootloader, wrapped off the
//! async runtime the way `rt-updater` wraps its blocking `self_update`/
//! `reqwest::blocking` calls with `spawn_blocking`.

use std::future::Future;
use std::pin::Pin;

const FILENAME: &str = "controller-app.bin";
const MAX_RETRIES: usize = 5;
const RETRY_TIMEOUT_SECS: u64 = 10;

/// Uploads `image` via TFTP, returning the number of bytes sent.
pub trait TftpUploader: Send + Sync {
    fn upload<'a>(
        &'a self,
        address: &'a str,
        port: u16,
        image: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<u64, String>> + Send + 'a>>;
}

pub struct TftpClientUploader;

impl TftpUploader for TftpClientUploader {
    fn upload<'a>(
        &'a self,
        address: &'a str,
        port: u16,
        image: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<u64, String>> + Send + 'a>> {
        let target = format!("{address}:{port}");
        let image = image.to_vec();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || upload_blocking(&target, &image))
                .await
                .map_err(|e| format!("tftp upload task panicked: {e}"))?
        })
    }
}

/// Per-attempt backoff: `min(2^attempt, 60)` seconds, as documented.
fn attempt_backoff_secs(attempt: u32) -> u64 {
    2u64.saturating_pow(attempt).min(60)
}

fn upload_blocking(target: &str, image: &[u8]) -> Result<u64, String> {
    let socket_addr = target
        .parse()
        .map_err(|e| format!("invalid tftp target {target}: {e}"))?;

    let mut last_error = String::new();
    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            std::thread::sleep(std::time::Duration::from_secs(attempt_backoff_secs(attempt as u32)));
        }

        let mut client = tftp::client::Client::new(socket_addr)
            .map_err(|e| format!("could not create tftp client: {e}"))?;
        client.set_timeout(std::time::Duration::from_secs(RETRY_TIMEOUT_SECS));

        let mut cursor = std::io::Cursor::new(image);
        match client.send_file(FILENAME, &mut cursor, tftp::client::Mode::Octet) {
            Ok(()) => return Ok(image.len() as u64),
            Err(e) => last_error = format!("could not send {FILENAME}: {e}"),
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_sixty_seconds() {
        assert_eq!(attempt_backoff_secs(0), 1);
        assert_eq!(attempt_backoff_secs(3), 8);
        assert_eq!(attempt_backoff_secs(10), 60);
        assert_eq!(attempt_backoff_secs(63), 60);
    }
}
