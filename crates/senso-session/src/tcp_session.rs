//! Component B: a single persistent, reconnecting byte stream to a Senso
//! control port. Framing is opaque at this layer — raw bytes in, raw bytes
//! out, published/consumed via the bus's `rx`/`tx` topics.

use std::sync::Arc;
use std::time::Duration;

use bridge_bus::Bus;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const BACKOFF_MULTIPLIER: f64 = 1.5;
const BACKOFF_MAX_INTERVAL: Duration = Duration::from_secs(30);
const WRITE_DEADLINE: Duration = Duration::from_millis(1);
const READ_CHUNK: usize = 1024;

/// Runs until `cancel` fires. Every disconnect re-enters the dial loop with
/// a freshly reset backoff — only consecutive failed dial attempts within
/// one connection cycle escalate the interval.
pub async fn run(address: String, port: u16, cancel: CancellationToken, bus: Bus) {
    let mut backoff = Backoff::new(BACKOFF_INITIAL, BACKOFF_MULTIPLIER, BACKOFF_MAX_INTERVAL);
    loop {
        if cancel.is_cancelled() {
            return;
        }
        backoff.reset();
        let Some(stream) = dial_with_retry(&address, port, &cancel, &mut backoff).await else {
            return;
        };
        info!(address, port, "senso tcp session connected");
        run_connected(stream, &cancel, &bus).await;
        debug!(address, port, "senso tcp session disconnected");
    }
}

async fn dial_with_retry(
    address: &str,
    port: u16,
    cancel: &CancellationToken,
    backoff: &mut Backoff,
) -> Option<TcpStream> {
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((address, port))).await {
            Ok(Ok(stream)) => return Some(stream),
            Ok(Err(error)) => warn!(address, port, %error, "could not connect with senso"),
            Err(_) => warn!(address, port, "dial timed out"),
        }
        let wait = backoff.next();
        tokio::select! {
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(wait) => {}
        }
    }
}

/// Tokio sockets have no read-deadline concept, so unlike the write path
/// below there is no "timeout, log and continue" case to implement here —
/// cancellation covers the case of a socket that never produces data.
async fn run_connected(stream: TcpStream, cancel: &CancellationToken, bus: &Bus) {
    let (mut reader, mut writer) = stream.into_split();
    let mut tx_rx = bus.subscribe_tx();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => return,
                    Ok(n) => bus.publish_rx(Arc::from(&buf[..n])),
                    Err(error) => {
                        warn!(%error, "senso read error, disconnecting");
                        return;
                    }
                }
            }
            received = tx_rx.recv() => {
                match received {
                    Ok(data) => {
                        match tokio::time::timeout(WRITE_DEADLINE, writer.write_all(&data)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(error)) => {
                                warn!(%error, "senso write error, disconnecting");
                                return;
                            }
                            Err(_) => debug!("senso write deadline exceeded, continuing"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "tx lagged behind senso session");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt as _;
    use tokio::net::TcpListener;

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn scenario_connect_then_binary_is_forwarded_byte_exact() {
        let port = free_port().await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let bus = Bus::new();
        let cancel = CancellationToken::new();
        let session = tokio::spawn(run("127.0.0.1".to_owned(), port, cancel.clone(), bus.clone()));

        let (mut accepted, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();

        bus.publish_tx(Arc::from(&[0x01, 0x02, 0x03][..]));

        let mut buf = [0u8; 3];
        tokio::time::timeout(Duration::from_secs(2), accepted.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, [0x01, 0x02, 0x03]);

        cancel.cancel();
        session.await.unwrap();
    }

    #[tokio::test]
    async fn inbound_bytes_are_published_on_rx() {
        let port = free_port().await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let bus = Bus::new();
        let mut rx = bus.subscribe_rx();
        let cancel = CancellationToken::new();
        let session = tokio::spawn(run("127.0.0.1".to_owned(), port, cancel.clone(), bus));

        let (mut accepted, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();
        accepted.write_all(&[0xAA, 0xBB]).await.unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&*chunk, &[0xAA, 0xBB]);

        cancel.cancel();
        session.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_unblocks_the_dial_retry_loop() {
        // No listener bound: the session will sit in dial-retry backoff.
        let port = free_port().await;
        let bus = Bus::new();
        let cancel = CancellationToken::new();
        let session = tokio::spawn(run("127.0.0.1".to_owned(), port, cancel.clone(), bus));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session task should terminate promptly on cancellation")
            .unwrap();
    }
}
