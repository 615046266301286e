//! Bidirectional byte relay for CONNECT tunnels.
//!
//! # Responsibilities
//! - Copy A→B and B→A concurrently, verbatim, in bounded chunks
//! - Propagate end-of-stream by shutting down the written-to side
//! - Abandon the surviving direction once it stalls after the other ends
//!
//! Used on the ship between the local client and the leased link, and on
//! the offshore between the link and the target host.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::observability::metrics;

/// Bytes read per copy step.
pub const RELAY_CHUNK: usize = 16 * 1024;

/// Default idle time allowed to the second direction after the first one ends.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(5);

/// Totals for one finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

/// Pump bytes between `a` and `b` until both directions are done.
///
/// When one direction sees EOF (or an error) it shuts down the stream it was
/// writing to. The other direction keeps running for as long as it moves
/// data at least once every `linger`; once it stalls that long it is
/// abandoned. Totals include bytes moved by an abandoned direction.
pub async fn relay<A, B>(a: A, b: B, linger: Duration) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);
    let a_to_b = AtomicU64::new(0);
    let b_to_a = AtomicU64::new(0);

    let forward = pump(&mut a_read, &mut b_write, &a_to_b, "a_to_b");
    let backward = pump(&mut b_read, &mut a_write, &b_to_a, "b_to_a");
    tokio::pin!(forward, backward);

    let first = tokio::select! {
        _ = &mut forward => Finished::AToB,
        _ = &mut backward => Finished::BToA,
    };
    match first {
        Finished::AToB => drain(linger, &mut backward, &b_to_a, "b_to_a").await,
        Finished::BToA => drain(linger, &mut forward, &a_to_b, "a_to_b").await,
    }

    let stats = RelayStats {
        a_to_b: a_to_b.load(Ordering::Relaxed),
        b_to_a: b_to_a.load(Ordering::Relaxed),
    };
    metrics::record_relay(stats.a_to_b, stats.b_to_a);
    tracing::debug!(a_to_b = stats.a_to_b, b_to_a = stats.b_to_a, "Relay finished");
    stats
}

enum Finished {
    AToB,
    BToA,
}

/// Let the surviving direction run until it finishes or goes `linger`
/// without moving a byte.
async fn drain<F>(linger: Duration, mut rest: F, moved: &AtomicU64, direction: &'static str)
where
    F: std::future::Future<Output = ()> + Unpin,
{
    loop {
        let before = moved.load(Ordering::Relaxed);
        tokio::select! {
            _ = &mut rest => return,
            _ = tokio::time::sleep(linger) => {
                if moved.load(Ordering::Relaxed) == before {
                    tracing::debug!(direction, "Relay direction abandoned after linger");
                    return;
                }
            }
        }
    }
}

async fn pump<R, W>(src: &mut R, dst: &mut W, moved: &AtomicU64, direction: &'static str)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_CHUNK];

    loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::trace!(direction, error = %e, "Relay read ended");
                break;
            }
        };
        if let Err(e) = dst.write_all(&buf[..n]).await {
            tracing::trace!(direction, error = %e, "Relay write ended");
            break;
        }
        moved.fetch_add(n as u64, Ordering::Relaxed);
    }

    let _ = dst.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn relays_both_directions_verbatim() {
        let (client, relay_a) = duplex(1024);
        let (relay_b, target) = duplex(1024);

        let handle = tokio::spawn(relay(relay_a, relay_b, DEFAULT_LINGER));

        let (mut client_r, mut client_w) = tokio::io::split(client);
        let (mut target_r, mut target_w) = tokio::io::split(target);

        client_w.write_all(b"\x16\x03\x01hello").await.unwrap();
        let mut got = [0u8; 8];
        target_r.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"\x16\x03\x01hello");

        target_w.write_all(b"world").await.unwrap();
        let mut back = [0u8; 5];
        client_r.read_exact(&mut back).await.unwrap();
        assert_eq!(&back, b"world");

        client_w.shutdown().await.unwrap();
        target_w.shutdown().await.unwrap();

        let stats = handle.await.unwrap();
        assert_eq!(stats, RelayStats { a_to_b: 8, b_to_a: 5 });
    }

    #[tokio::test]
    async fn closing_one_peer_ends_both_directions() {
        let (client, relay_a) = duplex(1024);
        let (relay_b, target) = duplex(1024);

        let handle = tokio::spawn(relay(relay_a, relay_b, Duration::from_millis(200)));

        // Target hangs up; the client stays open and silent.
        drop(target);

        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("relay must finish after one peer closes")
            .unwrap();
        assert_eq!(stats.b_to_a, 0);

        // The client observes EOF because the relay shut its side down.
        let mut client = client;
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn half_closed_tunnel_keeps_streaming_and_counts_every_byte() {
        let (client, relay_a) = duplex(4096);
        let (relay_b, target) = duplex(4096);

        let handle = tokio::spawn(relay(relay_a, relay_b, Duration::from_millis(200)));

        let (mut client_r, mut client_w) = tokio::io::split(client);
        let (mut target_r, mut target_w) = tokio::io::split(target);

        client_w.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        client_w.shutdown().await.unwrap();
        let mut request = Vec::new();
        target_r.read_to_end(&mut request).await.unwrap();
        assert_eq!(request.len(), 18);

        // Streams for well past one linger period, never idle for a whole one.
        let writer = tokio::spawn(async move {
            for _ in 0..10 {
                target_w.write_all(&[b'x'; 100]).await.unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            target_w.shutdown().await.unwrap();
        });

        let mut received = Vec::new();
        client_r.read_to_end(&mut received).await.unwrap();
        writer.await.unwrap();

        let stats = handle.await.unwrap();
        assert_eq!(received.len(), 1000);
        assert_eq!(stats, RelayStats { a_to_b: 18, b_to_a: 1000 });
    }

    #[tokio::test]
    async fn abandoned_direction_still_reports_its_bytes() {
        let (client, relay_a) = duplex(4096);
        let (relay_b, target) = duplex(4096);

        let handle = tokio::spawn(relay(relay_a, relay_b, Duration::from_millis(100)));

        let (mut client_r, mut client_w) = tokio::io::split(client);
        let (_target_r, mut target_w) = tokio::io::split(target);

        target_w.write_all(b"partial").await.unwrap();
        let mut got = [0u8; 7];
        client_r.read_exact(&mut got).await.unwrap();

        // Client finishes; the target stays open and goes quiet.
        client_w.shutdown().await.unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("stalled direction must be abandoned")
            .unwrap();
        assert_eq!(stats, RelayStats { a_to_b: 0, b_to_a: 7 });
    }
}
