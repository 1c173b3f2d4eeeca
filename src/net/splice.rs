//! Raw byte splice between two streams.
//!
//! # Responsibilities
//! - Copy bytes client → backend and backend → client verbatim
//! - Propagate EOF as a write shutdown to the opposite peer
//! - Tear down both directions as soon as either one finishes
//!
//! # Design Decisions
//! - No framing: the bytes are opaque (WebSocket frames pass untouched)
//! - The two pumps are independent futures; the first to complete wins
//!   and the other is dropped, closing both sockets

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const BUF_SIZE: usize = 16 * 1024;

/// Which peer ended the splice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Backend,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Backend => "backend",
        }
    }
}

/// Outcome of a finished splice.
#[derive(Debug)]
pub struct SpliceReport {
    /// Bytes copied client → backend.
    pub client_to_backend: u64,
    /// Bytes copied backend → client.
    pub backend_to_client: u64,
    /// The peer whose read side finished first.
    pub closed_by: Side,
    /// `Err` when the splice ended with an I/O error instead of EOF.
    pub result: Result<(), SpliceError>,
}

/// An I/O error on one peer's socket.
#[derive(Debug, thiserror::Error)]
#[error("{} socket: {source}", .side.as_str())]
pub struct SpliceError {
    /// The peer whose socket failed, whichever direction was copying.
    pub side: Side,
    #[source]
    pub source: io::Error,
}

/// Which half of a pump failed.
enum PumpError {
    Read(io::Error),
    Write(io::Error),
}

impl PumpError {
    /// Attribute the failure to a peer, given the pump's reader and writer sides.
    fn attribute(self, reader: Side, writer: Side) -> SpliceError {
        match self {
            PumpError::Read(source) => SpliceError { side: reader, source },
            PumpError::Write(source) => SpliceError { side: writer, source },
        }
    }
}

/// Copy bytes between `client` and `backend` until either side closes.
pub async fn splice<C, B>(client: C, backend: B) -> SpliceReport
where
    C: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut backend_rd, mut backend_wr) = tokio::io::split(backend);

    let mut client_to_backend = 0u64;
    let mut backend_to_client = 0u64;

    let (closed_by, result) = {
        let upstream = pump(&mut client_rd, &mut backend_wr, &mut client_to_backend);
        let downstream = pump(&mut backend_rd, &mut client_wr, &mut backend_to_client);
        tokio::pin!(upstream, downstream);

        tokio::select! {
            res = &mut upstream => (
                Side::Client,
                res.map_err(|e| e.attribute(Side::Client, Side::Backend)),
            ),
            res = &mut downstream => (
                Side::Backend,
                res.map_err(|e| e.attribute(Side::Backend, Side::Client)),
            ),
        }
    };

    // A pump that failed returned before shutting its writer down.
    match closed_by {
        Side::Client => {
            let _ = backend_wr.shutdown().await;
        }
        Side::Backend => {
            let _ = client_wr.shutdown().await;
        }
    }

    SpliceReport {
        client_to_backend,
        backend_to_client,
        closed_by,
        result,
    }
}

/// Copy until EOF, then shut down the writer.
async fn pump<R, W>(reader: &mut R, writer: &mut W, total: &mut u64) -> Result<(), PumpError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await.map_err(PumpError::Read)?;
        if n == 0 {
            writer.shutdown().await.map_err(PumpError::Write)?;
            return Ok(());
        }
        writer.write_all(&buf[..n]).await.map_err(PumpError::Write)?;
        writer.flush().await.map_err(PumpError::Write)?;
        *total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, ReadBuf};

    /// Never yields data; every write fails with a broken pipe.
    struct DeadPeer;

    impl AsyncRead for DeadPeer {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for DeadPeer {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_failure_is_blamed_on_the_written_peer() {
        let (client, mut client_peer) = duplex(64);
        let task = tokio::spawn(splice(client, DeadPeer));

        client_peer.write_all(b"data").await.unwrap();

        let report = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("splice should end on write failure")
            .unwrap();
        // The client -> backend direction finished first, but the backend socket broke.
        assert_eq!(report.closed_by, Side::Client);
        let err = report.result.unwrap_err();
        assert_eq!(err.side, Side::Backend);
        assert_eq!(err.source.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn bytes_pass_verbatim_both_ways() {
        let (client, mut client_peer) = duplex(1024);
        let (backend, mut backend_peer) = duplex(1024);
        let task = tokio::spawn(splice(client, backend));

        // Includes bytes that look like a WebSocket frame header.
        let payload: Vec<u8> = (0..=255u8).chain([0x81, 0x85, 0x00, 0xff]).collect();
        client_peer.write_all(&payload).await.unwrap();
        let mut received = vec![0u8; payload.len()];
        backend_peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);

        backend_peer.write_all(b"pong").await.unwrap();
        let mut reply = [0u8; 4];
        client_peer.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"pong");

        drop(client_peer);
        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.client_to_backend, payload.len() as u64);
        assert_eq!(report.backend_to_client, 4);
        assert_eq!(report.closed_by, Side::Client);
        assert!(report.result.is_ok());
    }

    #[tokio::test]
    async fn client_close_closes_backend() {
        let (client, client_peer) = duplex(64);
        let (backend, mut backend_peer) = duplex(64);
        tokio::spawn(splice(client, backend));

        drop(client_peer);

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(1), backend_peer.read(&mut buf))
            .await
            .expect("backend not closed in time")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn backend_close_closes_client() {
        let (client, mut client_peer) = duplex(64);
        let (backend, backend_peer) = duplex(64);
        let task = tokio::spawn(splice(client, backend));

        drop(backend_peer);

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(1), client_peer.read(&mut buf))
            .await
            .expect("client not closed in time")
            .unwrap();
        assert_eq!(n, 0);

        let report = task.await.unwrap();
        assert_eq!(report.closed_by, Side::Backend);
    }

    #[tokio::test]
    async fn order_is_preserved_across_writes() {
        let (client, mut client_peer) = duplex(16);
        let (backend, mut backend_peer) = duplex(16);
        tokio::spawn(splice(client, backend));

        let writer = tokio::spawn(async move {
            for i in 0..100u8 {
                client_peer.write_all(&[i; 3]).await.unwrap();
            }
            client_peer
        });

        let mut received = vec![0u8; 300];
        backend_peer.read_exact(&mut received).await.unwrap();
        let expected: Vec<u8> = (0..100u8).flat_map(|i| [i; 3]).collect();
        assert_eq!(received, expected);
        let _ = writer.await.unwrap();
    }
}
