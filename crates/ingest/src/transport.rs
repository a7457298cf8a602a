use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use eavlog_core::error::{EavlogError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame::RawFrame;
use crate::queue::IntakeQueue;
use crate::stats::{PipelineStats, should_log};

const READ_BUFFER: usize = 64 * 1024;

/// Accepts frame connections until cancelled. Every decoded frame is offered
/// to the intake queue; frames without a document are counted and skipped.
pub async fn serve_frames(listener: TcpListener, queue: IntakeQueue, cancel: CancellationToken) {
    let local = listener.local_addr().ok();
    info!(addr = ?local, "frame intake listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let queue = queue.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, queue, cancel).await {
                            debug!(peer = %peer, error = %e, "frame connection closed with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "frame intake accept error"),
            },
        }
    }
    info!("frame intake stopped");
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    queue: IntakeQueue,
    cancel: CancellationToken,
) -> Result<()> {
    let stats = Arc::clone(queue.stats());
    let mut buf = BytesMut::with_capacity(READ_BUFFER);

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = stream.read_buf(&mut buf) => read,
        };
        let n = read.map_err(|e| EavlogError::Io(format!("read from {peer} failed: {e}")))?;
        if n == 0 {
            if !buf.is_empty() {
                debug!(peer = %peer, trailing = buf.len(), "connection closed mid-frame");
            }
            return Ok(());
        }

        loop {
            let frame = match RawFrame::decode(&mut buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    PipelineStats::incr(&stats.frames_rejected);
                    warn!(peer = %peer, error = %e, "closing connection on malformed frame");
                    return Err(e);
                }
            };

            let parts = frame.parts().len();
            if !(1..=2).contains(&parts) {
                let rejected = PipelineStats::incr(&stats.frames_rejected);
                if should_log(rejected) {
                    warn!(peer = %peer, parts, rejected, "discarding frame with unexpected part count");
                }
                continue;
            }
            queue.enqueue(frame);
        }
    }
}

/// Writes frames to an intake listener.
pub struct FrameClient {
    stream: TcpStream,
    buf: BytesMut,
}

impl FrameClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| EavlogError::Io(format!("failed to connect to intake: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| EavlogError::Io(format!("failed to set nodelay: {e}")))?;
        Ok(Self {
            stream,
            buf: BytesMut::new(),
        })
    }

    pub async fn send(&mut self, frame: &RawFrame) -> Result<()> {
        self.buf.clear();
        frame.encode(&mut self.buf);
        self.stream
            .write_all(&self.buf)
            .await
            .map_err(|e| EavlogError::Io(format!("failed to send frame: {e}")))
    }

    pub async fn send_document(&mut self, document: &[u8]) -> Result<()> {
        self.send(&RawFrame::document(document.to_vec())).await
    }

    /// Flushes and half-closes the connection so the server sees EOF.
    pub async fn close(mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| EavlogError::Io(format!("failed to close intake connection: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use bytes::Bytes;
    use testkit::wait_until;

    use super::*;
    use crate::queue::bounded;

    async fn listen() -> (SocketAddr, IntakeQueue, crate::queue::IntakeReceiver, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (queue, rx) = bounded(16, Arc::new(PipelineStats::default()));
        let cancel = CancellationToken::new();
        tokio::spawn(serve_frames(listener, queue.clone(), cancel.clone()));
        (addr, queue, rx, cancel)
    }

    #[tokio::test]
    async fn frames_reach_the_queue() {
        let (addr, _queue, mut rx, cancel) = listen().await;
        let mut client = FrameClient::connect(addr).await.unwrap();
        client.send_document(b"{\"created\":1}").await.unwrap();
        client
            .send(&RawFrame::with_topic(&b"app.INFO"[..], &b"{\"created\":2}"[..]))
            .await
            .unwrap();
        client.close().await.unwrap();

        let first = rx.dequeue().await.unwrap();
        assert_eq!(first.into_document().unwrap(), Bytes::from_static(b"{\"created\":1}"));
        let second = rx.dequeue().await.unwrap();
        assert_eq!(second.parts()[0], Bytes::from_static(b"app.INFO"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn wrong_part_count_is_rejected_at_the_boundary() {
        let (addr, queue, mut rx, cancel) = listen().await;
        let mut client = FrameClient::connect(addr).await.unwrap();
        let three = RawFrame::from_parts(vec![
            Bytes::from_static(b"a"),
            Bytes::from_static(b"b"),
            Bytes::from_static(b"c"),
        ]);
        client.send(&three).await.unwrap();
        client.send_document(b"{}").await.unwrap();

        let next = rx.dequeue().await.unwrap();
        assert_eq!(next.parts().len(), 1);
        assert_eq!(queue.stats().frames_rejected.load(Ordering::Relaxed), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn malformed_header_closes_the_connection() {
        let (addr, queue, _rx, cancel) = listen().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[0, 0, 0, 0]).await.unwrap();

        assert!(
            wait_until(Duration::from_secs(2), || {
                queue.stats().frames_rejected.load(Ordering::Relaxed) == 1
            })
            .await
        );
        let mut scratch = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut scratch))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
        cancel.cancel();
    }
}
