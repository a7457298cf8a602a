use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Liveness responder: every connection gets `ok\n` and is closed. It shares
/// nothing with the pipeline, so a backlog never delays the answer.
pub async fn serve_health(listener: TcpListener, cancel: CancellationToken) {
    info!(addr = ?listener.local_addr().ok(), "health probe listening");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((mut stream, peer)) => {
                    tokio::spawn(async move {
                        if let Err(e) = stream.write_all(b"ok\n").await {
                            debug!(peer = %peer, error = %e, "health reply failed");
                        }
                        let _ = stream.shutdown().await;
                    });
                }
                Err(e) => warn!(error = %e, "health accept error"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    use super::*;

    #[tokio::test]
    async fn answers_ok_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve_health(listener, cancel.clone()));

        for _ in 0..2 {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await.unwrap();
            assert_eq!(reply, "ok\n");
        }

        cancel.cancel();
        task.await.unwrap();
    }
}
