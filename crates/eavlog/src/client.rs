use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::protocol::{ApiRequest, ApiResponse};

pub const DEFAULT_QUERY_ADDR: &str = "127.0.0.1:56121";

pub struct QueryClient {
    stream: BufReader<TcpStream>,
}

impl QueryClient {
    pub async fn connect(addr: Option<String>) -> anyhow::Result<Self> {
        let addr = addr
            .or_else(|| std::env::var("EAVLOG_QUERY_ADDR").ok())
            .unwrap_or_else(|| DEFAULT_QUERY_ADDR.to_string());
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("connect query server TCP {addr}"))?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    pub async fn request(&mut self, req: ApiRequest) -> anyhow::Result<ApiResponse> {
        let payload = serde_json::to_vec(&req)?;
        self.stream.get_mut().write_all(&payload).await?;
        self.stream.get_mut().write_all(b"\n").await?;
        self.stream.get_mut().flush().await?;

        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await?;
        if n == 0 {
            anyhow::bail!("query server closed the connection without answering");
        }
        serde_json::from_str(&line).context("decode query response")
    }
}
