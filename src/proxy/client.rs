//! Upstream HTTP client.
//!
//! One client per upstream host. Forwards a request over a fresh TCP
//! connection and reads the response back; connections are not pooled
//! across requests.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::http::request::Method;

/// Default buffer size for streaming
const BUFFER_SIZE: usize = 8192;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A response read back from an upstream host.
#[derive(Debug)]
pub struct ClientResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// An HTTP client bound to a single upstream host URL.
pub struct HttpClient {
    host: String,
    addr: String,
    base_path: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl HttpClient {
    /// Parses the host URL eagerly so a bad upstream is a configuration
    /// error, not a per-request one.
    pub fn new(host: &str) -> Result<Self> {
        let url = url::Url::parse(host).context("invalid upstream URL")?;
        let hostname = url.host_str().context("upstream URL missing host")?;
        let port = url.port().unwrap_or(match url.scheme() {
            "https" => 443,
            _ => 80,
        });

        Ok(Self {
            host: host.to_string(),
            addr: format!("{}:{}", hostname, port),
            base_path: url.path().to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// The URL this client was created from.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The path component of the upstream URL.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Sends one request to the upstream and reads the response.
    pub async fn async_request(
        &self,
        path: &str,
        method: Method,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<ClientResponse> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .context("connection timeout")?
            .context("failed to connect to upstream")?;

        tracing::trace!(upstream = %self.host, "connected to upstream");

        timeout(
            self.request_timeout,
            self.send_and_receive(stream, path, method, body, headers),
        )
        .await
        .context("request timeout")?
    }

    async fn send_and_receive(
        &self,
        mut stream: TcpStream,
        path: &str,
        method: Method,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<ClientResponse> {
        let request_bytes = self.build_request(path, method, body, headers);
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        tracing::trace!(upstream = %self.host, "request sent to upstream");

        self.read_response(&mut stream).await
    }

    /// Serializes the outgoing request. Hop-by-hop headers are dropped and
    /// the upstream always sees `Connection: close`.
    ///
    /// Note: public for integration testing purposes.
    pub fn build_request(
        &self,
        path: &str,
        method: Method,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Vec<u8> {
        let mut buffer = Vec::new();

        let path = if path.is_empty() { "/" } else { path };
        buffer.extend_from_slice(format!("{} {} HTTP/1.1\r\n", method.as_str(), path).as_bytes());

        let mut headers = headers.clone();

        headers.insert("Host".to_string(), self.addr.clone());

        // Remove hop-by-hop headers
        headers.remove("Connection");
        headers.remove("Keep-Alive");
        headers.remove("Proxy-Connection");
        headers.remove("Transfer-Encoding");
        headers.remove("Upgrade");

        headers.insert("Connection".to_string(), "close".to_string());

        if !body.is_empty() {
            headers.insert("Content-Length".to_string(), body.len().to_string());
        }

        for (key, value) in &headers {
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        buffer.extend_from_slice(b"\r\n");

        if !body.is_empty() {
            buffer.extend_from_slice(body);
        }

        buffer
    }

    /// Reads the upstream response: status line and headers, then a body
    /// sized by Content-Length or read to EOF.
    async fn read_response(&self, stream: &mut TcpStream) -> Result<ClientResponse> {
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

        loop {
            let n = stream.read_buf(&mut buffer).await?;

            if n == 0 {
                anyhow::bail!("connection closed before complete response received");
            }

            if let Some(headers_end) = buffer
                .windows(4)
                .position(|window| window == b"\r\n\r\n")
            {
                let headers_bytes = buffer.split_to(headers_end + 4);
                let (status, headers) = parse_response_head(&headers_bytes)?;

                let body = self.read_body(stream, &mut buffer, &headers).await?;

                return Ok(ClientResponse {
                    status,
                    headers,
                    body,
                });
            }

            // Prevent unbounded header growth
            if buffer.len() > 64 * 1024 {
                anyhow::bail!("response headers too large");
            }
        }
    }

    async fn read_body(
        &self,
        stream: &mut TcpStream,
        buffer: &mut BytesMut,
        headers: &HashMap<String, String>,
    ) -> Result<Vec<u8>> {
        let content_length = if let Some(len) = headers.get("Content-Length") {
            len.parse::<usize>().unwrap_or(0)
        } else {
            // No Content-Length, read until the upstream closes
            let mut body = buffer.split().to_vec();
            loop {
                let n = stream.read_buf(buffer).await?;
                if n == 0 {
                    break;
                }
                body.extend_from_slice(&buffer[..n]);
                buffer.clear();
            }
            return Ok(body);
        };

        if content_length == 0 {
            return Ok(Vec::new());
        }

        let mut body = Vec::with_capacity(content_length);

        let from_buffer = buffer.len().min(content_length);
        body.extend_from_slice(&buffer[..from_buffer]);
        buffer.advance(from_buffer);

        while body.len() < content_length {
            let remaining = content_length - body.len();
            let to_read = remaining.min(BUFFER_SIZE);

            let mut chunk = vec![0u8; to_read];
            let n = stream.read(&mut chunk).await?;

            if n == 0 {
                anyhow::bail!("connection closed before complete body received");
            }

            body.extend_from_slice(&chunk[..n]);
        }

        Ok(body)
    }
}

fn parse_response_head(head: &[u8]) -> Result<(u16, HashMap<String, String>)> {
    let head = std::str::from_utf8(head).context("invalid UTF-8 in response headers")?;

    let mut lines = head.lines();

    let status_line = lines.next().context("empty response")?;
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();

    if parts.len() < 2 {
        anyhow::bail!("invalid status line: {}", status_line);
    }

    let status: u16 = parts[1].parse().context("invalid status code")?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    Ok((status, headers))
}
