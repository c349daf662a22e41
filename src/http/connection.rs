use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::http::parser::{parse_http_request, ParseError};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer;
use crate::router::{Handler, Router};

type QuitCallback = Box<dyn Fn(u64) + Send + Sync>;

/// Handles a single HTTP client connection with support for keep-alive and
/// pipelining.
///
/// A `Connection` is shared behind an `Arc`: the per-connection task drives
/// [`Connection::start`], the server registry holds a handle for the idle
/// sweeper and shutdown, and handlers reach it through the response to
/// stream bodies directly. All request processing on one connection is
/// strictly sequential; responses go out in request order.
///
/// # Lifecycle
///
/// 1. **Read**: buffer socket data and parse incoming HTTP requests
/// 2. **Dispatch**: route the request and run the handler (may suspend)
/// 3. **Write**: serialize the response, unless the handler already wrote
///    it and marked the response delayed
/// 4. **Terminate**: on peer close, error, or [`Connection::close`]; the
///    quit callback fires exactly once so the registry can drop its handle
pub struct Connection {
    id: u64,
    reader: tokio::sync::Mutex<ConnectionReader>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    router: Arc<Router>,
    last_rw: Mutex<Instant>,
    close_tx: watch::Sender<bool>,
    check_timeout: AtomicBool,
    shrink_to_fit: AtomicBool,
    tls_enabled: AtomicBool,
    quit_callback: Mutex<Option<(QuitCallback, u64)>>,
}

struct ConnectionReader {
    half: OwnedReadHalf,
    buffer: Vec<u8>,
}

impl Connection {
    pub fn new(id: u64, stream: TcpStream, router: Arc<Router>) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (close_tx, _) = watch::channel(false);
        Self {
            id,
            reader: tokio::sync::Mutex::new(ConnectionReader {
                half: read_half,
                buffer: Vec::with_capacity(4096),
            }),
            writer: tokio::sync::Mutex::new(write_half),
            router,
            last_rw: Mutex::new(Instant::now()),
            close_tx,
            check_timeout: AtomicBool::new(false),
            shrink_to_fit: AtomicBool::new(false),
            tls_enabled: AtomicBool::new(false),
            quit_callback: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Runs the connection until the peer closes, an I/O or protocol error
    /// occurs, or [`Connection::close`] is called. Failures are logged; the
    /// task simply ends and the quit callback removes the registry entry.
    pub async fn start(self: Arc<Self>) {
        if self.tls_enabled.load(Ordering::Relaxed) {
            tracing::debug!(id = self.id, "connection accepted with TLS materials configured");
        }

        let mut closed_rx = self.close_tx.subscribe();

        loop {
            if self.closed() {
                break;
            }

            let read = tokio::select! {
                r = self.read_request() => r,
                _ = closed_rx.wait_for(|c| *c) => break,
            };

            let req = match read {
                Ok(Some(req)) => req,
                Ok(None) => {
                    tracing::debug!(id = self.id, "client closed connection");
                    break;
                }
                Err(e) => {
                    tracing::debug!(id = self.id, error = %e, "connection read failed");
                    break;
                }
            };

            let keep_alive = req.keep_alive();
            let method = req.method;
            let path = req.path.clone();
            let started = Instant::now();

            let resp = self.dispatch(req).await;

            tracing::info!(
                id = self.id,
                method = method.as_str(),
                path = %path,
                status = resp.status.as_u16(),
                duration_ms = started.elapsed().as_millis(),
                "request completed"
            );

            if !resp.delayed() && !self.reply(&resp).await {
                break;
            }

            if self.shrink_to_fit.load(Ordering::Relaxed) {
                self.reader.lock().await.buffer.shrink_to_fit();
            }

            if !keep_alive {
                break;
            }
        }

        self.terminate();
    }

    /// Closes the connection idempotently. Pending reads and writes are
    /// woken and resolve as failures; safe to call from any thread (the
    /// idle sweeper and server shutdown both use it).
    ///
    /// `from_timeout` marks a close initiated by the connection's own
    /// inactivity handling rather than by the server.
    pub fn close(&self, from_timeout: bool) {
        if self.close_tx.send_replace(true) {
            return;
        }
        if from_timeout {
            tracing::debug!(id = self.id, "connection closed after inactivity");
        } else {
            tracing::debug!(id = self.id, "connection closed");
        }
    }

    pub fn closed(&self) -> bool {
        *self.close_tx.borrow()
    }

    /// Writes all bytes to the socket. Returns false on error or close;
    /// true means the bytes were fully handed to the socket layer.
    pub async fn write_data(&self, data: &[u8]) -> bool {
        if self.closed() {
            return false;
        }
        let mut closed_rx = self.close_tx.subscribe();
        let mut half = self.writer.lock().await;
        let ok = tokio::select! {
            r = half.write_all(data) => r.is_ok(),
            _ = closed_rx.wait_for(|c| *c) => false,
        };
        if ok {
            self.touch();
        }
        ok
    }

    /// Scatter-gather write: the buffer list is flattened into one buffer
    /// and written with a single call, so a body block and its trailing
    /// marker go out together. Returns the number of bytes written.
    pub async fn async_write(&self, bufs: &[&[u8]]) -> std::io::Result<usize> {
        let total = bufs.iter().map(|b| b.len()).sum();
        let mut joined = Vec::with_capacity(total);
        for buf in bufs {
            joined.extend_from_slice(buf);
        }
        if self.write_data(&joined).await {
            Ok(total)
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection closed while writing",
            ))
        }
    }

    /// Emits the status line and headers of a chunked response.
    pub async fn begin_chunked(&self, resp: &Response) -> bool {
        self.write_data(&writer::serialize_chunked_head(resp)).await
    }

    /// Emits one chunk: size in hex, CRLF, payload, CRLF.
    pub async fn write_chunked(&self, data: &[u8]) -> bool {
        self.write_data(&writer::encode_chunk(data)).await
    }

    /// Emits the terminating zero-size chunk.
    pub async fn end_chunked(&self) -> bool {
        self.write_data(writer::CHUNKED_END).await
    }

    /// Serializes the accumulated response (status line, headers, body) and
    /// writes it out.
    pub async fn reply(&self, resp: &Response) -> bool {
        self.write_data(&writer::serialize_response(resp)).await
    }

    /// Monotonic timestamp of the last successful read or write, used by
    /// the idle sweeper.
    pub fn last_rwtime(&self) -> Instant {
        *self.last_rw.lock().unwrap()
    }

    /// Installs the callback invoked exactly once when the connection
    /// terminates. The server uses it to drop the registry entry.
    pub fn set_quit_callback(&self, callback: impl Fn(u64) + Send + Sync + 'static, id: u64) {
        *self.quit_callback.lock().unwrap() = Some((Box::new(callback), id));
    }

    pub fn set_check_timeout(&self, check: bool) {
        self.check_timeout.store(check, Ordering::Relaxed);
    }

    pub fn set_shrink_to_fit(&self, shrink: bool) {
        self.shrink_to_fit.store(shrink, Ordering::Relaxed);
    }

    pub fn set_tls_enabled(&self, enabled: bool) {
        self.tls_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Reads and parses one complete HTTP request.
    ///
    /// Buffers partial reads; pipelined bytes left over from a previous
    /// read are consumed before the socket is touched again.
    ///
    /// - `Ok(Some(request))` - a complete, valid request
    /// - `Ok(None)` - the peer closed before sending (more of) a request
    /// - `Err(e)` - an I/O error occurred or the HTTP is malformed
    async fn read_request(&self) -> anyhow::Result<Option<Request>> {
        let mut reader = self.reader.lock().await;
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&reader.buffer) {
                Ok((request, consumed)) => {
                    reader.buffer.drain(..consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data, fall through to read
                }

                Err(e) => {
                    return Err(anyhow::anyhow!("HTTP parse error: {:?}", e));
                }
            }

            let mut temp = [0u8; 1024];
            let n = reader.half.read(&mut temp).await?;

            if n == 0 {
                if reader.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(anyhow::anyhow!("connection closed mid-request"));
            }

            reader.buffer.extend_from_slice(&temp[..n]);
            self.touch();
        }
    }

    /// Routes the request and runs its handler plus aspects. Unmatched
    /// paths get a plain 404.
    async fn dispatch(self: &Arc<Self>, mut req: Request) -> Response {
        let mut resp = Response::with_conn(Arc::clone(self));

        let Some(route) = self.router.route(req.method, &req.path) else {
            resp.set_status_and_content(StatusCode::NotFound, b"404 Not Found".to_vec());
            return resp;
        };

        for aspect in &route.aspects {
            if !aspect.before(&mut req, &mut resp) {
                return resp;
            }
        }

        match &route.handler {
            Handler::Sync(f) => f(&req, &mut resp),
            Handler::Async(f) => {
                resp = f(req, resp).await;
            }
        }

        for aspect in route.aspects.iter().rev() {
            aspect.after(&mut resp);
        }

        resp
    }

    fn touch(&self) {
        if self.check_timeout.load(Ordering::Relaxed) {
            *self.last_rw.lock().unwrap() = Instant::now();
        }
    }

    fn terminate(&self) {
        let _ = self.close_tx.send_replace(true);
        let callback = self.quit_callback.lock().unwrap().take();
        if let Some((callback, id)) = callback {
            callback(id);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.closed())
            .finish()
    }
}
