//! Server front.
//!
//! Owns the executor pool, the routing table, the live-connection registry
//! and the idle sweeper. `listen` binds the acceptor socket, `async_start`
//! spawns the accept loop, and `stop` tears everything down in order:
//! sweeper, acceptor, connections, pool.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{oneshot, watch};

use crate::config::TlsMaterials;
use crate::error::StartError;
use crate::executor::{Executor, ExecutorPool};
use crate::files::{self, FileRespFormat, StaticFileState};
use crate::http::connection::Connection;
use crate::http::request::Method;
use crate::proxy::{self, Channel, LbPolicy};
use crate::router::{Aspect, Handler, Router};

const ACCEPT_BACKLOG: u32 = 1024;

/// Resolves once the accept loop exits, or immediately when `listen`
/// failed. [`StartFuture::wait`] blocks the calling thread; do not call it
/// from an executor thread.
pub struct StartFuture {
    rx: oneshot::Receiver<Result<(), StartError>>,
}

impl std::future::Future for StartFuture {
    type Output = Result<(), StartError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(StartError::Io)))
    }
}

impl StartFuture {
    pub fn wait(self) -> Result<(), StartError> {
        self.rx.blocking_recv().unwrap_or(Err(StartError::Io))
    }
}

enum ExecutorSource {
    Pool(Arc<ExecutorPool>),
    External(Executor),
}

impl ExecutorSource {
    fn next(&self) -> Executor {
        match self {
            ExecutorSource::Pool(pool) => pool.get_executor(),
            ExecutorSource::External(executor) => executor.clone(),
        }
    }
}

/// The asynchronous HTTP/1.1 server.
///
/// Built either with an owned pool of worker executors
/// ([`HttpServer::new`]) or on a runtime the caller drives
/// ([`HttpServer::with_handle`]). Configuration setters must be called
/// before `async_start`/`sync_start`; `stop` is idempotent and must not be
/// called from an executor thread.
pub struct HttpServer {
    pool: Option<Arc<ExecutorPool>>,
    external: Mutex<Option<Executor>>,
    port: AtomicU16,
    no_delay: AtomicBool,
    router: Arc<Router>,
    connections: Arc<Mutex<HashMap<u64, Arc<Connection>>>>,
    check_duration: Mutex<Duration>,
    timeout_duration: Mutex<Duration>,
    need_check: AtomicBool,
    stop_timer: Arc<AtomicBool>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
    accept_stop: watch::Sender<bool>,
    acceptor_close_rx: Mutex<Option<oneshot::Receiver<()>>>,
    listener: Mutex<Option<TcpListener>>,
    shrink_to_fit: AtomicBool,
    tls: Mutex<Option<TlsMaterials>>,
    static_state: Arc<StaticFileState>,
    static_dir: Mutex<Option<PathBuf>>,
    stopped: AtomicBool,
}

impl HttpServer {
    /// Builds a server owning a pool of `thread_count` worker executors.
    pub fn new(thread_count: usize, port: u16, cpu_affinity: bool) -> anyhow::Result<Self> {
        let pool = ExecutorPool::new(thread_count, cpu_affinity)?;
        Ok(Self::build(Some(Arc::new(pool)), None, port))
    }

    /// Builds a server on an externally owned runtime. The caller keeps
    /// driving the runtime; `stop` only drops the server's handle to it.
    pub fn with_handle(handle: tokio::runtime::Handle, port: u16) -> Self {
        Self::build(None, Some(Executor::from_handle(handle)), port)
    }

    fn build(pool: Option<Arc<ExecutorPool>>, external: Option<Executor>, port: u16) -> Self {
        let (accept_stop, _) = watch::channel(false);
        Self {
            pool,
            external: Mutex::new(external),
            port: AtomicU16::new(port),
            no_delay: AtomicBool::new(true),
            router: Arc::new(Router::new()),
            connections: Arc::new(Mutex::new(HashMap::new())),
            check_duration: Mutex::new(Duration::from_secs(15)),
            timeout_duration: Mutex::new(Duration::ZERO),
            need_check: AtomicBool::new(false),
            stop_timer: Arc::new(AtomicBool::new(false)),
            sweeper: Mutex::new(None),
            accept_stop,
            acceptor_close_rx: Mutex::new(None),
            listener: Mutex::new(None),
            shrink_to_fit: AtomicBool::new(false),
            tls: Mutex::new(None),
            static_state: Arc::new(StaticFileState::new()),
            static_dir: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn set_no_delay(&self, no_delay: bool) {
        self.no_delay.store(no_delay, Ordering::Relaxed);
    }

    /// Ingests TLS credentials and enables the TLS toggle for accepted
    /// connections. The files must exist and be non-empty; the handshake
    /// itself is handled outside the core.
    pub fn init_ssl(&self, cert_file: &str, key_file: &str, passphrase: &str) -> anyhow::Result<()> {
        let cert = std::fs::read(cert_file)
            .with_context(|| format!("failed to read certificate {cert_file}"))?;
        let key = std::fs::read(key_file)
            .with_context(|| format!("failed to read private key {key_file}"))?;
        if cert.is_empty() || key.is_empty() {
            anyhow::bail!("TLS certificate or key file is empty");
        }
        *self.tls.lock().unwrap() = Some(TlsMaterials {
            cert_path: PathBuf::from(cert_file),
            key_path: PathBuf::from(key_file),
            passphrase: passphrase.to_string(),
        });
        Ok(())
    }

    /// Registers `handler` for `path` under `methods`.
    pub fn set_http_handler(&self, methods: &[Method], path: impl Into<String>, handler: Handler) {
        self.router.set_http_handler(methods, path, handler, Vec::new());
    }

    pub fn set_http_handler_with_aspects(
        &self,
        methods: &[Method],
        path: impl Into<String>,
        handler: Handler,
        aspects: Vec<Arc<dyn Aspect>>,
    ) {
        self.router.set_http_handler(methods, path, handler, aspects);
    }

    /// Registers a proxy route over `hosts`. An empty method list registers
    /// the full method set. Empty `hosts` is a configuration error.
    pub fn set_http_proxy_handler(
        &self,
        methods: &[Method],
        path: impl Into<String>,
        hosts: &[String],
        policy: LbPolicy,
        weights: &[u32],
    ) -> anyhow::Result<()> {
        let channel = Arc::new(Channel::new(hosts, policy, weights)?);
        let handler = proxy::proxy_handler(channel);
        let methods = if methods.is_empty() {
            Method::all()
        } else {
            methods.to_vec()
        };
        self.router.set_http_handler(&methods, path, handler, Vec::new());
        Ok(())
    }

    /// Walks `file_path` recursively and registers a GET route for every
    /// regular file at `/<uri_suffix>/<relative path>`. Root-absolute paths
    /// and paths containing `..` are rejected; the server must not start on
    /// a violation.
    pub fn set_static_res_dir(&self, uri_suffix: &str, file_path: &str) -> anyhow::Result<()> {
        files::validate_static_path(uri_suffix, file_path)?;

        let dir = if file_path.is_empty() {
            std::env::current_dir().context("failed to resolve current directory")?
        } else {
            PathBuf::from(file_path)
        };

        let entries = files::collect_files(&dir);
        tracing::info!(dir = %dir.display(), files = entries.len(), "registering static routes");

        for file in &entries {
            let Ok(relative) = file.strip_prefix(&dir) else {
                continue;
            };
            let uri = files::route_uri(uri_suffix, relative);
            let file_name = file.to_string_lossy().into_owned();
            let handler = files::static_file_handler(file_name, Arc::clone(&self.static_state));
            self.router
                .set_http_handler(&[Method::GET], uri, handler, Vec::new());
        }

        *self.static_dir.lock().unwrap() = Some(dir);
        Ok(())
    }

    /// Slurps every static file of size up to `max_size` bytes into the
    /// in-memory cache. Call after `set_static_res_dir`; the cache is
    /// frozen once populated and never invalidated on disk changes.
    pub fn set_max_size_of_cache_files(&self, max_size: u64) {
        let dir = self.static_dir.lock().unwrap().clone();
        let Some(dir) = dir else {
            tracing::warn!("no static directory configured, nothing to cache");
            return;
        };

        let mut cache = HashMap::new();
        for file in files::collect_files(&dir) {
            let Ok(meta) = std::fs::metadata(&file) else {
                continue;
            };
            if meta.len() > max_size {
                continue;
            }
            if let Ok(content) = std::fs::read(&file) {
                cache.insert(file.to_string_lossy().into_owned(), Arc::new(content));
            }
        }

        tracing::info!(files = cache.len(), "populated static file cache");
        self.static_state.populate_cache(cache);
    }

    pub fn set_file_resp_format_type(&self, format: FileRespFormat) {
        self.static_state.set_format(format);
    }

    pub fn set_transfer_chunked_size(&self, size: usize) {
        self.static_state.set_chunked_size(size);
    }

    /// Period of the idle sweep. Set before `set_timeout_duration`.
    pub fn set_check_duration(&self, duration: Duration) {
        *self.check_duration.lock().unwrap() = duration;
    }

    /// Enables the idle sweeper: connections with no read or write for
    /// longer than `duration` are closed on the next sweep. Zero leaves the
    /// sweeper disabled.
    pub fn set_timeout_duration(&self, duration: Duration) {
        if duration > Duration::ZERO {
            self.need_check.store(true, Ordering::Relaxed);
            *self.timeout_duration.lock().unwrap() = duration;
            self.start_check_timer();
        }
    }

    pub fn set_shrink_to_fit(&self, shrink: bool) {
        self.shrink_to_fit.store(shrink, Ordering::Relaxed);
    }

    /// The bound port. Meaningful after `listen` succeeded; with a
    /// configured port of zero this is the ephemeral port the kernel chose.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Binds the acceptor, spawns the accept loop, and returns a future
    /// that resolves when the accept loop exits (`Canceled` after `stop`)
    /// or immediately with the listen error.
    pub fn async_start(&self) -> StartFuture {
        let (tx, rx) = oneshot::channel();

        match self.listen() {
            Err(e) => {
                let _ = tx.send(Err(e));
            }
            Ok(()) => {
                let listener = self
                    .listener
                    .lock()
                    .unwrap()
                    .take()
                    .expect("listen() stored the acceptor");

                let (close_tx, close_rx) = oneshot::channel();
                *self.acceptor_close_rx.lock().unwrap() = Some(close_rx);

                let executors = match &self.pool {
                    Some(pool) => ExecutorSource::Pool(Arc::clone(pool)),
                    None => ExecutorSource::External(self.acceptor_executor()),
                };

                let ctx = AcceptContext {
                    listener,
                    router: Arc::clone(&self.router),
                    connections: Arc::clone(&self.connections),
                    executors,
                    stop_rx: self.accept_stop.subscribe(),
                    close_tx,
                    no_delay: self.no_delay.load(Ordering::Relaxed),
                    shrink_to_fit: self.shrink_to_fit.load(Ordering::Relaxed),
                    need_check: self.need_check.load(Ordering::Relaxed),
                    tls_enabled: self.tls.lock().unwrap().is_some(),
                };

                self.acceptor_executor().spawn(async move {
                    let result = accept_loop(ctx).await;
                    let _ = tx.send(result);
                });
            }
        }

        StartFuture { rx }
    }

    /// Starts the server and blocks until it stops. Must not be called
    /// from an executor thread.
    pub fn sync_start(&self) -> Result<(), StartError> {
        self.async_start().wait()
    }

    /// Stops the server: sweeper first, then the acceptor (waiting until
    /// the accept loop acknowledged), then every live connection, then the
    /// owned pool. Idempotent; must not be called from an executor thread.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("stopping server");

        self.stop_timer.store(true, Ordering::Relaxed);
        if let Some(sweeper) = self.sweeper.lock().unwrap().take() {
            sweeper.abort();
        }

        let _ = self.accept_stop.send(true);
        let close_rx = self.acceptor_close_rx.lock().unwrap().take();
        if let Some(rx) = close_rx {
            let _ = rx.blocking_recv();
        }

        {
            let mut connections = self.connections.lock().unwrap();
            for conn in connections.values() {
                conn.close(false);
            }
            connections.clear();
        }

        if let Some(pool) = &self.pool {
            pool.stop();
        }
        *self.external.lock().unwrap() = None;

        tracing::info!("server stopped");
    }

    /// Opens the IPv4 acceptor with `SO_REUSEADDR`, binds and listens, and
    /// reads back the local port. Any failure surfaces as `AddressInUse`.
    fn listen(&self) -> Result<(), StartError> {
        tracing::info!(port = self.port(), "begin to listen");

        let executor = self.acceptor_executor();
        let _guard = executor.handle().enter();

        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port()));

        let socket = match TcpSocket::new_v4() {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(error = %e, "failed to open acceptor socket");
                return Err(StartError::AddressInUse);
            }
        };

        if let Err(e) = socket.set_reuseaddr(true) {
            tracing::error!(error = %e, "failed to set SO_REUSEADDR");
            return Err(StartError::AddressInUse);
        }

        if let Err(e) = socket.bind(addr) {
            tracing::error!(port = self.port(), error = %e, "bind failed");
            return Err(StartError::AddressInUse);
        }

        let listener = match socket.listen(ACCEPT_BACKLOG) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(port = self.port(), error = %e, "listen failed");
                return Err(StartError::AddressInUse);
            }
        };

        let local = match listener.local_addr() {
            Ok(local) => local,
            Err(e) => {
                tracing::error!(port = self.port(), error = %e, "failed to read local endpoint");
                return Err(StartError::AddressInUse);
            }
        };
        self.port.store(local.port(), Ordering::Relaxed);

        *self.listener.lock().unwrap() = Some(listener);

        tracing::info!(port = self.port(), "listening");
        Ok(())
    }

    fn acceptor_executor(&self) -> Executor {
        if let Some(pool) = &self.pool {
            return pool.first_executor();
        }
        self.external
            .lock()
            .unwrap()
            .clone()
            .expect("server built without pool or external runtime")
    }

    fn start_check_timer(&self) {
        let check = (*self.check_duration.lock().unwrap()).max(Duration::from_millis(1));
        let timeout_duration = *self.timeout_duration.lock().unwrap();
        let registry = Arc::clone(&self.connections);
        let stop_timer = Arc::clone(&self.stop_timer);

        let handle = self.acceptor_executor().spawn(async move {
            let mut timer = tokio::time::interval(check);
            timer.tick().await; // first tick completes immediately

            loop {
                timer.tick().await;
                if stop_timer.load(Ordering::Relaxed) {
                    break;
                }

                let now = Instant::now();
                let mut connections = registry.lock().unwrap();
                connections.retain(|id, conn| {
                    if now.duration_since(conn.last_rwtime()) > timeout_duration {
                        tracing::debug!(id = *id, "closing idle connection");
                        conn.close(false);
                        false
                    } else {
                        true
                    }
                });
            }
        });

        *self.sweeper.lock().unwrap() = Some(handle);
    }
}

struct AcceptContext {
    listener: TcpListener,
    router: Arc<Router>,
    connections: Arc<Mutex<HashMap<u64, Arc<Connection>>>>,
    executors: ExecutorSource,
    stop_rx: watch::Receiver<bool>,
    close_tx: oneshot::Sender<()>,
    no_delay: bool,
    shrink_to_fit: bool,
    need_check: bool,
    tls_enabled: bool,
}

/// Accepts until told to stop. Transient accept errors are logged and the
/// loop continues; only the stop signal ends it, acknowledged through the
/// close waiter so `stop` can proceed.
async fn accept_loop(mut ctx: AcceptContext) -> Result<(), StartError> {
    let mut conn_id: u64 = 0;
    let mut close_tx = Some(ctx.close_tx);

    loop {
        let accepted = tokio::select! {
            res = ctx.listener.accept() => res,
            _ = ctx.stop_rx.wait_for(|stop| *stop) => {
                tracing::info!("acceptor shutting down");
                if let Some(tx) = close_tx.take() {
                    let _ = tx.send(());
                }
                return Err(StartError::Canceled);
            }
        };

        let (socket, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                tracing::info!(error = %e, "accept failed");
                continue;
            }
        };

        conn_id += 1;

        if ctx.no_delay {
            let _ = socket.set_nodelay(true);
        }

        let executor = ctx.executors.next();
        let conn = Arc::new(Connection::new(conn_id, socket, Arc::clone(&ctx.router)));

        if ctx.shrink_to_fit {
            conn.set_shrink_to_fit(true);
        }
        if ctx.need_check {
            conn.set_check_timeout(true);
        }
        if ctx.tls_enabled {
            conn.set_tls_enabled(true);
        }

        let registry = Arc::clone(&ctx.connections);
        conn.set_quit_callback(
            move |id| {
                let mut connections = registry.lock().unwrap();
                connections.remove(&id);
            },
            conn_id,
        );

        ctx.connections
            .lock()
            .unwrap()
            .insert(conn_id, Arc::clone(&conn));
        tracing::debug!(id = conn_id, peer = %peer, "new connection");

        executor.spawn(conn.start());
    }
}
