//! Worker executors.
//!
//! An [`ExecutorPool`] owns a fixed set of OS threads, each driving its own
//! single-threaded tokio runtime and reactor. Connections are pinned to the
//! executor they were accepted onto: all of their I/O and handler code runs
//! on that worker. Callers that already own a runtime construct the server
//! with a plain [`Executor`] wrapper instead and keep driving the runtime
//! themselves.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Context;

/// A handle to one worker runtime. Cloning is cheap; all clones spawn onto
/// the same worker.
#[derive(Clone)]
pub struct Executor {
    handle: tokio::runtime::Handle,
}

impl Executor {
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }
}

/// A fixed pool of single-threaded worker runtimes.
pub struct ExecutorPool {
    executors: Vec<Executor>,
    shutdowns: Mutex<Vec<tokio::sync::oneshot::Sender<()>>>,
    threads: Mutex<Vec<std::thread::JoinHandle<()>>>,
    next: AtomicUsize,
}

impl ExecutorPool {
    /// Spawns `thread_count` worker threads, each building and driving a
    /// current-thread runtime. `cpu_affinity` is recorded for deployments
    /// that pin workers externally; the pool itself does not pin.
    pub fn new(thread_count: usize, cpu_affinity: bool) -> anyhow::Result<Self> {
        let thread_count = thread_count.max(1);
        tracing::debug!(thread_count, cpu_affinity, "starting executor pool");

        let mut executors = Vec::with_capacity(thread_count);
        let mut shutdowns = Vec::with_capacity(thread_count);
        let mut threads = Vec::with_capacity(thread_count);

        for i in 0..thread_count {
            let (handle_tx, handle_rx) = std::sync::mpsc::channel();
            let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

            let thread = std::thread::Builder::new()
                .name(format!("palisade-worker-{i}"))
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(rt) => rt,
                        Err(e) => {
                            let _ = handle_tx.send(Err(e));
                            return;
                        }
                    };

                    let _ = handle_tx.send(Ok(runtime.handle().clone()));

                    // Drives the reactor and every task spawned onto this
                    // worker until the pool shuts down.
                    runtime.block_on(async {
                        let _ = stop_rx.await;
                    });
                })
                .context("failed to spawn worker thread")?;

            let handle = handle_rx
                .recv()
                .context("worker thread exited before handing back its runtime")?
                .context("failed to build worker runtime")?;

            executors.push(Executor::from_handle(handle));
            shutdowns.push(stop_tx);
            threads.push(thread);
        }

        Ok(Self {
            executors,
            shutdowns: Mutex::new(shutdowns),
            threads: Mutex::new(threads),
            next: AtomicUsize::new(0),
        })
    }

    /// Returns one worker executor, selected round-robin.
    pub fn get_executor(&self) -> Executor {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.executors.len();
        self.executors[idx].clone()
    }

    /// The executor the acceptor and timers run on.
    pub fn first_executor(&self) -> Executor {
        self.executors[0].clone()
    }

    pub fn size(&self) -> usize {
        self.executors.len()
    }

    /// Blocks until every worker thread exits (i.e. until `stop` is called
    /// from elsewhere). Idempotent.
    pub fn run(&self) {
        let threads = std::mem::take(&mut *self.threads.lock().unwrap());
        for thread in threads {
            let _ = thread.join();
        }
    }

    /// Signals every worker to shut down and joins any threads `run` has
    /// not already consumed. Idempotent.
    pub fn stop(&self) {
        let shutdowns = std::mem::take(&mut *self.shutdowns.lock().unwrap());
        for stop_tx in shutdowns {
            let _ = stop_tx.send(());
        }
        self.run();
    }
}

impl Drop for ExecutorPool {
    fn drop(&mut self) {
        self.stop();
    }
}
