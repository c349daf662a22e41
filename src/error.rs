use thiserror::Error;

/// Terminal codes surfaced by `async_start` and `sync_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    /// Binding or listening on the configured port failed.
    #[error("address in use")]
    AddressInUse,
    /// The accept task failed abnormally.
    #[error("i/o error")]
    Io,
    /// The server was stopped; the accept loop exited cleanly.
    #[error("operation canceled")]
    Canceled,
}
