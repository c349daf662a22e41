//! HTTP protocol implementation.
//!
//! Implements the HTTP/1.1 side of the server: request parsing, response
//! serialization, and the per-connection request loop.
//!
//! # Architecture
//!
//! - **`connection`**: the per-socket handler driving read, dispatch, write
//! - **`parser`**: parses incoming HTTP requests from byte buffers
//! - **`request`**: HTTP request representation and method set
//! - **`response`**: HTTP response with builder, delay and framing flags
//! - **`writer`**: response serialization and chunked framing
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection lifecycle
//!
//! ```text
//!        ┌─────────────┐
//!        │    Read     │ ← Buffer socket data, parse one request
//!        └──────┬──────┘
//!               │ Request parsed
//!               ▼
//!        ┌──────────────────┐
//!        │    Dispatch      │ ← Route + run handler (may suspend on I/O)
//!        └──────┬───────────┘
//!               │ Handler returned
//!               ▼
//!        ┌──────────────────┐
//!        │     Write        │ ← Serialize response unless marked delayed
//!        └──────┬───────────┘
//!               │
//!               ├─ Keep-Alive → Read (same connection, next request)
//!               └─ Close / error / close() → terminate, quit callback
//! ```
//!
//! Each connection runs as one task pinned to the executor it was accepted
//! onto; the registry and the idle sweeper share the connection handle.

pub mod request;
pub mod response;
pub mod parser;
pub mod connection;
pub mod writer;
pub mod mime;
