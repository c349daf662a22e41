//! Palisade - Asynchronous HTTP/1.1 Server
//!
//! Core library: connection lifecycle, routing, static file streaming
//! (chunked, byte-range and multipart/byteranges), idle-connection
//! sweeping, and upstream proxying with load balancing.

pub mod config;
pub mod error;
pub mod executor;
pub mod files;
pub mod http;
pub mod proxy;
pub mod router;
pub mod server;

pub use error::StartError;
pub use files::FileRespFormat;
pub use http::request::Method;
pub use http::response::{Response, StatusCode};
pub use proxy::LbPolicy;
pub use router::{Aspect, Handler};
pub use server::HttpServer;
