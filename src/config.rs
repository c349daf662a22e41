use std::path::PathBuf;

/// TLS credentials ingested by `init_ssl`. The handshake itself is handled
/// outside the core; the server only validates and carries the materials.
#[derive(Debug, Clone)]
pub struct TlsMaterials {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub passphrase: String,
}

/// Environment-driven settings for the binary front-end.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub threads: usize,
    pub static_dir: Option<String>,
    pub static_prefix: String,
}

impl Config {
    pub fn load() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let threads = std::env::var("THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4);
        let static_dir = std::env::var("STATIC_DIR").ok();
        let static_prefix = std::env::var("STATIC_PREFIX").unwrap_or_default();
        Self {
            port,
            threads,
            static_dir,
            static_prefix,
        }
    }
}
