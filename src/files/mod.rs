//! Static file responses.
//!
//! Every regular file under the configured static directory gets a GET
//! route. A request is answered from the in-memory cache when possible,
//! otherwise streamed from disk as either an HTTP/1.1 chunked body, a
//! single `Content-Range` part, or a `multipart/byteranges` body,
//! depending on the configured format mode and the request's `Range`
//! header.

pub mod range;

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::http::connection::Connection;
use crate::http::mime;
use crate::http::request::Request;
use crate::http::response::{FormatType, Response, StatusCode};
use crate::router::Handler;
use range::parse_ranges;

/// Fixed multipart boundary token.
pub const BOUNDARY: &str = "PalisadeFrame4a2c9d1e";
/// Trailer after the final part. Its length is `BOUNDARY.len() + 6`: the
/// separating CRLF is accounted to the final part, the closing
/// `--BOUNDARY--` contributes `BOUNDARY.len() + 4`.
const MULTIPART_END: &str = "\r\n--PalisadeFrame4a2c9d1e--";

/// Default streaming block size: 10 KiB.
pub const DEFAULT_CHUNKED_SIZE: usize = 10 * 1024;
/// Default per-file cap for the startup cache: 3 MiB.
pub const DEFAULT_CACHE_FILE_SIZE: u64 = 3 * 1024 * 1024;

/// How bodies without a `Range` header are framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRespFormat {
    /// Transfer-Encoding: chunked streaming.
    Chunked,
    /// Plain body with Content-Length, streamed in blocks.
    Range,
}

/// Shared static-file configuration read by the per-file handlers.
///
/// The cache is populated once during configuration and frozen; request
/// paths read it without locking.
pub struct StaticFileState {
    chunked_size: AtomicUsize,
    format: Mutex<FileRespFormat>,
    cache: OnceLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl StaticFileState {
    pub fn new() -> Self {
        Self {
            chunked_size: AtomicUsize::new(DEFAULT_CHUNKED_SIZE),
            format: Mutex::new(FileRespFormat::Chunked),
            cache: OnceLock::new(),
        }
    }

    pub fn set_chunked_size(&self, size: usize) {
        self.chunked_size.store(size.max(1), Ordering::Relaxed);
    }

    pub fn chunked_size(&self) -> usize {
        self.chunked_size.load(Ordering::Relaxed)
    }

    pub fn set_format(&self, format: FileRespFormat) {
        *self.format.lock().unwrap() = format;
    }

    pub fn format(&self) -> FileRespFormat {
        *self.format.lock().unwrap()
    }

    /// Freezes the populated cache. A second population attempt is ignored.
    pub fn populate_cache(&self, cache: HashMap<String, Arc<Vec<u8>>>) {
        if self.cache.set(cache).is_err() {
            tracing::warn!("static file cache already populated, ignoring");
        }
    }

    pub fn cached(&self, file_name: &str) -> Option<Arc<Vec<u8>>> {
        self.cache.get()?.get(file_name).cloned()
    }
}

impl Default for StaticFileState {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects root-absolute paths and paths containing `..` before any route
/// is registered. The server must not start on a violation.
pub fn validate_static_path(uri_suffix: &str, file_path: &str) -> anyhow::Result<()> {
    let has_double_dot = file_path.contains("..") || uri_suffix.contains("..");
    if Path::new(file_path).has_root() || Path::new(uri_suffix).has_root() || has_double_dot {
        anyhow::bail!("invalid static resource path: {}", file_path);
    }
    Ok(())
}

/// Recursively collects every regular file under `dir`.
pub fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(collect_files(&path));
        } else if path.is_file() {
            files.push(path);
        }
    }
    files
}

/// Builds the route URI for a file relative to the static directory.
/// Backslashes are translated to forward slashes in the URI only; the
/// on-disk path keeps its native form.
pub fn route_uri(uri_suffix: &str, relative: &Path) -> String {
    let rel = relative.to_string_lossy().replace('\\', "/");
    if uri_suffix.is_empty() {
        format!("/{rel}")
    } else {
        format!("/{}/{rel}", uri_suffix.trim_matches('/'))
    }
}

/// Builds the GET handler serving one static file.
pub fn static_file_handler(file_name: String, state: Arc<StaticFileState>) -> Handler {
    Handler::Async(Box::new(move |req, resp| {
        let file_name = file_name.clone();
        let state = Arc::clone(&state);
        Box::pin(serve_file(file_name, state, req, resp))
    }))
}

async fn serve_file(
    file_name: String,
    state: Arc<StaticFileState>,
    req: Request,
    mut resp: Response,
) -> Response {
    let Some(conn) = resp.conn() else {
        resp.set_status(StatusCode::InternalServerError);
        return resp;
    };

    let mime = mime::mime_type(mime::extension_of(&file_name));
    let range_header = req.header("Range").unwrap_or("").to_string();
    let chunked_size = state.chunked_size();

    // Cache fast path: header and body go out in one gathered write.
    if range_header.is_empty() {
        if let Some(body) = state.cached(&file_name) {
            let head = build_range_header(mime, &file_name, body.len() as u64, 200, "");
            resp.set_delay(true);
            let _ = conn.async_write(&[head.as_bytes(), body.as_slice()]).await;
            return resp;
        }
    }

    let mut file = match tokio::fs::File::open(&file_name).await {
        Ok(file) => file,
        Err(_) => {
            resp.set_status_and_content(
                StatusCode::NotFound,
                format!("{file_name}not found").into_bytes(),
            );
            return resp;
        }
    };

    let file_size = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(_) => {
            resp.set_status_and_content(
                StatusCode::NotFound,
                format!("{file_name}not found").into_bytes(),
            );
            return resp;
        }
    };

    if state.format() == FileRespFormat::Chunked && range_header.is_empty() {
        resp.set_format_type(FormatType::Chunked);
        resp.set_delay(true);
        if !conn.begin_chunked(&resp).await {
            return resp;
        }

        let mut buf = vec![0u8; chunked_size];
        loop {
            let n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(_) => {
                    resp.set_status(StatusCode::NoContent);
                    conn.reply(&resp).await;
                    return resp;
                }
            };
            if n == 0 {
                let _ = conn.end_chunked().await;
                return resp;
            }
            if !conn.write_chunked(&buf[..n]).await {
                return resp;
            }
        }
    }

    if let Some(eq_pos) = range_header.find('=') {
        let spec = &range_header[eq_pos + 1..];
        let Some(ranges) = parse_ranges(spec, file_size) else {
            resp.set_status(StatusCode::RangeNotSatisfiable);
            return resp;
        };

        if ranges.len() == 1 {
            let (start, end) = ranges[0];
            if file.seek(SeekFrom::Start(start)).await.is_err() {
                resp.set_status(StatusCode::NoContent);
                conn.reply(&resp).await;
                resp.set_delay(true);
                return resp;
            }
            let part_size = end + 1 - start;
            let status = if part_size == file_size { 200 } else { 206 };
            let content_range = format!("Content-Range: bytes {start}-{end}/{file_size}\r\n");
            let head = build_range_header(mime, &file_name, part_size, status, &content_range);
            resp.set_delay(true);
            if !conn.write_data(head.as_bytes()).await {
                return resp;
            }
            send_single_part(&mut file, &conn, &mut resp, part_size, chunked_size, "").await;
            return resp;
        }

        // Multipart ranges
        resp.set_delay(true);
        let (part_heads, content_len) = build_part_heads(&ranges, mime, file_size);
        let head = build_multiple_range_header(content_len);
        if !conn.write_data(head.as_bytes()).await {
            return resp;
        }

        for (i, (start, end)) in ranges.iter().enumerate() {
            if !conn.write_data(part_heads[i].as_bytes()).await {
                return resp;
            }
            if file.seek(SeekFrom::Start(*start)).await.is_err() {
                resp.set_status(StatusCode::NoContent);
                conn.reply(&resp).await;
                return resp;
            }
            let part_size = end + 1 - start;
            let trailer = if i + 1 == ranges.len() {
                MULTIPART_END
            } else {
                "\r\n"
            };
            if !send_single_part(&mut file, &conn, &mut resp, part_size, chunked_size, trailer)
                .await
            {
                return resp;
            }
        }
        return resp;
    }

    // No Range header, plain Content-Length body streamed in blocks.
    let head = build_range_header(mime, &file_name, file_size, 200, "");
    resp.set_delay(true);
    if !conn.write_data(head.as_bytes()).await {
        return resp;
    }

    let mut buf = vec![0u8; chunked_size];
    loop {
        let n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(_) => {
                resp.set_status(StatusCode::NoContent);
                conn.reply(&resp).await;
                return resp;
            }
        };
        if n == 0 {
            return resp;
        }
        if !conn.write_data(&buf[..n]).await {
            return resp;
        }
    }
}

/// Streams one byte range. The trailer, when given, is gathered into the
/// same write as the final body block. Returns false when the response is
/// finished early (write failure or read error).
async fn send_single_part(
    file: &mut tokio::fs::File,
    conn: &Arc<Connection>,
    resp: &mut Response,
    mut part_size: u64,
    chunked_size: usize,
    trailer: &str,
) -> bool {
    let mut buf = vec![0u8; chunked_size];

    while part_size > 0 {
        let read_size = part_size.min(chunked_size as u64) as usize;
        let n = match file.read(&mut buf[..read_size]).await {
            Ok(0) | Err(_) => {
                resp.set_status(StatusCode::NoContent);
                conn.reply(resp).await;
                return false;
            }
            Ok(n) => n,
        };

        part_size -= n as u64;

        let done = part_size == 0;
        if done && !trailer.is_empty() {
            if conn.async_write(&[&buf[..n], trailer.as_bytes()]).await.is_err() {
                return false;
            }
        } else if !conn.write_data(&buf[..n]).await {
            return false;
        }
    }

    true
}

/// Response head for whole-file and single-range replies. The reason
/// phrase is the literal `OK` for every status on this path.
pub fn build_range_header(
    mime: &str,
    file_name: &str,
    content_length: u64,
    status: u16,
    content_range: &str,
) -> String {
    let mut head = format!(
        "HTTP/1.1 {status} OK\r\nAccess-Control-Allow-origin: *\r\nAccept-Ranges: bytes\r\n"
    );
    head.push_str(content_range);
    head.push_str(&format!(
        "Content-Disposition: attachment;filename={file_name}\r\nConnection: keep-alive\r\nContent-Type: {mime}\r\nContent-Length: {content_length}\r\n\r\n"
    ));
    head
}

/// Response head for a multipart/byteranges reply.
pub fn build_multiple_range_header(content_len: usize) -> String {
    format!(
        "HTTP/1.1 206 Partial Content\r\nContent-Length: {content_len}\r\nContent-Type: multipart/byteranges; boundary={BOUNDARY}\r\n\r\n"
    )
}

/// Per-part heads plus the exact body length of the multipart response:
/// the sum of part heads, part bytes and separators, and the closing
/// boundary.
pub fn build_part_heads(
    ranges: &[(u64, u64)],
    mime: &str,
    file_size: u64,
) -> (Vec<String>, usize) {
    let mut heads = Vec::with_capacity(ranges.len());
    let mut content_len = 0usize;

    for (start, end) in ranges {
        let head = format!(
            "--{BOUNDARY}\r\nContent-Type: {mime}\r\nContent-Range: bytes {start}-{end}/{file_size}\r\n\r\n"
        );
        content_len += head.len() + (end + 1 - start) as usize + 2;
        heads.push(head);
    }

    content_len += BOUNDARY.len() + 4;
    (heads, content_len)
}
