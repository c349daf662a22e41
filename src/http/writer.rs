use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Terminating zero-size chunk for Transfer-Encoding: chunked bodies.
pub const CHUNKED_END: &[u8] = b"0\r\n\r\n";

/// Serializes a full response: status line, headers, separator, body.
/// A Content-Length header is added if the handler did not set one.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::new();

    write_status_line(&mut buf, resp);

    for (k, v) in &resp.headers {
        write_header(&mut buf, k, v);
    }

    if !resp.headers.contains_key("Content-Length") {
        write_header(&mut buf, "Content-Length", &resp.body.len().to_string());
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf.extend_from_slice(&resp.body);

    buf
}

/// Serializes the head of a chunked response: status line, headers and a
/// `Transfer-Encoding: chunked` header, without any body bytes.
pub fn serialize_chunked_head(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::new();

    write_status_line(&mut buf, resp);

    for (k, v) in &resp.headers {
        if k.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        write_header(&mut buf, k, v);
    }

    write_header(&mut buf, "Transfer-Encoding", "chunked");
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Frames one chunk: hex size line, payload, trailing CRLF.
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 16);
    buf.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
    buf
}

fn write_status_line(buf: &mut Vec<u8>, resp: &Response) {
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());
}

fn write_header(buf: &mut Vec<u8>, key: &str, value: &str) {
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}
