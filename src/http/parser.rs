use crate::http::request::{Method, Request};
use std::collections::HashMap;

/// Errors that can occur during HTTP request parsing.
#[derive(Debug)]
pub enum ParseError {
    /// The request line or headers are malformed
    InvalidRequest,
    /// The HTTP method is not recognized
    InvalidMethod,
    /// A header line is malformed
    InvalidHeader,
    /// Content-Length header value is not a valid number
    InvalidContentLength,
    /// The request is incomplete and more data is needed
    Incomplete,
}

/// Parses one HTTP request from the front of `buf`.
///
/// The head must be complete (terminated by an empty line) and the body,
/// sized by Content-Length, fully buffered; otherwise `Incomplete` is
/// returned and the caller reads more. On success the consumed byte count
/// covers head and body exactly, so the caller can drain it and leave any
/// pipelined follow-up request at the front of the buffer.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let head_end = find_head_end(buf).ok_or(ParseError::Incomplete)?;

    // Everything before the empty line, without the terminator itself.
    let head = std::str::from_utf8(&buf[..head_end - 4])
        .map_err(|_| ParseError::InvalidRequest)?;

    let (request_line, header_block) = head.split_once("\r\n").unwrap_or((head, ""));
    let (method, path, version) = parse_request_line(request_line)?;

    let mut headers = HashMap::new();
    for line in header_block.split("\r\n").filter(|line| !line.is_empty()) {
        let (name, value) = parse_header_line(line)?;
        headers.insert(name, value);
    }

    let content_length = match headers.get("Content-Length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength)?,
        None => 0,
    };

    let consumed = head_end + content_length;
    if buf.len() < consumed {
        return Err(ParseError::Incomplete);
    }

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body: buf[head_end..consumed].to_vec(),
    };

    Ok((request, consumed))
}

fn parse_request_line(line: &str) -> Result<(Method, &str, &str), ParseError> {
    let mut tokens = line.split_whitespace();
    let (Some(method), Some(path), Some(version)) =
        (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(ParseError::InvalidRequest);
    };

    let method = Method::from_str(method).ok_or(ParseError::InvalidMethod)?;
    Ok((method, path, version))
}

fn parse_header_line(line: &str) -> Result<(String, String), ParseError> {
    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ParseError::InvalidHeader);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Offset just past the `\r\n\r\n` that ends the head, if buffered yet.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 4 <= buf.len() {
        if &buf[i..i + 4] == b"\r\n\r\n" {
            return Some(i + 4);
        }
        i += 1;
    }
    None
}
