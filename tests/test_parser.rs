//! Tests for the buffer-front request parser

use palisade::http::parser::{parse_http_request, ParseError};
use palisade::http::request::Method;

#[test]
fn test_request_line_tokens() {
    let buf = b"PUT /items/7?force=1 HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (req, _) = parse_http_request(buf).unwrap();

    assert_eq!(req.method, Method::PUT);
    assert_eq!(req.path, "/items/7?force=1");
    assert_eq!(req.version, "HTTP/1.1");
}

#[test]
fn test_every_method_is_recognized() {
    for method in Method::all() {
        let buf = format!("{} /probe HTTP/1.1\r\n\r\n", method.as_str());
        let (req, _) = parse_http_request(buf.as_bytes()).unwrap();
        assert_eq!(req.method, method);
    }
}

#[test]
fn test_unknown_method_rejected() {
    let result = parse_http_request(b"BREW /pot HTTP/1.1\r\n\r\n");
    assert!(matches!(result, Err(ParseError::InvalidMethod)));
}

#[test]
fn test_request_line_with_missing_tokens_rejected() {
    // No version token
    let result = parse_http_request(b"GET /\r\n\r\n");
    assert!(matches!(result, Err(ParseError::InvalidRequest)));
}

#[test]
fn test_consumed_covers_head_and_body_exactly() {
    let buf = b"POST /submit HTTP/1.1\r\nContent-Length: 4\r\n\r\nwxyz";
    let (req, consumed) = parse_http_request(buf).unwrap();

    assert_eq!(consumed, buf.len());
    assert_eq!(req.body, b"wxyz");
}

#[test]
fn test_consumed_leaves_pipelined_bytes_untouched() {
    // Two requests back to back; parsing the first must not eat into the
    // second, which the connection keeps buffered for the next pass.
    let buf = b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /b HTTP/1.1\r\n\r\n";
    let (first, consumed) = parse_http_request(buf).unwrap();

    assert_eq!(first.path, "/a");
    assert_eq!(first.body, b"abc");
    assert!(buf[consumed..].starts_with(b"GET /b "));
}

#[test]
fn test_drain_loop_yields_requests_in_order() {
    // Mirror the connection's read loop: parse the front, drain what was
    // consumed, repeat until the buffer runs dry.
    let mut buffer = Vec::new();
    buffer.extend_from_slice(b"GET /one HTTP/1.1\r\n\r\n");
    buffer.extend_from_slice(b"POST /two HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi");
    buffer.extend_from_slice(b"GET /three HTTP/1.1\r\nHost: x\r\n\r\n");

    let mut paths = Vec::new();
    while !buffer.is_empty() {
        let (req, consumed) = parse_http_request(&buffer).unwrap();
        paths.push(req.path);
        buffer.drain(..consumed);
    }

    assert_eq!(paths, vec!["/one", "/two", "/three"]);
}

#[test]
fn test_incomplete_head_needs_more_data() {
    let result = parse_http_request(b"GET /slow HTTP/1.1\r\nHost: exam");
    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_incomplete_body_needs_more_data() {
    let result = parse_http_request(b"POST /up HTTP/1.1\r\nContent-Length: 8\r\n\r\nhalf");
    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_header_values_are_trimmed() {
    let buf = b"GET / HTTP/1.1\r\nAccept:   text/html  \r\nX-Id:42\r\n\r\n";
    let (req, _) = parse_http_request(buf).unwrap();

    assert_eq!(req.header("Accept"), Some("text/html"));
    assert_eq!(req.header("X-Id"), Some("42"));
}

#[test]
fn test_header_without_colon_rejected() {
    let result = parse_http_request(b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n");
    assert!(matches!(result, Err(ParseError::InvalidHeader)));
}

#[test]
fn test_header_with_empty_name_rejected() {
    let result = parse_http_request(b"GET / HTTP/1.1\r\n: orphan-value\r\n\r\n");
    assert!(matches!(result, Err(ParseError::InvalidHeader)));
}

#[test]
fn test_content_length_must_be_numeric() {
    let result = parse_http_request(b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n");
    assert!(matches!(result, Err(ParseError::InvalidContentLength)));
}

#[test]
fn test_missing_content_length_means_empty_body() {
    let buf = b"GET /page HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (req, consumed) = parse_http_request(buf).unwrap();

    assert!(req.body.is_empty());
    assert_eq!(consumed, buf.len());
}

#[test]
fn test_binary_body_preserved_byte_for_byte() {
    let mut buf = b"POST /blob HTTP/1.1\r\nContent-Length: 5\r\n\r\n".to_vec();
    buf.extend_from_slice(&[0x00, 0xff, 0x7f, 0x0a, 0x0d]);

    let (req, consumed) = parse_http_request(&buf).unwrap();
    assert_eq!(req.body, vec![0x00, 0xff, 0x7f, 0x0a, 0x0d]);
    assert_eq!(consumed, buf.len());
}

#[test]
fn test_non_utf8_head_rejected() {
    let buf = b"GET /\xc3\x28 HTTP/1.1\r\nHost: \xff\xfe\r\n\r\n";
    let result = parse_http_request(buf);
    assert!(matches!(result, Err(ParseError::InvalidRequest)));
}

#[test]
fn test_body_bytes_are_not_parsed_as_head() {
    // A body containing an empty line must not confuse the next parse:
    // the head terminator search only matters before Content-Length bytes
    // are accounted for.
    let buf = b"POST /x HTTP/1.1\r\nContent-Length: 8\r\n\r\nab\r\n\r\ncd";
    let (req, consumed) = parse_http_request(buf).unwrap();

    assert_eq!(req.body, b"ab\r\n\r\ncd");
    assert_eq!(consumed, buf.len());
}
