//! Tests for upstream request building

use std::collections::HashMap;

use palisade::http::request::Method;
use palisade::proxy::HttpClient;

#[test]
fn test_client_parses_host_and_port() {
    let client = HttpClient::new("http://localhost:3000").unwrap();
    assert_eq!(client.host(), "http://localhost:3000");
    assert_eq!(client.base_path(), "/");
}

#[test]
fn test_client_keeps_url_path() {
    let client = HttpClient::new("http://localhost:3000/api/v1").unwrap();
    assert_eq!(client.base_path(), "/api/v1");
}

#[test]
fn test_client_rejects_invalid_url() {
    assert!(HttpClient::new("not a url").is_err());
    assert!(HttpClient::new("http://").is_err());
}

#[test]
fn test_build_request_line_and_host() {
    let client = HttpClient::new("http://localhost:3000").unwrap();

    let mut headers = HashMap::new();
    headers.insert("User-Agent".to_string(), "Test".to_string());

    let bytes = client.build_request("/api/users", Method::GET, b"", &headers);
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.contains("GET /api/users HTTP/1.1"));
    assert!(text.contains("Host: localhost:3000"));
    assert!(text.contains("User-Agent: Test"));
    assert!(text.contains("Connection: close"));
}

#[test]
fn test_build_request_with_body_sets_content_length() {
    let client = HttpClient::new("http://localhost:8080").unwrap();

    let bytes = client.build_request("/api/data", Method::POST, b"{\"k\":1}", &HashMap::new());
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.contains("POST /api/data HTTP/1.1"));
    assert!(text.contains("Host: localhost:8080"));
    assert!(text.contains("Content-Length: 7"));
    assert!(text.ends_with("{\"k\":1}"));
}

#[test]
fn test_build_request_removes_hop_by_hop_headers() {
    let client = HttpClient::new("http://localhost:3000").unwrap();

    let mut headers = HashMap::new();
    headers.insert("Connection".to_string(), "keep-alive".to_string());
    headers.insert("Upgrade".to_string(), "websocket".to_string());
    headers.insert("User-Agent".to_string(), "Test".to_string());

    let bytes = client.build_request("/", Method::GET, b"", &headers);
    let text = String::from_utf8_lossy(&bytes);

    // Should have Connection: close (replaced)
    assert!(text.contains("Connection: close"));
    // Should NOT have Upgrade header (removed)
    assert!(!text.contains("Upgrade: websocket"));
    // Should still have User-Agent
    assert!(text.contains("User-Agent: Test"));
}

#[test]
fn test_build_request_default_path() {
    let client = HttpClient::new("http://localhost:3000").unwrap();

    let bytes = client.build_request("", Method::GET, b"", &HashMap::new());
    let text = String::from_utf8_lossy(&bytes);

    // Empty path should default to "/"
    assert!(text.contains("GET / HTTP/1.1"));
}
