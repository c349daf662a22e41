use palisade::http::request::{Method, Request, RequestBuilder};
use std::collections::HashMap;

#[test]
fn test_request_header_retrieval() {
    let mut headers = HashMap::new();
    headers.insert("Host".to_string(), "example.com".to_string());
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
    };

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_content_length_parsing() {
    let mut headers = HashMap::new();
    headers.insert("Content-Length".to_string(), "42".to_string());

    let req = Request {
        method: Method::POST,
        path: "/api".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
    };

    assert_eq!(req.content_length(), 42);
}

#[test]
fn test_request_content_length_missing() {
    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers: HashMap::new(),
        body: vec![],
    };

    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_keep_alive_default() {
    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers: HashMap::new(),
        body: vec![],
    };

    // HTTP/1.1 defaults to keep-alive
    assert!(req.keep_alive());
}

#[test]
fn test_request_keep_alive_explicit() {
    let mut headers = HashMap::new();
    headers.insert("Connection".to_string(), "keep-alive".to_string());

    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
    };

    assert!(req.keep_alive());
}

#[test]
fn test_request_connection_close() {
    let mut headers = HashMap::new();
    headers.insert("Connection".to_string(), "close".to_string());

    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
    };

    assert!(!req.keep_alive());
}

#[test]
fn test_request_builder_basic() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/index.html")
        .build()
        .unwrap();

    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/index.html");
    assert_eq!(req.version, "HTTP/1.1");
}

#[test]
fn test_request_builder_with_headers_and_body() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .path("/api")
        .header("Content-Type", "application/json")
        .body(b"{}".to_vec())
        .build()
        .unwrap();

    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.body, b"{}".to_vec());
}

#[test]
fn test_request_builder_missing_method() {
    let result = RequestBuilder::new().path("/").build();
    assert!(result.is_err());
}

#[test]
fn test_request_builder_missing_path() {
    let result = RequestBuilder::new().method(Method::GET).build();
    assert!(result.is_err());
}

#[test]
fn test_method_round_trip() {
    for method in Method::all() {
        assert_eq!(Method::from_str(method.as_str()), Some(method));
    }
}

#[test]
fn test_method_all_covers_nine_verbs() {
    assert_eq!(Method::all().len(), 9);
}
