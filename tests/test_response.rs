use palisade::http::response::{FormatType, Response, ResponseBuilder, StatusCode};
use palisade::http::writer;

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::Created.as_u16(), 201);
    assert_eq!(StatusCode::NoContent.as_u16(), 204);
    assert_eq!(StatusCode::PartialContent.as_u16(), 206);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::MethodNotAllowed.as_u16(), 405);
    assert_eq!(StatusCode::RangeNotSatisfiable.as_u16(), 416);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
    assert_eq!(StatusCode::BadGateway.as_u16(), 502);
    assert_eq!(StatusCode::ServiceUnavailable.as_u16(), 503);
    assert_eq!(StatusCode::GatewayTimeout.as_u16(), 504);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::PartialContent.reason_phrase(), "Partial Content");
    assert_eq!(
        StatusCode::RangeNotSatisfiable.reason_phrase(),
        "Range Not Satisfiable"
    );
    assert_eq!(StatusCode::BadGateway.reason_phrase(), "Bad Gateway");
}

#[test]
fn test_status_code_from_u16_known_codes() {
    assert_eq!(StatusCode::from_u16(200), StatusCode::Ok);
    assert_eq!(StatusCode::from_u16(206), StatusCode::PartialContent);
    assert_eq!(StatusCode::from_u16(404), StatusCode::NotFound);
    assert_eq!(StatusCode::from_u16(504), StatusCode::GatewayTimeout);
}

#[test]
fn test_status_code_from_u16_unknown_5xx_maps_to_bad_gateway() {
    assert_eq!(StatusCode::from_u16(599), StatusCode::BadGateway);
    assert_eq!(StatusCode::from_u16(501), StatusCode::BadGateway);
}

#[test]
fn test_status_code_from_u16_unknown_falls_back_to_ok() {
    assert_eq!(StatusCode::from_u16(302), StatusCode::Ok);
    assert_eq!(StatusCode::from_u16(418), StatusCode::Ok);
}

#[test]
fn test_response_builder_basic() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .body(b"Hello, World!".to_vec())
        .build();

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.body, b"Hello, World!".to_vec());
}

#[test]
fn test_response_builder_auto_content_length() {
    let body = b"This is the body".to_vec();
    let response = ResponseBuilder::new(StatusCode::Ok)
        .body(body.clone())
        .build();

    let content_length = response.headers.get("Content-Length").unwrap();
    assert_eq!(content_length, &body.len().to_string());
}

#[test]
fn test_response_builder_preserves_custom_content_length() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Length", "999")
        .body(b"test".to_vec())
        .build();

    // Should keep the custom value
    assert_eq!(response.headers.get("Content-Length").unwrap(), "999");
}

#[test]
fn test_response_set_status_and_content_updates_length() {
    let mut response = ResponseBuilder::new(StatusCode::Ok).build();
    response.set_status_and_content(StatusCode::NotFound, b"gone".to_vec());

    assert_eq!(response.status, StatusCode::NotFound);
    assert_eq!(response.body, b"gone".to_vec());
    assert_eq!(response.headers.get("Content-Length").unwrap(), "4");
}

#[test]
fn test_response_delay_flag() {
    let mut response = ResponseBuilder::new(StatusCode::Ok).build();
    assert!(!response.delayed());

    response.set_delay(true);
    assert!(response.delayed());
}

#[test]
fn test_response_format_type() {
    let mut response = ResponseBuilder::new(StatusCode::Ok).build();
    assert_eq!(response.format_type(), FormatType::Normal);

    response.set_format_type(FormatType::Chunked);
    assert_eq!(response.format_type(), FormatType::Chunked);
}

#[test]
fn test_response_without_conn() {
    let response = ResponseBuilder::new(StatusCode::Ok).build();
    assert!(response.conn().is_none());
}

#[test]
fn test_response_ok_helper() {
    let response = Response::ok(b"test content".to_vec());

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.body, b"test content".to_vec());
}

#[test]
fn test_response_not_found_helper() {
    let response = Response::not_found();

    assert_eq!(response.status, StatusCode::NotFound);
    assert_eq!(response.body, b"404 Not Found".to_vec());
}

#[test]
fn test_response_internal_error_helper() {
    let response = Response::internal_error();

    assert_eq!(response.status, StatusCode::InternalServerError);
    assert_eq!(response.body, b"500 Internal Server Error".to_vec());
}

#[test]
fn test_serialize_response_status_line_and_body() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .body(b"hello".to_vec())
        .build();

    let bytes = writer::serialize_response(&response);
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Length: 5\r\n"));
    assert!(text.ends_with("\r\n\r\nhello"));
}

#[test]
fn test_serialize_response_adds_missing_content_length() {
    let mut response = ResponseBuilder::new(StatusCode::Ok).build();
    response.headers.remove("Content-Length");
    response.body = b"abc".to_vec();

    let bytes = writer::serialize_response(&response);
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.contains("Content-Length: 3\r\n"));
}

#[test]
fn test_serialize_chunked_head_has_no_content_length() {
    let mut response = ResponseBuilder::new(StatusCode::Ok).build();
    response.set_format_type(FormatType::Chunked);

    let bytes = writer::serialize_chunked_head(&response);
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Transfer-Encoding: chunked\r\n"));
    assert!(!text.contains("Content-Length"));
    assert!(text.ends_with("\r\n\r\n"));
}

#[test]
fn test_encode_chunk_framing() {
    let chunk = writer::encode_chunk(b"hello");
    assert_eq!(chunk, b"5\r\nhello\r\n".to_vec());

    let big = vec![0u8; 255];
    let chunk = writer::encode_chunk(&big);
    assert!(chunk.starts_with(b"ff\r\n"));
    assert!(chunk.ends_with(b"\r\n"));
    assert_eq!(chunk.len(), 2 + 2 + 255 + 2);
}

#[test]
fn test_chunked_end_marker() {
    assert_eq!(writer::CHUNKED_END, b"0\r\n\r\n");
}
