//! Upstream proxying
//!
//! Forwards requests to a pool of upstream hosts. Each proxy route owns a
//! [`Channel`] that selects one host per request by its load-balancing
//! policy; the upstream's status, headers and body are copied back onto
//! the outgoing response.

pub mod channel;
pub mod client;

pub use channel::{Channel, LbPolicy};
pub use client::{ClientResponse, HttpClient};

use std::collections::HashMap;
use std::sync::Arc;

use crate::http::response::{Response, StatusCode};
use crate::router::Handler;

/// Builds the handler for a proxy route over `channel`.
pub fn proxy_handler(channel: Arc<Channel>) -> Handler {
    Handler::Async(Box::new(move |req, resp| {
        let channel = Arc::clone(&channel);
        Box::pin(async move {
            let mut resp = resp;
            let Some(conn) = resp.conn() else {
                resp.set_status(StatusCode::InternalServerError);
                return resp;
            };

            let client = channel.select();

            // Request headers are not forwarded upstream; the client
            // rebuilds Host and Connection itself.
            let upstream_headers: HashMap<String, String> = HashMap::new();

            match client
                .async_request(client.base_path(), req.method, &req.body, &upstream_headers)
                .await
            {
                Ok(upstream) => {
                    tracing::debug!(
                        upstream = %client.host(),
                        status = upstream.status,
                        method = req.method.as_str(),
                        path = %req.path,
                        "request forwarded upstream"
                    );
                    for (key, value) in upstream.headers {
                        resp.add_header(key, value);
                    }
                    resp.set_status_and_content(
                        StatusCode::from_u16(upstream.status),
                        upstream.body,
                    );
                    conn.reply(&resp).await;
                    resp.set_delay(true);
                }
                Err(e) => {
                    tracing::warn!(
                        upstream = %client.host(),
                        error = %e,
                        method = req.method.as_str(),
                        path = %req.path,
                        "upstream request failed"
                    );
                    fill_upstream_error(&mut resp, &e);
                }
            }

            resp
        })
    }))
}

/// Maps a transport failure to a gateway-class response.
fn fill_upstream_error(resp: &mut Response, error: &anyhow::Error) {
    let error_str = error.to_string();

    let (status, body) = if error_str.contains("timeout") {
        (
            StatusCode::GatewayTimeout,
            &b"504 Gateway Timeout\r\n\r\nThe upstream server did not respond in time."[..],
        )
    } else {
        (
            StatusCode::BadGateway,
            &b"502 Bad Gateway\r\n\r\nFailed to reach the upstream server."[..],
        )
    };

    resp.add_header("Content-Type", "text/plain");
    resp.set_status_and_content(status, body.to_vec());
}
