//! Upstream proxy handler for the receiving side.
//!
//! # Responsibilities
//! - Re-target tunnelled requests at a fixed backend over HTTP/1.1
//! - Strip hop-by-hop headers in both directions
//! - Record the original client in `X-Forwarded-For`
//! - Stream the backend response back through the response writer
//!
//! # Design Decisions
//! - A cancelled exchange drops the in-flight backend request
//! - Backend connection failures surface as `502 Bad Gateway`

use std::str::FromStr;

use async_trait::async_trait;
use axum::body::Body;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::uri::{Authority, InvalidUri, Scheme};
use http::{Request, StatusCode, Uri, Version};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::receive::{relay_response, Handler, Lifetime, RemoteAddr, RequestBody, ResponseWriter};

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// [`Handler`] that proxies every request to one HTTP backend.
#[derive(Clone)]
pub struct UpstreamHandler {
    client: Client<HttpConnector, Body>,
    backend: Authority,
}

impl UpstreamHandler {
    /// `backend_address` is a `host:port` authority.
    pub fn new(backend_address: &str) -> Result<Self, InvalidUri> {
        let backend = Authority::from_str(backend_address)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self { client, backend })
    }

    fn upstream_uri(&self, uri: &Uri) -> Uri {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.backend.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(http::uri::PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
    }
}

#[async_trait]
impl Handler for UpstreamHandler {
    async fn handle(&self, req: Request<RequestBody>, w: &mut ResponseWriter) {
        let lifetime = req.extensions().get::<Lifetime>().map(|l| l.0.clone());
        let remote = req.extensions().get::<RemoteAddr>().map(|r| r.0.clone());

        let (mut parts, body) = req.into_parts();
        parts.uri = self.upstream_uri(&parts.uri);
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        if let Some(client_ip) = remote.as_deref().and_then(client_ip) {
            append_forwarded_for(&mut parts.headers, client_ip);
        }
        let upstream_req = Request::from_parts(parts, body.into_body());

        let request = self.client.request(upstream_req);
        let result = match lifetime {
            Some(lifetime) => tokio::select! {
                biased;
                _ = lifetime.cancelled() => {
                    tracing::debug!("Exchange cancelled before backend responded");
                    return;
                }
                r = request => r,
            },
            None => request.await,
        };

        match result {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                relay_response(http::Response::from_parts(parts, body), w).await;
            }
            Err(e) => {
                tracing::error!(backend = %self.backend, error = %e, "Upstream error");
                if w.write_status(StatusCode::BAD_GATEWAY).await.is_ok() {
                    let _ = w.write(b"Upstream request failed").await;
                }
            }
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Names listed in Connection are connection-scoped too.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_str(name.trim()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Host part of a `host:port` peer address.
fn client_ip(remote: &str) -> Option<&str> {
    if remote.is_empty() {
        return None;
    }
    let host = match remote.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => remote,
    };
    Some(host.trim_start_matches('[').trim_end_matches(']'))
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let value = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {client_ip}"),
        None => client_ip.to_owned(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", value);
    }
}
