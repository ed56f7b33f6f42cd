//! Inbound receiver: decodes one stream into a request and encodes the handler's response.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Method, Request, Uri};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::body::RequestBody;
use super::handler::Handler;
use super::session::{ResponseWriter, Session};
use crate::observability::metrics;
use crate::stream::{ServerStream, StreamError};
use crate::wire::{is_expect_continue, merge_headers_replace, parse_version, to_http_version, HttpRequest, WireError};

/// Terminal errors of one received exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The stream ended before request metadata arrived.
    #[error("stream ended before request metadata")]
    MissingMetadata,

    #[error("malformed HTTP version {0:?}")]
    MalformedVersion(String),

    #[error("malformed HTTP method {0:?}")]
    MalformedMethod(String),

    #[error("malformed request URL {0:?}")]
    MalformedUrl(String),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Peer address reported by the forwarding side, as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

/// Protocol string of the original request and its parsed version numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    pub raw: String,
    pub major: u32,
    pub minor: u32,
}

/// Lifetime of the exchange; cancelled when the stream fails or the call ends.
#[derive(Debug, Clone)]
pub struct Lifetime(pub CancellationToken);

/// Serves tunnelled exchanges by dispatching them to a local [`Handler`].
pub struct Receiver<H> {
    handler: Arc<H>,
}

impl<H> Clone for Receiver<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: Handler> Receiver<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Serve one exchange with a fresh lifetime.
    pub async fn serve(&self, stream: ServerStream) -> Result<(), ReceiveError> {
        self.serve_with_lifetime(stream, CancellationToken::new()).await
    }

    /// Serve one exchange. Cancelling `parent` cancels the exchange.
    pub async fn serve_with_lifetime(&self, stream: ServerStream, parent: CancellationToken) -> Result<(), ReceiveError> {
        let lifetime = parent.child_token();
        let _guard = lifetime.clone().drop_guard();
        let ServerStream { sink, mut source } = stream;

        let first = tokio::select! {
            biased;
            _ = lifetime.cancelled() => Err(StreamError::Cancelled),
            r = source.recv() => r,
        };
        let metadata = match first {
            Ok(Some(msg)) => msg,
            Ok(None) => return Err(ReceiveError::MissingMetadata),
            Err(e) => {
                metrics::record_stream_failure("receive");
                return Err(e.into());
            }
        };

        let span = tracing::info_span!("receive", method = %metadata.method, url = %metadata.url);
        async move {
            let start = Instant::now();
            let session = Session::new(sink, lifetime.clone());
            let parts = decode_metadata(metadata)?;
            let expect_continue = is_expect_continue(&parts.headers);
            let content_length = parse_content_length(&parts.headers);
            let body = RequestBody::new(source, Arc::clone(&session), expect_continue, content_length);

            let mut request = Request::new(body);
            *request.method_mut() = parts.method;
            *request.uri_mut() = parts.uri;
            *request.version_mut() = parts.version;
            *request.headers_mut() = parts.headers;
            request.extensions_mut().insert(RemoteAddr(parts.remote_addr));
            request.extensions_mut().insert(parts.protocol);
            request.extensions_mut().insert(Lifetime(lifetime.clone()));

            tracing::debug!(expect_continue, ?content_length, "Dispatching tunnelled request");
            let mut writer = ResponseWriter::new(session);
            self.handler.handle(request, &mut writer).await;
            if let Err(e) = writer.finish().await {
                tracing::debug!(error = %e, "Could not send default response status");
            }
            if lifetime.is_cancelled() {
                metrics::record_stream_failure("receive");
            }
            metrics::record_receive(start);
            Ok::<_, ReceiveError>(())
        }
        .instrument(span)
        .await
    }
}

struct DecodedParts {
    method: Method,
    uri: Uri,
    version: http::Version,
    protocol: Protocol,
    headers: HeaderMap,
    remote_addr: String,
}

fn decode_metadata(msg: HttpRequest) -> Result<DecodedParts, ReceiveError> {
    let method = if msg.method.is_empty() {
        Method::GET
    } else {
        Method::from_bytes(msg.method.as_bytes()).map_err(|_| ReceiveError::MalformedMethod(msg.method.clone()))?
    };
    let uri = Uri::from_str(&msg.url).map_err(|_| ReceiveError::MalformedUrl(msg.url.clone()))?;

    let (major, minor) = parse_version(&msg.proto).ok_or_else(|| ReceiveError::MalformedVersion(msg.proto.clone()))?;
    let version = to_http_version(major, minor).ok_or_else(|| ReceiveError::MalformedVersion(msg.proto.clone()))?;

    let mut headers = HeaderMap::new();
    merge_headers_replace(&mut headers, &msg.headers)?;

    Ok(DecodedParts {
        method,
        uri,
        version,
        protocol: Protocol {
            raw: msg.proto,
            major,
            minor,
        },
        headers,
        remote_addr: msg.remote_addr,
    })
}

fn parse_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::HttpHeader;

    fn metadata(proto: &str) -> HttpRequest {
        HttpRequest {
            method: "PUT".into(),
            url: "/items/7?verbose=1".into(),
            proto: proto.into(),
            remote_addr: "192.0.2.1:4000".into(),
            headers: vec![
                HttpHeader {
                    header: "Content-Length".into(),
                    values: vec!["12".into()],
                },
                HttpHeader {
                    header: "X-Trace".into(),
                    values: vec!["a".into(), "b".into()],
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn decodes_request_metadata() {
        let parts = decode_metadata(metadata("HTTP/1.0")).unwrap();
        assert_eq!(parts.method, Method::PUT);
        assert_eq!(parts.uri.path(), "/items/7");
        assert_eq!(parts.uri.query(), Some("verbose=1"));
        assert_eq!(parts.version, http::Version::HTTP_10);
        assert_eq!(parts.protocol, Protocol { raw: "HTTP/1.0".into(), major: 1, minor: 0 });
        assert_eq!(parts.remote_addr, "192.0.2.1:4000");
        assert_eq!(parse_content_length(&parts.headers), Some(12));
        let trace: Vec<_> = parts.headers.get_all("x-trace").iter().collect();
        assert_eq!(trace, vec!["a", "b"]);
    }

    #[test]
    fn rejects_malformed_metadata() {
        assert_eq!(
            decode_metadata(metadata("HTTP/x")).err(),
            Some(ReceiveError::MalformedVersion("HTTP/x".into()))
        );
        assert_eq!(
            decode_metadata(metadata("HTTP/1.7")).err(),
            Some(ReceiveError::MalformedVersion("HTTP/1.7".into()))
        );

        let mut bad_method = metadata("HTTP/1.1");
        bad_method.method = "GE T".into();
        assert!(matches!(decode_metadata(bad_method), Err(ReceiveError::MalformedMethod(_))));

        let mut bad_url = metadata("HTTP/1.1");
        bad_url.url = "http://[::1".into();
        assert!(matches!(decode_metadata(bad_url), Err(ReceiveError::MalformedUrl(_))));
    }

    #[test]
    fn empty_method_defaults_to_get() {
        let mut msg = metadata("HTTP/1.1");
        msg.method.clear();
        assert_eq!(decode_metadata(msg).unwrap().method, Method::GET);
    }

    #[test]
    fn content_length_is_unknown_unless_numeric() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_content_length(&headers), None);
        headers.insert(CONTENT_LENGTH, "abc".parse().unwrap());
        assert_eq!(parse_content_length(&headers), None);
        headers.insert(CONTENT_LENGTH, "-1".parse().unwrap());
        assert_eq!(parse_content_length(&headers), None);
        headers.insert(CONTENT_LENGTH, "0".parse().unwrap());
        assert_eq!(parse_content_length(&headers), Some(0));
    }
}
