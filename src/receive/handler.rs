//! Local request handlers invoked by the receiver.

use std::fmt::Display;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use tower::{Service, ServiceExt};

use super::body::RequestBody;
use super::session::ResponseWriter;

/// Handles one tunnelled request, writing its response through `w`.
///
/// The receiver sends a default `200 OK` after `handle` returns if the handler
/// never wrote a status.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, req: Request<RequestBody>, w: &mut ResponseWriter);
}

/// Adapts a tower service, such as an axum `Router`, into a [`Handler`].
#[derive(Clone)]
pub struct ServiceHandler<S> {
    service: S,
}

impl<S> ServiceHandler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S, B> Handler for ServiceHandler<S>
where
    S: Service<Request<Body>, Response = Response<B>> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Display + Send,
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Display + Send,
{
    async fn handle(&self, req: Request<RequestBody>, w: &mut ResponseWriter) {
        let req = req.map(RequestBody::into_body);
        match self.service.clone().oneshot(req).await {
            Ok(response) => relay_response(response, w).await,
            Err(e) => {
                tracing::warn!(error = %e, "Local service failed");
                let _ = w.write_status(StatusCode::INTERNAL_SERVER_ERROR).await;
            }
        }
    }
}

/// Write a complete HTTP response through the writer, streaming its body.
///
/// A body error aborts the exchange so the forwarding side sees a truncated response.
pub async fn relay_response<B>(response: Response<B>, w: &mut ResponseWriter)
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Display + Send,
{
    let (parts, body) = response.into_parts();
    w.headers_mut().extend(parts.headers);
    if w.write_status(parts.status).await.is_err() {
        return;
    }

    let mut body = Box::pin(body);
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                // Trailers are not carried.
                let Ok(data) = frame.into_data() else { continue };
                if data.is_empty() {
                    continue;
                }
                if w.write_bytes(data).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Response body failed, aborting exchange");
                w.abort();
                return;
            }
        }
    }
}
