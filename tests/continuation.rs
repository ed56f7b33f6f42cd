//! `Expect: 100-continue` handling on both sides of the tunnel.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use bytes::Bytes;
use http::{Request, StatusCode};
use tokio::time::timeout;

use http_tunnel::forward::Forwarder;
use http_tunnel::receive::{Handler, Receiver, RequestBody, ResponseWriter};
use http_tunnel::stream::memory::channel;
use http_tunnel::stream::{MessageSink, MessageSource, ServerStream};
use http_tunnel::wire::{HttpRequest, HttpResponse};

mod common;
use common::{collect, header, request_metadata, server_stream, tunnel, Echo};

/// Rejects the upload before reading any of it, then drains what is left.
struct RejectUpload;

#[async_trait]
impl Handler for RejectUpload {
    async fn handle(&self, mut req: Request<RequestBody>, w: &mut ResponseWriter) {
        assert!(req.body().expects_continue());
        w.write_status(StatusCode::PAYLOAD_TOO_LARGE).await.unwrap();
        let rest = req.body_mut().read_to_end().await.unwrap();
        assert!(rest.is_empty());
    }
}

fn expect_post(body: &'static str) -> Request<Body> {
    Request::post("/upload")
        .header("expect", "100-continue")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn receiver_sends_continue_on_first_read() {
    let (stream, mut client) = server_stream();
    let metadata = request_metadata(
        "POST",
        "/upload",
        vec![header("Expect", &["100-continue"]), header("Content-Length", &["3"])],
    );
    client.requests.send(metadata).await.unwrap();
    let serve = tokio::spawn(async move { Receiver::new(Echo).serve(stream).await });

    let first = client.responses.recv().await.unwrap().unwrap();
    assert!(first.is_continue());
    assert!(first.headers.is_empty());

    client.requests.send(HttpRequest::body_chunk(Bytes::from_static(b"abc"))).await.unwrap();
    client.requests.close_send().await.unwrap();
    serve.await.unwrap().unwrap();

    let rest = collect(&mut client.responses).await;
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[0].status_code, 200);
    assert_eq!(rest[1].body_data, "abc");
}

#[tokio::test]
async fn no_continue_after_final_status() {
    let (stream, mut client) = server_stream();
    let metadata = request_metadata("POST", "/upload", vec![header("expect", &["100-Continue"])]);
    client.requests.send(metadata).await.unwrap();
    client.requests.close_send().await.unwrap();

    Receiver::new(RejectUpload).serve(stream).await.unwrap();

    let codes: Vec<_> = collect(&mut client.responses).await.iter().map(|m| m.status_code).collect();
    assert_eq!(codes, vec![413]);
}

#[tokio::test]
async fn forwarder_holds_body_until_continue() {
    let (channel, mut listener) = channel(16);
    let forwarder = Forwarder::new(channel);
    let response = tokio::spawn(async move { forwarder.forward(expect_post("payload")).await });

    let ServerStream { mut sink, mut source } = listener.accept().await.unwrap();
    let metadata = source.recv().await.unwrap().unwrap();
    assert!(metadata.headers.iter().any(|h| h.header == "expect"));

    assert!(
        timeout(Duration::from_millis(100), source.recv()).await.is_err(),
        "body must wait for the continuation"
    );

    sink.send(HttpResponse::continue_()).await.unwrap();
    let chunk = source.recv().await.unwrap().unwrap();
    assert_eq!(chunk.body_data, "payload");
    assert!(source.recv().await.unwrap().is_none());

    sink.send(HttpResponse::metadata(201, vec![])).await.unwrap();
    drop(sink);
    assert_eq!(response.await.unwrap().status(), StatusCode::CREATED);
}

#[tokio::test]
async fn body_sent_immediately_without_expect() {
    let (channel, mut listener) = channel(16);
    let forwarder = Forwarder::new(channel);
    let req = Request::post("/upload").body(Body::from("now")).unwrap();
    let response = tokio::spawn(async move { forwarder.forward(req).await });

    let ServerStream { mut sink, mut source } = listener.accept().await.unwrap();
    source.recv().await.unwrap().unwrap();
    let chunk = timeout(Duration::from_secs(5), source.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(chunk.body_data, "now");

    sink.send(HttpResponse::metadata(200, vec![])).await.unwrap();
    drop(sink);
    assert_eq!(response.await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn final_status_without_continue_drops_the_body() {
    let (channel, mut listener) = channel(16);
    let forwarder = Forwarder::new(channel);
    let response = tokio::spawn(async move { forwarder.forward(expect_post("unwanted")).await });

    let ServerStream { mut sink, mut source } = listener.accept().await.unwrap();
    source.recv().await.unwrap().unwrap();
    sink.send(HttpResponse::metadata(417, vec![])).await.unwrap();
    drop(sink);

    let response = response.await.unwrap();
    assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);
    let next = timeout(Duration::from_secs(5), source.recv()).await.unwrap().unwrap();
    assert!(next.is_none(), "no body chunk may follow a final status");
}

#[tokio::test]
async fn continue_round_trip_through_tunnel() {
    let response = tunnel(Echo).forward(expect_post("payload")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "payload");
}
