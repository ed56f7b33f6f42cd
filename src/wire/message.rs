//! Protobuf messages exchanged on the stream.
//!
//! Derived by hand with `prost` so no build step is needed. Field tags are part of
//! the wire contract and must not change.

use bytes::Bytes;

/// One header name with all of its values, in order.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpHeader {
    #[prost(string, tag = "1")]
    pub header: String,
    #[prost(string, repeated, tag = "2")]
    pub values: Vec<String>,
}

/// Request-direction message: either request metadata or one body chunk.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpRequest {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(string, tag = "2")]
    pub url: String,
    #[prost(string, tag = "3")]
    pub proto: String,
    #[prost(string, tag = "4")]
    pub remote_addr: String,
    #[prost(message, repeated, tag = "5")]
    pub headers: Vec<HttpHeader>,
    #[prost(bytes = "bytes", tag = "6")]
    pub body_data: Bytes,
}

impl HttpRequest {
    /// A message carrying only a body chunk.
    pub fn body_chunk(data: Bytes) -> Self {
        Self {
            body_data: data,
            ..Default::default()
        }
    }
}

/// Response-direction message: continuation, response metadata, or one body chunk.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpResponse {
    #[prost(int32, tag = "1")]
    pub status_code: i32,
    #[prost(message, repeated, tag = "2")]
    pub headers: Vec<HttpHeader>,
    #[prost(bytes = "bytes", tag = "3")]
    pub body_data: Bytes,
}

impl HttpResponse {
    /// Final (or provisional) response metadata.
    pub fn metadata(status_code: i32, headers: Vec<HttpHeader>) -> Self {
        Self {
            status_code,
            headers,
            ..Default::default()
        }
    }

    /// The `100 Continue` signal that releases the request body.
    pub fn continue_() -> Self {
        Self::metadata(super::STATUS_CONTINUE, Vec::new())
    }

    /// A message carrying only a body chunk.
    pub fn body_chunk(data: Bytes) -> Self {
        Self {
            body_data: data,
            ..Default::default()
        }
    }

    /// True for the provisional continuation message.
    pub fn is_continue(&self) -> bool {
        self.status_code == super::STATUS_CONTINUE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn metadata_and_chunks_stay_disjoint() {
        let meta = HttpResponse::metadata(204, vec![HttpHeader {
            header: "X-Test".into(),
            values: vec!["1".into()],
        }]);
        assert!(meta.body_data.is_empty());

        let chunk = HttpResponse::body_chunk(Bytes::from_static(b"abc"));
        assert_eq!(chunk.status_code, 0);
        assert!(chunk.headers.is_empty());
    }

    #[test]
    fn request_survives_protobuf_encoding() {
        let req = HttpRequest {
            method: "POST".into(),
            url: "/upload?x=1".into(),
            proto: "HTTP/1.1".into(),
            remote_addr: "10.0.0.1:5000".into(),
            headers: vec![HttpHeader {
                header: "Accept".into(),
                values: vec!["a".into(), "b".into()],
            }],
            body_data: Bytes::new(),
        };
        let decoded = HttpRequest::decode(req.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, req);
    }
}
