//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TunnelConfig → Result<(), Vec<ValidationError>>
//! - Only the active side is checked, plus shared observability settings

use std::net::SocketAddr;

use http::uri::Authority;
use http::Uri;
use thiserror::Error;

use crate::config::schema::{Mode, TunnelConfig};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &TunnelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.mode {
        Mode::Forward => {
            let forward = &config.forward;
            check_socket_addr(&mut errors, "forward.listen_address", &forward.listen_address);
            match forward.upstream.parse::<Uri>() {
                Ok(uri) if matches!(uri.scheme_str(), Some("http" | "https")) && uri.authority().is_some() => {}
                _ => errors.push(ValidationError::new(
                    "forward.upstream",
                    format!("expected an http(s) URL, got {:?}", forward.upstream),
                )),
            }
            if forward.chunk_size == 0 {
                errors.push(ValidationError::new("forward.chunk_size", "must be greater than 0"));
            }
            if forward.connect_timeout_secs == 0 {
                errors.push(ValidationError::new("forward.connect_timeout_secs", "must be greater than 0"));
            }
        }
        Mode::Receive => {
            let receive = &config.receive;
            check_socket_addr(&mut errors, "receive.listen_address", &receive.listen_address);
            if receive.backend_address.parse::<Authority>().is_err() {
                errors.push(ValidationError::new(
                    "receive.backend_address",
                    format!("expected host:port, got {:?}", receive.backend_address),
                ));
            }
        }
    }

    if config.observability.metrics_enabled {
        check_socket_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address {value:?}")));
    }
}
