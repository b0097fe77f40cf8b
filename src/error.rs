//! Error taxonomy of the provisioning client
//!
//! Every collaborator reports its own error type. The session surfaces them
//! unchanged through [`ProvisionError`].

use crate::services::provisioning::SessionState;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("failed to discover service: timed out")]
    Timeout,
    #[error("failed to discover service: cancelled")]
    Cancelled,
    #[error("failed to discover service: {0}")]
    TransportFailure(String),
}

/// Association failures that reach the caller.
///
/// "Already associated" and "pending" host outcomes are never represented
/// here, they are absorbed by the association controller.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AssociationError {
    #[error("failed to associate: rejected by host")]
    Rejected,
    #[error("failed to associate: denied by user")]
    UserDenied,
    #[error("failed to associate: network not found")]
    NetworkNotFound,
    #[error("failed to associate: internal host error")]
    Internal,
}

/// HTTP response with a status code >= 400
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    pub status: u16,
    /// Raw response body
    pub body: Vec<u8>,
}

impl HttpError {
    pub fn new(status: u16, body: &[u8]) -> Self {
        Self {
            status,
            body: body.to_vec(),
        }
    }

    /// The body as text, if it is non-empty UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body)
            .ok()
            .filter(|text| !text.is_empty())
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Some(text) => write!(f, "{}: {text}", self.status),
            None if self.body.is_empty() => write!(f, "{}", self.status),
            None => write!(f, "{} ({} bytes)", self.status, self.body.len()),
        }
    }
}

impl std::error::Error for HttpError {}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("request failed with status {0}")]
    Http(HttpError),
    #[error("request failed: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session cancelled")]
    Cancelled,
    #[error("invalid session state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: SessionState,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Association(#[from] AssociationError),
    #[error("device responded with status {0}")]
    Http(HttpError),
    #[error("failed to reach device: {0}")]
    Transport(String),
    #[error("failed to decode device response: {0}")]
    BadResponse(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ExchangeError> for ProvisionError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Http(err) => ProvisionError::Http(err),
            ExchangeError::Transport(reason) => ProvisionError::Transport(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod http_error {
        use super::*;

        #[test]
        fn keeps_text_body() {
            let err = HttpError::new(404, b"not found");
            assert_eq!(err.status, 404);
            assert_eq!(err.body, b"not found".to_vec());
            assert_eq!(err.text(), Some("not found"));
            assert_eq!(err.to_string(), "404: not found");
        }

        #[test]
        fn empty_body_has_no_text() {
            let err = HttpError::new(500, b"");
            assert!(err.body.is_empty());
            assert_eq!(err.text(), None);
            assert_eq!(err.to_string(), "500");
        }

        #[test]
        fn keeps_binary_body() {
            let err = HttpError::new(500, &[0x08, 0x96, 0x01]);
            assert_eq!(err.body, vec![0x08, 0x96, 0x01]);
            assert_eq!(err.text(), None);
            assert_eq!(err.to_string(), "500 (3 bytes)");
        }
    }

    #[test]
    fn exchange_errors_map_onto_provision_errors() {
        let http = ExchangeError::Http(HttpError::new(403, b"forbidden"));
        assert_eq!(
            ProvisionError::from(http),
            ProvisionError::Http(HttpError::new(403, b"forbidden"))
        );

        let transport = ExchangeError::Transport("tls handshake failed".to_string());
        assert_eq!(
            ProvisionError::from(transport),
            ProvisionError::Transport("tls handshake failed".to_string())
        );
    }
}
