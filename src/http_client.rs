use crate::{
    certificate::CertificatePinning,
    error::{ExchangeError, HttpError},
};
use anyhow::{Context, Result};
use log::debug;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::{Client, Response, StatusCode, header::CONTENT_TYPE};
use std::time::Duration;
use trait_variant::make;

pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Single-attempt binary request/response transport
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait BinaryExchange {
    async fn get(&self, url: &str) -> Result<Vec<u8>, ExchangeError>;
    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, ExchangeError>;
}

/// HTTPS transport that trusts the pinned device certificate only
#[derive(Clone)]
pub struct HttpsExchange {
    client: Client,
}

impl HttpsExchange {
    /// Create an HTTPS client whose TLS connections are checked against `pinning`
    ///
    /// # Arguments
    /// * `pinning` - Certificates the device is allowed to present
    /// * `request_timeout` - Upper bound for one request, response body included
    pub fn new(pinning: CertificatePinning, request_timeout: Duration) -> Result<Self> {
        let tls_config = pinning.client_config()?;

        let client = Client::builder()
            .use_preconfigured_tls(tls_config)
            .no_proxy()
            .timeout(request_timeout)
            .build()
            .context("failed to create HTTPS client")?;

        Ok(Self { client })
    }
}

impl BinaryExchange for HttpsExchange {
    async fn get(&self, url: &str) -> Result<Vec<u8>, ExchangeError> {
        debug!("GET {url}");

        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&format!("GET {url}"), &e))?;

        handle_http_response(res, &format!("GET {url}")).await
    }

    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, ExchangeError> {
        debug!("POST {url} with {} bytes of {content_type}", body.len());

        let res = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(&format!("POST {url}"), &e))?;

        handle_http_response(res, &format!("POST {url}")).await
    }
}

fn transport_error(context_msg: &str, err: &reqwest::Error) -> ExchangeError {
    // the source chain carries the TLS rejection reason
    let mut reason = format!("{context_msg} failed: {err}");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        reason.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    ExchangeError::Transport(reason)
}

/// Handle HTTP response by reading the body and checking the status
///
/// # Arguments
/// * `res` - The HTTP response to handle
/// * `context_msg` - Context message describing the request (e.g., "GET /prov/networks")
///
/// # Returns
/// * `Ok(Vec<u8>)` - The response body if the status is below 400
/// * `Err` - If the status is 400 or above, or reading the body fails
pub async fn handle_http_response(
    res: Response,
    context_msg: &str,
) -> Result<Vec<u8>, ExchangeError> {
    let status = res.status();
    let body = res
        .bytes()
        .await
        .map_err(|e| transport_error(&format!("{context_msg} body"), &e))?;

    check_status(status, body.to_vec())
}

/// Map a status >= 400 onto [`HttpError`], pass the body through otherwise
pub fn check_status(status: StatusCode, body: Vec<u8>) -> Result<Vec<u8>, ExchangeError> {
    if status.as_u16() >= 400 {
        return Err(ExchangeError::Http(HttpError::new(status.as_u16(), &body)));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod check_status {
        use super::*;

        #[test]
        fn passes_success_body_through() {
            let body = check_status(StatusCode::OK, vec![1, 2, 3]).unwrap();
            assert_eq!(body, vec![1, 2, 3]);
        }

        #[test]
        fn passes_redirect_status_through() {
            assert!(check_status(StatusCode::NOT_MODIFIED, vec![]).is_ok());
        }

        #[test]
        fn maps_not_found_with_text_body() {
            let err = check_status(StatusCode::NOT_FOUND, b"not found".to_vec()).unwrap_err();
            assert_eq!(
                err,
                ExchangeError::Http(HttpError::new(404, b"not found"))
            );
        }

        #[test]
        fn maps_server_error_with_empty_body() {
            let err = check_status(StatusCode::INTERNAL_SERVER_ERROR, vec![]).unwrap_err();
            assert_eq!(
                err,
                ExchangeError::Http(HttpError::new(500, b""))
            );
        }

        #[test]
        fn keeps_binary_error_body() {
            let err = check_status(StatusCode::BAD_REQUEST, vec![0x08, 0x96, 0x01]).unwrap_err();
            assert_eq!(
                err,
                ExchangeError::Http(HttpError::new(400, &[0x08, 0x96, 0x01]))
            );
        }

        #[test]
        fn maps_lowest_client_error() {
            assert!(check_status(StatusCode::BAD_REQUEST, vec![]).is_err());
        }
    }
}
