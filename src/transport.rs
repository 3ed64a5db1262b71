//! Network exchange with the flags endpoint.
//!
//! Every failure mode (connection error, non-success status, malformed body)
//! collapses into `None` in [`execute`]. Callers fall back uniformly.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::value::{parse_flag_set, FlagSet};

/// Raw response of a flags request.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends flag requests. Implementations must be thread-safe.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `POST` a JSON body to `url`.
    async fn post(&self, url: &str, body: String) -> Result<TransportResponse, TransportError>;

    /// Whether this transport can reach the network at all. One-shot
    /// resolution refuses to run on transports that cannot.
    fn is_outbound_capable(&self) -> bool {
        true
    }
}

/// Performs one exchange and normalizes the outcome.
pub async fn execute(transport: &dyn Transport, url: &str, body: String) -> Option<FlagSet> {
    let response = match transport.post(url, body).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(url, error = %e, "flagbag: fetch error");
            return None;
        }
    };

    if !response.is_success() {
        tracing::warn!(url, status = response.status, "flagbag: endpoint returned non-success status");
        return None;
    }

    let flags = parse_flag_set(&response.body);
    if flags.is_none() {
        tracing::warn!(url, "flagbag: malformed response body");
    }
    flags
}

/// Transport for environments without network access.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

#[async_trait]
impl Transport for OfflineTransport {
    async fn post(&self, _url: &str, _body: String) -> Result<TransportResponse, TransportError> {
        Err(TransportError::Offline)
    }

    fn is_outbound_capable(&self) -> bool {
        false
    }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;

    use super::{Transport, TransportResponse};
    use crate::error::TransportError;

    /// `reqwest`-backed transport.
    #[derive(Debug, Clone, Default)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn post(&self, url: &str, body: String) -> Result<TransportResponse, TransportError> {
            let response = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;

            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;

            Ok(TransportResponse {
                status,
                body: body.to_vec(),
            })
        }
    }
}
