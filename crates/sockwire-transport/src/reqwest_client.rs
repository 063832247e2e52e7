//! [`reqwest`]-backed implementation of [`HttpClient`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, TransportError};
use crate::tls::TlsPolicy;
use crate::traits::{HttpClient, HttpMethod, HttpRequest, HttpResponse};

/// Upper bound on a single long-poll round trip. Servers answer a parked
/// poll well before this (usually within the ping interval).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// A [`reqwest`]-backed implementation of [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a client with default root verification.
    pub fn new() -> Result<Self> {
        Self::with_tls(&TlsPolicy::Verify)
    }

    /// Create a client applying the given certificate policy.
    pub fn with_tls(tls: &TlsPolicy) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(DEFAULT_REQUEST_TIMEOUT);

        match tls {
            TlsPolicy::Verify => {}
            TlsPolicy::AcceptInvalidCerts => {
                builder = builder.danger_accept_invalid_certs(true);
            }
            TlsPolicy::Pinned { certificates } => {
                builder = builder.tls_built_in_root_certs(false);
                for pem in certificates {
                    if !pem.contains("-----BEGIN CERTIFICATE-----") {
                        return Err(TransportError::Request(
                            "invalid pinned certificate: expected PEM".to_string(),
                        ));
                    }
                    let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                        .map_err(|err| {
                            TransportError::Request(format!("invalid pinned certificate: {err}"))
                        })?;
                    builder = builder.add_root_certificate(cert);
                }
            }
        }

        let inner = builder
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.inner.get(&request.url),
            HttpMethod::Post => self.inner.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder
                .header("content-type", "text/plain; charset=UTF-8")
                .body(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_pinned_certificate() {
        let tls = TlsPolicy::Pinned {
            certificates: vec!["not a certificate".to_string()],
        };
        let err = ReqwestHttpClient::with_tls(&tls).unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_request_error() {
        let client = ReqwestHttpClient::new().unwrap();
        let err = client
            .request(HttpRequest {
                method: HttpMethod::Get,
                url: "http://127.0.0.1:1/socket.io/".to_string(),
                headers: Vec::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
