//! rustls client configuration for the streaming socket.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

use crate::error::{Result, TransportError};
use crate::tls::TlsPolicy;

/// Build the rustls configuration for `tls`. `None` means the connector's
/// default webpki-root verification.
pub(crate) fn client_config(tls: &TlsPolicy) -> Result<Option<Arc<ClientConfig>>> {
    let roots = match tls {
        TlsPolicy::Verify => return Ok(None),
        TlsPolicy::AcceptInvalidCerts => None,
        TlsPolicy::Pinned { certificates } => Some(pinned_roots(certificates)?),
    };

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|err| TransportError::Request(format!("tls setup failed: {err}")))?;

    let config = match roots {
        Some(roots) => builder.with_root_certificates(roots).with_no_client_auth(),
        None => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
            .with_no_client_auth(),
    };
    Ok(Some(Arc::new(config)))
}

fn pinned_roots(certificates: &[String]) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for pem in certificates {
        let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| TransportError::Request(format!("invalid pinned certificate: {err:?}")))?;
        if certs.is_empty() {
            return Err(TransportError::Request(
                "invalid pinned certificate: expected PEM".to_string(),
            ));
        }
        for cert in certs {
            roots
                .add(cert)
                .map_err(|err| TransportError::Request(format!("invalid pinned certificate: {err}")))?;
        }
    }
    Ok(roots)
}

/// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_uses_connector_roots() {
        assert!(client_config(&TlsPolicy::Verify).unwrap().is_none());
    }

    #[test]
    fn accept_invalid_builds_a_config() {
        assert!(client_config(&TlsPolicy::AcceptInvalidCerts)
            .unwrap()
            .is_some());
    }

    #[test]
    fn garbage_pinned_certificate_is_rejected() {
        let tls = TlsPolicy::Pinned {
            certificates: vec!["not a certificate".to_string()],
        };
        let err = client_config(&tls).unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
