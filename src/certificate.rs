//! Certificate pinning for the device's HTTPS server
//!
//! The device presents a self-signed certificate on its SoftAP address. A
//! connection is trusted only if the end-entity certificate is byte-for-byte
//! one of the pinned certificates and the handshake signature verifies
//! against it.

use anyhow::{Context, Result, ensure};
use log::debug;
use rustls::{
    ClientConfig, DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};

#[derive(Debug)]
pub struct CertificatePinning {
    pinned: Vec<CertificateDer<'static>>,
    provider: Arc<CryptoProvider>,
}

impl CertificatePinning {
    pub fn new(pinned: Vec<CertificateDer<'static>>) -> Result<Self> {
        ensure!(!pinned.is_empty(), "failed to pin certificates: none given");

        Ok(Self {
            pinned,
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        })
    }

    /// Load all certificates of a PEM file
    pub fn from_pem_file(cert_path: &Path) -> Result<Self> {
        debug!("load pinned certificates from {cert_path:?}");

        let mut reader = BufReader::new(
            File::open(cert_path).context(format!("failed to open {cert_path:?}"))?,
        );

        Self::from_pem(&mut reader).context(format!("failed to read {cert_path:?}"))
    }

    pub fn from_pem(reader: &mut dyn std::io::BufRead) -> Result<Self> {
        let pinned = rustls_pemfile::certs(reader)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to parse cert pem")?;

        Self::new(pinned)
    }

    pub fn is_pinned(&self, certificate: &CertificateDer<'_>) -> bool {
        self.pinned
            .iter()
            .any(|pinned| pinned.as_ref() == certificate.as_ref())
    }

    /// TLS client configuration that trusts exactly the pinned certificates
    pub fn client_config(self) -> Result<ClientConfig> {
        let provider = self.provider.clone();

        Ok(ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .context("invalid tls config")?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(self))
            .with_no_client_auth())
    }
}

impl ServerCertVerifier for CertificatePinning {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.is_pinned(end_entity) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General(
                "server certificate is not pinned".to_string(),
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
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
