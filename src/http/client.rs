//! Shared upstream HTTP client.
//!
//! # Responsibilities
//! - One pooled client instance reused for forwarding and health probes
//! - HTTP and HTTPS upstreams through a single connector stack
//! - A separate no-verify client for backends that opt out of TLS
//!   verification
//!
//! # Design Decisions
//! - Connection pooling lives here; callers never build clients per request
//! - Certificate verification is skipped per backend, never globally

use axum::body::Body;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;

use crate::load_balancer::backend::BackendServer;

pub type PooledClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Upstream client pair: verifying by default, no-verify on request.
#[derive(Clone)]
pub struct UpstreamClient {
    verified: PooledClient,
    unverified: PooledClient,
}

impl UpstreamClient {
    pub fn new() -> Self {
        Self {
            verified: build_client(false),
            unverified: build_client(true),
        }
    }

    /// Client appropriate for the given backend's TLS settings.
    pub fn for_backend(&self, backend: &BackendServer) -> &PooledClient {
        if backend.insecure_skip_verify {
            &self.unverified
        } else {
            &self.verified
        }
    }

    pub fn default_client(&self) -> &PooledClient {
        &self.verified
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(skip_verify: bool) -> PooledClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);

    let https = if skip_verify {
        let mut tls = rustls::ClientConfig::builder()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth();
        tls.dangerous()
            .set_certificate_verifier(Arc::new(NoVerification::new()));
        HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http)
    } else {
        HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http)
    };

    Client::builder(TokioExecutor::new()).build(https)
}

/// Accepts any server certificate. Only reachable through a backend's
/// explicit insecure_skip_verify flag.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl NoVerification {
    fn new() -> Self {
        Self {
            provider: rustls::crypto::CryptoProvider::get_default()
                .cloned()
                .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider())),
        }
    }
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
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
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
