//! Mutually authenticated TLS for the RPC endpoint.
//!
//! # Responsibilities
//! - Load the agent's certificate chain, private key and client CA bundle
//! - Require a client certificate chaining to the CA bundle
//! - Reject clients whose subject does not carry the configured `verify_fields`
//!
//! # Design Decisions
//! - Chain verification is delegated to rustls' WebPKI verifier; subject
//!   checks run only on certificates that already passed it
//! - The ring provider is selected explicitly so the config never depends
//!   on a process-wide default provider

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme};
use thiserror::Error;
use x509_parser::prelude::*;

/// Subject attributes `verify_fields` may name.
pub const SUBJECT_FIELDS: [&str; 7] = ["CN", "O", "OU", "C", "L", "ST", "emailAddress"];

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("could not load certificates from {0}")]
    CertificateLoad(String),

    #[error("could not load private key from {0}")]
    KeyLoad(String),

    #[error("invalid CA certificate: {0}")]
    InvalidCertificate(String),

    #[error("failed to build TLS configuration: {0}")]
    ConfigBuild(String),
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Load every certificate in a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path)
        .map_err(|e| TlsError::CertificateLoad(format!("{}: {}", path.display(), e)))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::CertificateLoad(format!("{}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(TlsError::CertificateLoad(format!(
            "{}: no certificates found in file",
            path.display()
        )));
    }
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::KeyLoad(format!("{}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TlsError::KeyLoad(format!("{}: {}", path.display(), e)))?
        .ok_or_else(|| TlsError::KeyLoad(format!("{}: no private key found in file", path.display())))
}

/// Load the CA bundle client certificates must chain to.
pub fn load_client_ca(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| TlsError::InvalidCertificate(format!("{}: {}", path.display(), e)))?;
    }
    tracing::info!(ca_file = %path.display(), cert_count = roots.len(), "Loaded client CA certificates");
    Ok(roots)
}

/// Subject attributes of a DER certificate, keyed by short name.
pub fn subject_fields(der: &[u8]) -> Result<BTreeMap<&'static str, Vec<String>>, String> {
    let (_, cert) = parse_x509_certificate(der).map_err(|e| e.to_string())?;
    let subject = cert.subject();

    let mut fields: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    for (name, values) in [
        ("CN", attribute_values(subject.iter_common_name())),
        ("O", attribute_values(subject.iter_organization())),
        ("OU", attribute_values(subject.iter_organizational_unit())),
        ("C", attribute_values(subject.iter_country())),
        ("L", attribute_values(subject.iter_locality())),
        ("ST", attribute_values(subject.iter_state_or_province())),
        ("emailAddress", attribute_values(subject.iter_email())),
    ] {
        if !values.is_empty() {
            fields.insert(name, values);
        }
    }

    Ok(fields)
}

fn attribute_values<'a, 'b: 'a>(attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> Vec<String> {
    attrs
        .filter_map(|attr| attr.as_str().ok().map(str::to_string))
        .collect()
}

/// Check that every required field is present with the required value.
///
/// Returns a description of the first mismatch.
pub fn check_verify_fields(
    subject: &BTreeMap<&'static str, Vec<String>>,
    required: &BTreeMap<String, String>,
) -> Result<(), String> {
    for (field, expected) in required {
        let actual = subject.get(field.as_str());
        if !actual.is_some_and(|values| values.iter().any(|v| v == expected)) {
            return Err(format!(
                "field [{}] expected [{}], got [{}]",
                field,
                expected,
                actual.map(|v| v.join(", ")).unwrap_or_default()
            ));
        }
    }
    Ok(())
}

/// WebPKI client verification plus subject field checks.
#[derive(Debug)]
pub struct SubjectVerifier {
    inner: Arc<dyn ClientCertVerifier>,
    required: BTreeMap<String, String>,
}

impl SubjectVerifier {
    pub fn new(roots: RootCertStore, required: BTreeMap<String, String>) -> Result<Self, TlsError> {
        let inner = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider())
            .build()
            .map_err(|e| TlsError::ConfigBuild(format!("client verifier: {}", e)))?;
        Ok(Self { inner, required })
    }
}

impl ClientCertVerifier for SubjectVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        let verified = self.inner.verify_client_cert(end_entity, intermediates, now)?;
        if self.required.is_empty() {
            return Ok(verified);
        }

        let subject = subject_fields(end_entity.as_ref()).map_err(|e| {
            tracing::warn!(error = %e, "Could not parse client certificate");
            rustls::Error::InvalidCertificate(CertificateError::BadEncoding)
        })?;
        check_verify_fields(&subject, &self.required).map_err(|reason| {
            tracing::warn!(reason = %reason, "Client certificate rejected");
            rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure)
        })?;
        Ok(verified)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Build the server side TLS config.
pub fn build_server_config(
    certfile: &Path,
    keyfile: &Path,
    ca_certs: &Path,
    verify_fields: &BTreeMap<String, String>,
) -> Result<ServerConfig, TlsError> {
    let certs = load_certs(certfile)?;
    let key = load_private_key(keyfile)?;
    let verifier = SubjectVerifier::new(load_client_ca(ca_certs)?, verify_fields.clone())?;

    let mut config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::ConfigBuild(e.to_string()))?
        .with_client_cert_verifier(Arc::new(verifier))
        .with_single_cert(certs, key)
        .map_err(|e| TlsError::ConfigBuild(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::info!(
        certfile = %certfile.display(),
        verify_fields = ?verify_fields,
        "mTLS enabled: client certificates required"
    );
    Ok(config)
}

/// [`build_server_config`] wrapped for axum-server.
pub fn load_tls_config(
    certfile: &Path,
    keyfile: &Path,
    ca_certs: &Path,
    verify_fields: &BTreeMap<String, String>,
) -> Result<RustlsConfig, TlsError> {
    let config = build_server_config(certfile, keyfile, ca_certs, verify_fields)?;
    Ok(RustlsConfig::from_config(Arc::new(config)))
}
