//! Purpose: Load or generate TLS material for `notekeep serve`.
//! Exports: `TlsMode`, `TlsMaterial`, `load_tls`, `format_cert_fingerprint`.
//! Role: Turns CLI TLS flags into a rustls `ServerConfig` plus a displayable fingerprint.
//! Invariants: Self-signed certs cover localhost, 127.0.0.1, ::1, and a specific bind IP.
//! Invariants: A self-signed cert written to disk is byte-identical to the one served.
//! Invariants: The crypto provider is chosen explicitly (aws-lc-rs), never from process defaults.

use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rcgen::{Certificate, CertificateParams, SanType};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sha2::{Digest, Sha256};

use notekeep::api::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TlsMode {
    Off,
    Files { cert: PathBuf, key: PathBuf },
    SelfSigned { cert_out: Option<PathBuf> },
}

impl TlsMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, TlsMode::Off)
    }
}

pub struct TlsMaterial {
    pub server_config: Arc<rustls::ServerConfig>,
    pub fingerprint: String,
}

pub fn load_tls(mode: &TlsMode, bind_ip: IpAddr) -> Result<Option<TlsMaterial>, Error> {
    let (certs, key) = match mode {
        TlsMode::Off => return Ok(None),
        TlsMode::Files { cert, key } => (read_certs(cert)?, read_private_key(key)?),
        TlsMode::SelfSigned { cert_out } => generate_self_signed(bind_ip, cert_out.as_deref())?,
    };
    let fingerprint = certs
        .first()
        .map(|cert| format_cert_fingerprint(cert.as_ref()))
        .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("no certificates found"))?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut server_config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to configure TLS protocol versions")
                .with_source(err)
        })?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("TLS certificate and key do not form a usable pair")
                .with_source(err)
        })?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Some(TlsMaterial {
        server_config: Arc::new(server_config),
        fingerprint,
    }))
}

fn open_pem(path: &Path) -> Result<BufReader<File>, Error> {
    File::open(path).map(BufReader::new).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to open PEM file")
            .with_path(path)
            .with_source(err)
    })
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let mut reader = open_pem(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to parse TLS certificate")
                .with_path(path)
                .with_source(err)
        })?;
    if certs.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("TLS certificate file contains no certificates")
            .with_path(path));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    let mut reader = open_pem(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to parse TLS private key")
                .with_path(path)
                .with_source(err)
        })?
        .ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("TLS key file contains no private key")
                .with_path(path)
        })
}

fn generate_self_signed(
    bind_ip: IpAddr,
    cert_out: Option<&Path>,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), Error> {
    let mut params = CertificateParams::new(vec!["localhost".to_string()]);
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    if !bind_ip.is_unspecified() && !bind_ip.is_loopback() {
        params.subject_alt_names.push(SanType::IpAddress(bind_ip));
    }
    let cert = Certificate::from_params(params).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to generate self-signed certificate")
            .with_source(err)
    })?;
    // Each serialize call re-signs, so the served DER is decoded from the one PEM we keep.
    let cert_pem = cert.serialize_pem().map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode self-signed certificate")
            .with_source(err)
    })?;
    let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to decode self-signed certificate")
                .with_source(err)
        })?;
    if let Some(path) = cert_out {
        write_cert_pem(path, &cert_pem)?;
    }
    let key_der = PrivatePkcs8KeyDer::from(cert.serialize_private_key_der());
    Ok((certs, PrivateKeyDer::Pkcs8(key_der)))
}

fn write_cert_pem(path: &Path, cert_pem: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create certificate directory")
                .with_path(parent)
                .with_source(err)
        })?;
    }
    std::fs::write(path, cert_pem).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write TLS certificate")
            .with_path(path)
            .with_source(err)
    })
}

pub fn format_cert_fingerprint(cert_der: &[u8]) -> String {
    let digest = Sha256::digest(cert_der);
    let mut output = String::from("SHA256:");
    for (idx, byte) in digest.iter().enumerate() {
        if idx > 0 {
            output.push(':');
        }
        output.push_str(&format!("{byte:02X}"));
    }
    output
}
