//! TLS material for the HTTPS listener.
//!
//! On first start the proxy writes a self-signed certificate for
//! `localhost` next to itself; later starts reuse the existing pair.

use std::fs::{self, File};
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, KeyPair, RsaKeySize, SanType, PKCS_RSA_SHA256,
};
use rustls::ServerConfig;
use thiserror::Error;

/// Validity of a generated certificate.
pub const CERT_VALIDITY_DAYS: u64 = 365;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("only one of {cert} and {key} exists")]
    Incomplete { cert: PathBuf, key: PathBuf },

    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// Paths of a certificate and its private key, both PEM.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Reuse the PEM pair if both files exist, otherwise generate one.
///
/// Returns `true` when a new pair was written.
pub fn ensure_material(material: &TlsMaterial) -> Result<bool, TlsError> {
    match (material.cert_path.exists(), material.key_path.exists()) {
        (true, true) => Ok(false),
        (false, false) => {
            generate_self_signed(material)?;
            Ok(true)
        }
        _ => Err(TlsError::Incomplete {
            cert: material.cert_path.clone(),
            key: material.key_path.clone(),
        }),
    }
}

/// Write an RSA-2048 / SHA-256 certificate for `localhost` and `127.0.0.1`,
/// valid for [`CERT_VALIDITY_DAYS`] from today, plus its PKCS#8 key.
pub fn generate_self_signed(material: &TlsMaterial) -> Result<(), TlsError> {
    let key_pair = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_2048)?;

    let mut params = CertificateParams::default();
    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, "matte");
    name.push(DnType::CommonName, "localhost");
    params.distinguished_name = name;
    params.subject_alt_names = vec![
        SanType::DnsName("localhost".try_into()?),
        SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
    ];

    let ymd = |date: NaiveDate| {
        rcgen::date_time_ymd(date.year(), date.month() as u8, date.day() as u8)
    };
    let today = Utc::now().date_naive();
    let expires = today
        .checked_add_days(Days::new(CERT_VALIDITY_DAYS))
        .unwrap_or(NaiveDate::MAX);
    params.not_before = ymd(today);
    params.not_after = ymd(expires);

    let cert = params.self_signed(&key_pair)?;

    write_file(&material.cert_path, cert.pem().as_bytes(), false)?;
    write_file(&material.key_path, key_pair.serialize_pem().as_bytes(), true)?;
    Ok(())
}

fn write_file(path: &Path, contents: &[u8], private: bool) -> Result<(), TlsError> {
    let wrap = |source| TlsError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    fs::write(path, contents).map_err(wrap)?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(wrap)?;
    }
    #[cfg(not(unix))]
    let _ = private;

    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Load the PEM pair into a rustls server config (HTTP/1.1 only).
pub fn load_server_config(material: &TlsMaterial) -> Result<Arc<ServerConfig>, TlsError> {
    let read_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TlsError::Read { path, source }
    };

    let certs = rustls_pemfile::certs(&mut open(&material.cert_path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err(&material.cert_path))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(material.cert_path.clone()));
    }

    let key = rustls_pemfile::private_key(&mut open(&material.key_path)?)
        .map_err(read_err(&material.key_path))?
        .ok_or_else(|| TlsError::NoPrivateKey(material.key_path.clone()))?;

    // Pin the provider: the process may link more than one.
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}
