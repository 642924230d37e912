//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load and check PEM certificate chain and private key
//! - Optionally generate a self-signed pair for development
//! - Apply the failure policy (abort or fall back to plain HTTP)
//! - Serve an Axum app over HTTPS

use std::fs;
use std::future::Future;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use axum::{Extension, Router};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{TlsConfig, TlsFailurePolicy};
use crate::http::ForwardedProto;

const SELF_SIGNED_SUBJECT: &str = "/C=US/ST=State/L=City/O=Organization/CN=localhost";

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("{kind} file not found: {}", path.display())]
    NotFound { kind: &'static str, path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed PEM in {}: {source}", path.display())]
    Pem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("certificate and key rejected: {0}")]
    Rejected(#[source] io::Error),

    #[error("self-signed certificate generation failed: {0}")]
    Generate(String),
}

/// Load TLS configuration from certificate and key files.
///
/// Files are read and parsed up front so a bad path or PEM produces a
/// descriptive error instead of a handshake failure later.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    let cert = read_file("certificate", cert_path)?;
    let key = read_file("private key", key_path)?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(cert.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }

    let private_key = rustls_pemfile::private_key(&mut BufReader::new(key.as_slice())).map_err(|source| {
        TlsError::Pem {
            path: key_path.to_path_buf(),
            source,
        }
    })?;
    if private_key.is_none() {
        return Err(TlsError::NoPrivateKey(key_path.to_path_buf()));
    }

    RustlsConfig::from_pem(cert, key).await.map_err(TlsError::Rejected)
}

fn read_file(kind: &'static str, path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => TlsError::NotFound {
            kind,
            path: path.to_path_buf(),
        },
        _ => TlsError::Read {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Generate a self-signed pair with the `openssl` CLI when neither file
/// exists. Returns whether a pair was generated.
pub fn ensure_self_signed(cert_path: &Path, key_path: &Path) -> Result<bool, TlsError> {
    if cert_path.exists() || key_path.exists() {
        return Ok(false);
    }

    for path in [cert_path, key_path] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| TlsError::Generate(err.to_string()))?;
        }
    }

    tracing::warn!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "Generating self-signed certificate; browsers will not trust it"
    );

    run_openssl(&["genrsa", "-out", &key_path.to_string_lossy(), "2048"])?;
    run_openssl(&[
        "req",
        "-new",
        "-x509",
        "-key",
        &key_path.to_string_lossy(),
        "-out",
        &cert_path.to_string_lossy(),
        "-days",
        "365",
        "-subj",
        SELF_SIGNED_SUBJECT,
    ])?;
    Ok(true)
}

fn run_openssl(args: &[&str]) -> Result<(), TlsError> {
    let output = Command::new("openssl")
        .args(args)
        .output()
        .map_err(|err| TlsError::Generate(format!("could not run openssl: {err}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(TlsError::Generate(format!(
            "openssl {} exited with {}: {}",
            args.first().copied().unwrap_or_default(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Prepare TLS for a listener set, applying `on_error`.
///
/// `Ok(None)` means TLS is unavailable and the caller should serve plain
/// HTTP; it is only returned under the fallback policy.
pub async fn resolve_tls(config: &TlsConfig) -> Result<Option<RustlsConfig>, TlsError> {
    match prepare(config).await {
        Ok(rustls) => Ok(Some(rustls)),
        Err(err) => match config.on_error {
            TlsFailurePolicy::Abort => Err(err),
            TlsFailurePolicy::FallbackHttp => {
                tracing::warn!(error = %err, "TLS unavailable, serving plain HTTP only");
                Ok(None)
            }
        },
    }
}

async fn prepare(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let cert = Path::new(&config.cert_path);
    let key = Path::new(&config.key_path);
    if config.generate_self_signed {
        ensure_self_signed(cert, key)?;
    }
    load_tls_config(cert, key).await
}

/// Serve `app` over HTTPS until `shutdown` resolves, then drain for at most
/// `drain`.
pub async fn serve_https<F>(
    listener: TcpListener,
    app: Router,
    config: RustlsConfig,
    shutdown: F,
    drain: Duration,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(Some(drain));
    });

    tracing::info!(address = %addr, "HTTPS server starting");
    let app = app.layer(Extension(ForwardedProto::Https));
    axum_server::from_tcp_rustls(listener.into_std()?, config)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    tracing::info!(address = %addr, "HTTPS server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tls_config(dir: &TempDir, on_error: TlsFailurePolicy) -> TlsConfig {
        TlsConfig {
            bind_address: "127.0.0.1:0".into(),
            cert_path: dir.path().join("cert.pem").to_string_lossy().into_owned(),
            key_path: dir.path().join("key.pem").to_string_lossy().into_owned(),
            on_error,
            generate_self_signed: false,
        }
    }

    #[tokio::test]
    async fn missing_certificate_is_named() {
        let dir = TempDir::new().unwrap();
        let err = load_tls_config(&dir.path().join("cert.pem"), &dir.path().join("key.pem"))
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::NotFound { kind: "certificate", .. }));
        assert!(err.to_string().contains("cert.pem"));
    }

    #[tokio::test]
    async fn pem_without_certificates_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        fs::write(&cert, "not a pem file").unwrap();
        fs::write(&key, "not a pem file").unwrap();
        let err = load_tls_config(&cert, &key).await.unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }

    #[tokio::test]
    async fn abort_policy_surfaces_error() {
        let dir = TempDir::new().unwrap();
        let result = resolve_tls(&tls_config(&dir, TlsFailurePolicy::Abort)).await;
        assert!(matches!(result, Err(TlsError::NotFound { .. })));
    }

    #[tokio::test]
    async fn fallback_policy_degrades_to_http() {
        let dir = TempDir::new().unwrap();
        let result = resolve_tls(&tls_config(&dir, TlsFailurePolicy::FallbackHttp)).await;
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn existing_files_are_not_regenerated() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        fs::write(&cert, "existing").unwrap();
        assert!(!ensure_self_signed(&cert, &dir.path().join("key.pem")).unwrap());
        assert_eq!(fs::read_to_string(&cert).unwrap(), "existing");
    }
}
