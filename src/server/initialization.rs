// src/server/initialization.rs

//! Handles the server initialization process: TLS material, the listener and
//! the connection limit.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::{Context, Result, anyhow};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::{TlsAcceptor, rustls};
use tracing::{info, warn};

/// Prepares everything the accept loop needs.
pub async fn setup(state: Arc<ServerState>) -> Result<ServerContext> {
    log_startup_info(&state);

    let acceptor = setup_tls(&state.config)?;

    let config = &state.config;
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!(
        "JT/T 808 gateway listening on {}:{}{}",
        config.host,
        config.port,
        if acceptor.is_some() { " (TLS)" } else { "" }
    );

    Ok(ServerContext::new(state, listener, acceptor))
}

/// Sets up the TLS acceptor if TLS is enabled in the configuration.
fn setup_tls(config: &Config) -> Result<Option<TlsAcceptor>> {
    if config.tls.enabled {
        info!("TLS is enabled. Loading certificate and key.");
        let certs = load_certs(&config.tls.cert_path)?;
        let key = load_key(&config.tls.key_path)?;
        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
    } else {
        Ok(None)
    }
}

/// Loads TLS certificates from a PEM file.
fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let cert_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open certificate file '{}': {}", path, e))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(anyhow!("No certificates found in '{}'", path));
    }
    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let key_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open private key file '{}': {}", path, e))?;
    let mut key_reader = BufReader::new(key_file);
    rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow!("No private key found in key file '{}'", path))
}

/// Logs key configuration parameters at startup.
fn log_startup_info(state: &ServerState) {
    let config = &state.config;
    info!(
        "{} message types registered; max {} connections.",
        state.message_types.len(),
        config.max_connections
    );
    match config.session.idle_timeout() {
        Some(timeout) => info!("Idle connections close after {:?}.", timeout),
        None => warn!("Idle timeout disabled. Silent connections stay open indefinitely."),
    }
    if config.session.close_superseded {
        info!("Connections whose terminal rebinds elsewhere will be closed.");
    }
}
