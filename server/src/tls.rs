//! Optional TLS front so the server speaks `wss://`.
//!
//! axum's plain `serve` handles the cleartext case; with TLS material we
//! accept, handshake and then hand every stream to hyper ourselves.

use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("could not read TLS material: {0}")]
    Io(#[from] std::io::Error),
    #[error("no private key found in the key file")]
    MissingKey,
    #[error("invalid TLS material: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
}

/// Builds the acceptor from PEM encoded certificate chain and private key.
pub fn acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert)?))
        .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key)?))?
        .ok_or(TlsError::MissingKey)?;
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept loop for the TLS endpoint. Stops accepting once `shutdown`
/// resolves; running sessions keep their tasks until the process exits.
pub async fn serve(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        tracing::warn!(?error, "accept failed");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let app = app.clone();
                tokio::spawn(async move {
                    let stream = match acceptor.accept(stream).await {
                        Ok(stream) => stream,
                        Err(error) => {
                            tracing::warn!(?error, %peer, "TLS handshake failed");
                            return;
                        }
                    };
                    let service = TowerToHyperService::new(app);
                    if let Err(error) = Builder::new(TokioExecutor::new())
                        .serve_connection_with_upgrades(TokioIo::new(stream), service)
                        .await
                    {
                        tracing::debug!(?error, %peer, "connection ended");
                    }
                });
            }
        }
    }
}
