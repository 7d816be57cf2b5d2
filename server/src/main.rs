//! Authoritative Preferans server.
//!
//! One engine task owns the complete game state; axum feeds it WebSocket
//! sessions over a mailbox. The optional store path makes users and game
//! histories survive restarts, the optional TLS material turns the endpoint
//! into `wss://`.

use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pref_server::engine::{Engine, Event};
use pref_server::session::{self, AppState};
use pref_server::store::GameData;
use pref_server::tls;

#[derive(Parser)]
#[command(name = "pref-server", about = "Authoritative Preferans game server")]
struct Args {
    /// Listen address.
    address: IpAddr,
    /// Listen port.
    port: u16,
    /// Path of the persisted game data. Runs purely in memory when omitted.
    data: Option<PathBuf>,
    /// TLS certificate chain (PEM). Activates wss:// together with --key.
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,
    /// TLS private key (PEM).
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true),
        )
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "fatal error during startup");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let store = match &args.data {
        Some(path) => GameData::load(path),
        None => {
            tracing::warn!("game data path not provided, nothing will be persisted");
            GameData::default()
        }
    };

    let (events_tx, events_rx) = mpsc::channel(protocol::ENGINE_MAILBOX_SIZE);
    let game_over = Arc::new(AtomicBool::new(false));
    let engine = Engine::new(store, args.data.clone(), events_tx.clone(), game_over);
    let engine_task = tokio::spawn(engine.run(events_rx));

    let app_state = Arc::new(AppState::new(events_tx.clone()));
    let app = Router::new()
        .route("/ws", get(session::websocket_handler))
        .with_state(app_state);

    let addr = SocketAddr::new(args.address, args.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, tls = args.cert.is_some(), "listening");

    match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            let acceptor = tls::acceptor(cert, key)?;
            tls::serve(listener, acceptor, app, shutdown_signal()).await;
        }
        _ => {
            // sessions are long lived, so we stop serving on the signal
            // instead of draining them
            tokio::select! {
                served = axum::serve(listener, app).into_future() => served?,
                () = shutdown_signal() => {}
            }
        }
    }

    // the engine flushes the store and clears the table on its way out
    let _ = events_tx.send(Event::Shutdown).await;
    let _ = engine_task.await;
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        match signal(SignalKind::interrupt()) {
            Ok(mut interrupt) => {
                interrupt.recv().await;
            }
            Err(error) => {
                tracing::warn!(?error, "could not install the SIGINT handler");
                std::future::pending::<()>().await;
            }
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::warn!(?error, "could not install the SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        () = interrupt => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
