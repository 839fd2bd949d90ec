//! rxmon binary: replays a recorded data file into a monitoring session.
//!
//! Loads configuration, initialises structured logging, pumps the data file
//! through a [`Session`], and prints the materialised graph once the
//! recording ends or the process is interrupted.

mod config;
mod summary;

use rxmon_model::{ConnectionState, Session, SessionConfig};
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("RXMON_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("rxmon.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; rxmon cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let Some(data_file) = config.replay.path.clone() else {
        tracing::error!("no data file configured; set replay.path or RXMON_DATA_FILE");
        std::process::exit(2);
    };

    let reader = match rxmon_datafile::open(&data_file).await {
        Ok(reader) => reader.with_max_record_bytes(config.session.max_record_bytes),
        Err(e) => {
            tracing::error!(path = %data_file, error = %e, "failed to open data file");
            std::process::exit(1);
        }
    };

    let session = Session::new(SessionConfig {
        start_paused: config.session.start_paused,
    });
    session.attach(rxmon_datafile::ingest_stream(reader));
    if session.is_paused() {
        tracing::info!("session starts paused; sequenced records stay held until interrupted");
    }

    let mut connection = session.watch_connection();
    let outcome = tokio::select! {
        state = connection.wait_for(ConnectionState::is_finished) => {
            state.map(|s| s.clone()).unwrap_or(ConnectionState::Disconnected)
        }
        () = shutdown_signal() => session.connection_state(),
    };
    session.shutdown();
    tracing::info!(session = %session.id(), state = %outcome, "replay finished");

    let model = session.model();
    let mut rendered = String::new();
    if summary::render(model, &mut rendered).is_ok() {
        print!("{rendered}");
    }
    match serde_json::to_string_pretty(&model.stats()) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "failed to encode stats"),
    }

    let diagnostics = session.diagnostics().len();
    if diagnostics > 0 {
        tracing::warn!(count = diagnostics, "replay reported problems");
    }
    if matches!(outcome, ConnectionState::Failed(_)) {
        std::process::exit(1);
    }
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, stopping replay"); }
        () = terminate => { tracing::info!("received SIGTERM, stopping replay"); }
    }
}
