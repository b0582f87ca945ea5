use anyhow::Result;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use sysinfo::System;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tunecast::api::handlers::{
    create_session, delete_session, get_queue, info, list_sessions, mute, next, pause, play, previous,
    recent_searches, report_widget, search, search_suggestions, seek, select_seed, set_volume, toggle_loop,
    toggle_repeat, toggle_shuffle, unmute, version, ws_embed, ws_events,
};
use tunecast::cli::{self, CliAction};
use tunecast::config::load_config;
use tunecast::middleware::auth::auth_middleware;
use tunecast::state::AppState;
use tunecast::utils::fmt::format_ram_mb;

#[tokio::main]
async fn main() -> Result<()> {
    match cli::parse_args() {
        CliAction::PrintVersion => {
            cli::print_version();
            return Ok(());
        }
        CliAction::InitConfig => {
            cli::init_config_file(cli::default_config_path());
            return Ok(());
        }
        CliAction::RunServer => {}
    }
    let cfg = load_config();
    let logs_dir_str = std::env::var("TUNECAST_LOG_DIR").unwrap_or_else(|_| ".logs".into());
    let logs_dir = std::path::Path::new(&logs_dir_str);

    let stdout_layer = fmt::layer().with_target(false).compact();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter).with(stdout_layer);

    // Keeps the non-blocking writer flushing until main returns.
    let _guard_file;
    match std::fs::create_dir_all(logs_dir) {
        Ok(()) => {
            if cfg.clean_log_on_start {
                let log_path = logs_dir.join("latest.log");
                if let Ok(f) =
                    std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(&log_path)
                {
                    drop(f);
                }
            }
            let file_appender = rolling::never(logs_dir, "latest.log");
            let (file_nb, guard) = tracing_appender::non_blocking(file_appender);
            _guard_file = Some(guard);
            let file_layer = fmt::layer().with_ansi(false).with_target(false).with_writer(file_nb).compact();
            registry.with(file_layer).init();
        }
        Err(e) => {
            _guard_file = None;
            eprintln!("File logging disabled (cannot create {}): {}", logs_dir.display(), e);
            registry.init();
        }
    }

    let mut sys = System::new_all();
    sys.refresh_all();
    let version_str = env!("CARGO_PKG_VERSION");
    let os = System::name().unwrap_or_else(|| "Unknown OS".into());
    let os_ver = System::os_version().unwrap_or_default();
    let total_mem_mb = sys.total_memory() / (1024 * 1024);
    let cpu_brand = sys.cpus().first().map(|c| c.brand().to_string()).unwrap_or_else(|| "Unknown CPU".into());
    if total_mem_mb == 0 {
        warn!("Unable to determine RAM size");
    }

    info!(
        version = version_str,
        os = %format!("{} {}", os, os_ver),
        cpu = %cpu_brand,
        ram_mb = %format_ram_mb(total_mem_mb),
        "Tunecast server starting"
    );

    let state = AppState::from_config(cfg);
    info!(catalog = state.catalog.name(), "catalog ready");

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .ok();

    let app = Router::new()
        .route("/v0/search", get(search))
        .route("/v0/search/suggestions", get(search_suggestions))
        .route("/v0/search/recent", get(recent_searches))
        .route("/v0/sessions", post(create_session))
        .route("/v0/sessions", get(list_sessions))
        .route("/v0/sessions/{id}", delete(delete_session))
        .route("/v0/sessions/{id}/seed", post(select_seed))
        .route("/v0/sessions/{id}/next", post(next))
        .route("/v0/sessions/{id}/previous", post(previous))
        .route("/v0/sessions/{id}/play", post(play))
        .route("/v0/sessions/{id}/pause", post(pause))
        .route("/v0/sessions/{id}/shuffle", post(toggle_shuffle))
        .route("/v0/sessions/{id}/repeat", post(toggle_repeat))
        .route("/v0/sessions/{id}/loop", post(toggle_loop))
        .route("/v0/sessions/{id}/mute", post(mute))
        .route("/v0/sessions/{id}/unmute", post(unmute))
        .route("/v0/sessions/{id}/volume", patch(set_volume))
        .route("/v0/sessions/{id}/seek", post(seek))
        .route("/v0/sessions/{id}/widget", post(report_widget))
        .route("/v0/sessions/{id}/queue", get(get_queue))
        .route("/v0/sessions/{id}/embed", get(ws_embed))
        .route("/v0/sessions/{id}/events", get(ws_events))
        .route("/info", get(info))
        .route("/version", get(version))
        .with_state(state.clone())
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware));

    let bind_addr = (state.cfg.host.as_str(), state.cfg.port);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %format!("{}:{}", state.cfg.host, state.cfg.port), "Listening");

    tokio::select! {
        res = axum::serve(listener, app) => {
            if let Err(e) = res { tracing::error!(?e, "server error"); }
        }
        _ = shutdown_rx.recv() => { info!("Shutdown signal received"); }
    }

    let open: Vec<_> = state.sessions.iter().map(|e| e.value().clone()).collect();
    state.sessions.clear();
    for entry in open {
        entry.session.close().await;
    }

    Ok(())
}
