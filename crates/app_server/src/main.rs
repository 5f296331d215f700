use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use auth::AuthService;
use config::{ConfigStore, EnvConfig};
use desktop_bridge::{DesktopBridge, HeadlessHost, ShellExit};
use model_client::HttpModelBackend;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use web_api::AppState;

const DEFAULT_LOG_FILTER: &str = "info,app_server=debug,web_api=debug";

fn main() {
    let _ = dotenvy::dotenv();

    let env = match EnvConfig::from_env().and_then(|env| env.validate().map(|()| env)) {
        Ok(env) => Arc::new(env),
        Err(err) => {
            eprintln!("invalid environment: {err}");
            std::process::exit(1);
        }
    };

    let config_store = match ConfigStore::from_default_location() {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to locate config dir: {err:#}");
            std::process::exit(1);
        }
    };
    let data_dir = match config_store.load_or_init() {
        Ok(config) => config.data_dir,
        Err(err) => {
            eprintln!("failed to load shell config: {err:#}");
            None
        }
    };
    let _log_guard = init_logger(data_dir.as_deref());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            error!("failed to create tokio runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(env, config_store)) {
        Ok(Some(ShellExit::Restart)) => {
            drop(runtime);
            if let Err(err) = relaunch() {
                error!("failed to restart: {err:#}");
                std::process::exit(1);
            }
        }
        Ok(_) => info!("bye"),
        Err(err) => {
            error!("server failed: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run(env: Arc<EnvConfig>, config_store: ConfigStore) -> Result<Option<ShellExit>> {
    let idle_minutes = env.session_idle_minutes;
    let auth = AuthService::new(
        env.runtime_mode,
        chrono::Duration::minutes(idle_minutes as i64),
    );
    let mut state = AppState::new(
        env.clone(),
        config_store.clone(),
        auth,
        Arc::new(HttpModelBackend::new()),
    );

    let mut exit_rx = None;
    if env.runtime_mode.is_desktop() {
        let (host, rx) = HeadlessHost::new();
        let bridge = Arc::new(DesktopBridge::new(Arc::new(host), config_store, env.clone()));
        bridge.arm_idle_logout(Duration::from_secs(idle_minutes.saturating_mul(60)));
        state = state.with_bridge(bridge);
        exit_rx = Some(rx);
    }

    if let Err(err) = state.reload_storage().await {
        warn!("database unavailable: {err:#}");
    }
    if let Some(storage) = state.storage() {
        storage.delete_expired_sessions().await?;
        info!("expired cookie sessions removed");
    }

    let listener = TcpListener::bind(&env.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", env.bind_addr))?;
    info!(mode = ?env.runtime_mode, base_path = %env.base_path, "promptcraft starting");

    let router = web_api::build_router(state);
    let shutdown_rx = exit_rx.clone();
    web_api::serve(listener, router, async move {
        match shutdown_rx {
            Some(mut rx) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = wait_for_exit(&mut rx) => {}
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        info!("shutdown requested");
    })
    .await?;

    Ok(exit_rx.and_then(|rx| *rx.borrow()))
}

async fn wait_for_exit(rx: &mut watch::Receiver<Option<ShellExit>>) {
    loop {
        if rx.borrow_and_update().is_some() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn relaunch() -> Result<()> {
    let exe = std::env::current_exe().context("failed to resolve current executable")?;
    let child = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .spawn()
        .with_context(|| format!("failed to spawn {}", exe.display()))?;
    info!(pid = child.id(), "restarted");
    Ok(())
}

fn init_logger(data_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let Some(data_dir) = data_dir else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let log_dir = data_dir.join("logs");
    if let Err(err) = fs::create_dir_all(&log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(&log_dir, "promptcraft.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    Some(guard)
}
