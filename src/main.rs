mod api;
mod config;
mod http;
mod metrics;
mod orchestrator;
mod scheduler;
mod state;

use api::client::ApiClient;
use axum::serve;
use clap::Parser;
use config::Config;
use metrics::Metrics;
use orchestrator::Orchestrator;
use scheduler::PollingScheduler;
use serde::Serialize;
use state::{Snapshot, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostdash")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Переопределяет api_base_url из файла конфигурации
    #[arg(long)]
    api_base_url: Option<String>,
    /// Один полный опрос, снимок в stdout в формате JSON
    #[arg(long, conflicts_with = "search")]
    once: bool,
    /// Поиск процессов по имени, результат в stdout в формате JSON
    #[arg(long, conflicts_with = "once")]
    search: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };
    if let Some(url) = cli.api_base_url {
        cfg.api_base_url = url;
        if let Err(err) = cfg.validate() {
            error!(error = %err, "некорректный --api-base-url");
            std::process::exit(1);
        }
    }

    let periods = match cfg.poll_periods() {
        Ok(periods) => periods,
        Err(err) => {
            error!(error = %err, "некорректные периоды опроса");
            std::process::exit(1);
        }
    };
    let client = match ApiClient::new(&cfg.api_base_url, cfg.request_timeout()) {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "не удалось создать HTTP-клиент");
            std::process::exit(1);
        }
    };
    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };

    info!(
        api = %client.base_url(),
        listen = ?cfg.listen,
        "запуск hostdash"
    );

    let store = Arc::new(Store::new());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(client),
        store.clone(),
        metrics.clone(),
        cfg.top_processes_limit,
    ));

    if cli.once {
        let generation = store.begin_generation();
        orchestrator.fetch_all(generation).await;
        store.retire_generation();
        let snapshot = store.current();
        print_json(&snapshot);
        if !snapshot.connected {
            std::process::exit(1);
        }
        return;
    }
    if let Some(query) = cli.search {
        print_json(&orchestrator.search_processes(&query).await);
        return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = cfg.listen.clone().map(|listen| {
        let app = http::build_router(metrics.clone(), store.clone(), orchestrator.clone());
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "некорректный адрес listen");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "не удалось запустить HTTP-сервер");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    });

    let view_task = {
        let metrics = metrics.clone();
        let mut snapshots = store.subscribe();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut last_connected: Option<bool> = None;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = snapshots.borrow_and_update().clone();
                        metrics.update_from_snapshot(&snapshot);
                        report_snapshot(&snapshot, &mut last_connected);
                    }
                }
            }
        })
    };

    let mut scheduler = PollingScheduler::new(orchestrator, metrics, periods);
    scheduler.start();

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    scheduler.stop();
    let _ = shutdown_tx.send(true);

    let _ = view_task.await;
    if let Some(task) = http_task {
        let _ = task.await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            error!(error = %err, "не удалось сериализовать результат");
            std::process::exit(1);
        }
    }
}

/// Connectivity transitions go to `info`/`warn`, routine revisions to `debug`.
fn report_snapshot(snapshot: &Snapshot, last_connected: &mut Option<bool>) {
    let cpu = snapshot.cpu_usage.as_ref().map(|c| c.cpu_usage_percent);
    let memory = snapshot.memory_usage.as_ref().map(|m| m.percent);
    let host = snapshot.system.as_ref().map(|s| s.hostname.as_str());

    if *last_connected != Some(snapshot.connected) {
        if snapshot.connected {
            info!(host = ?host, "соединение с API метрик установлено");
            *last_connected = Some(true);
        } else if let Some(err) = &snapshot.last_error {
            warn!(
                tier = %err.tier,
                endpoint = %err.endpoint,
                error = %err.message,
                "нет связи с API метрик, показаны последние данные"
            );
            *last_connected = Some(false);
        }
    }

    debug!(
        revision = snapshot.revision,
        connected = snapshot.connected,
        cpu_percent = ?cpu,
        memory_percent = ?memory,
        "снимок обновлён"
    );
}
