use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keygate::cache::{CounterStore, MemoryCounterStore, RedisCounterStore};
use keygate::config::{self, Config, CounterBackend};
use keygate::registry::CredentialRegistry;
use keygate::store::postgres::PgStore;
use keygate::{api, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // OTLP export is opt-in: only when OTEL_EXPORTER_OTLP_ENDPOINT is set.
    use opentelemetry::KeyValue;

    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "keygate"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "keygate=debug,tower_http=debug".into()),
        ))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Key { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            handle_key_command(command, &db, &cfg).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let counters: Arc<dyn CounterStore> = match cfg.counter_backend {
        CounterBackend::Redis => {
            tracing::info!("Connecting to Redis...");
            Arc::new(RedisCounterStore::connect(&cfg.redis_url).await?)
        }
        CounterBackend::Memory => {
            tracing::warn!("Using in-memory counters; quotas are not shared across processes");
            let store = MemoryCounterStore::new();
            spawn_eviction(store.clone());
            Arc::new(store)
        }
    };

    if cfg.admin_key.is_none() {
        tracing::warn!("ADMIN_KEY is not set; the /admin API will refuse every request");
    }

    tracing::info!(
        default_limit = cfg.default_rate_limit,
        default_window_secs = cfg.default_rate_limit_window,
        backend_timeout_ms = cfg.backend_timeout_ms,
        "quota defaults"
    );

    let registry: Arc<dyn CredentialRegistry> = Arc::new(db);
    let state = Arc::new(AppState::new(registry, counters, cfg));

    let app = api::app(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("keygate listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Background sweep so the in-memory counter map does not grow without bound.
fn spawn_eviction(store: MemoryCounterStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = store.evict_expired();
            if evicted > 0 {
                tracing::debug!(evicted, remaining = store.len(), "evicted expired counters");
            }
        }
    });
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with server logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: responses carry API keys and quota state; keep them out of caches.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::http::HeaderValue;

    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.remove("server");

    resp
}

async fn handle_key_command(
    cmd: cli::KeyCommands,
    db: &PgStore,
    cfg: &Config,
) -> anyhow::Result<()> {
    match cmd {
        cli::KeyCommands::Create {
            name,
            limit,
            window,
        } => {
            let issued = db
                .provision(&name, limit.unwrap_or(0), window.unwrap_or(0))
                .await?;
            let defaults = cfg.quota_defaults();
            let limit = issued
                .record
                .limit()
                .unwrap_or(defaults.requests);
            let window = issued
                .record
                .window()
                .unwrap_or(defaults.window)
                .as_secs();
            println!("API key created (shown once, store it now):");
            println!("  Key:    {}", issued.token);
            println!("  ID:     {}", issued.record.id);
            println!("  Name:   {}", issued.record.name);
            println!("  Quota:  {} requests / {}s", limit, window);
        }
        cli::KeyCommands::Revoke { key } => match db.revoke(&key).await {
            Ok(()) => println!("API key deactivated."),
            Err(keygate::registry::RegistryError::Unavailable(e)) => return Err(e),
            Err(_) => println!("API key not found or already inactive."),
        },
    }
    Ok(())
}
