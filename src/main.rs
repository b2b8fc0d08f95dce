use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Json, Path, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Local;
use futures_util::StreamExt;
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde::Serialize;
use serde_json::{json, Value};
use std::{
    fs::OpenOptions,
    io::Write,
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::signal;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{AllowOrigin, CorsLayer};

use storefront_theme::commands::invoke_theme_command;
use storefront_theme::config::ServerConfig;
use storefront_theme::models::default_palette;
use storefront_theme::services::{
    CustomThemeStore, EventSink, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore,
    SessionDraftStore, SitePaletteStore, ThemeCatalog, ThemeEngine,
};

// ============================================================================
// Event Bus
// ============================================================================

#[derive(Clone, Serialize)]
struct ServerEvent {
    event: String,
    payload: Value,
}

#[derive(Clone)]
struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: &str, payload: Value) {
        let _ = self.sender.send(ServerEvent {
            event: event.to_string(),
            payload,
        });
    }
}

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
struct AppState {
    engine: ThemeEngine,
    event_bus: EventBus,
}

#[derive(Serialize)]
struct InvokeResponse {
    ok: bool,
    data: Option<Value>,
    error: Option<String>,
}

// ============================================================================
// Logging
// ============================================================================

/// Our own log targets start with this; everything else is a dependency
const CRATE_TARGET_PREFIX: &str = "storefront_theme";

/// Dependencies (hyper, tower, axum) are held to warnings even at debug level
const DEPENDENCY_LEVEL_CAP: LevelFilter = LevelFilter::Warn;

struct ServerLogger {
    file: Mutex<std::fs::File>,
    event_bus: EventBus,
    level: LevelFilter,
}

impl ServerLogger {
    fn new(
        log_dir: &std::path::Path,
        event_bus: EventBus,
        level: LevelFilter,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join("storefront-theme.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        Ok(Self {
            file: Mutex::new(file),
            event_bus,
            level,
        })
    }
}

fn level_for_target(configured: LevelFilter, target: &str) -> LevelFilter {
    if target.starts_with(CRATE_TARGET_PREFIX) {
        configured
    } else {
        configured.min(DEPENDENCY_LEVEL_CAP)
    }
}

/// Severity as the editor's log panel numbers it
fn severity(level: Level) -> u8 {
    match level {
        Level::Error => 1,
        Level::Warn => 2,
        Level::Info => 3,
        Level::Debug => 4,
        Level::Trace => 5,
    }
}

fn format_line(record: &Record, now: chrono::DateTime<Local>) -> String {
    format!(
        "{} {:<5} {}: {}",
        now.format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for ServerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= level_for_target(self.level, metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record, Local::now());
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }

        // Only our own records are mirrored to the editor
        if record.target().starts_with(CRATE_TARGET_PREFIX) {
            self.event_bus.emit(
                "log://log",
                json!({
                    "level": severity(record.level()),
                    "message": record.args().to_string(),
                    "target": record.target(),
                }),
            );
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

fn init_logger(
    config: &ServerConfig,
    event_bus: EventBus,
) -> Result<(), Box<dyn std::error::Error>> {
    let logger = ServerLogger::new(&config.log_dir, event_bus, config.log_level)?;
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(config.log_level);
    Ok(())
}

// ============================================================================
// CORS Configuration
// ============================================================================

fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let config = config.clone();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|origin| config.origin_allowed(origin))
                .unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.event_bus.subscribe()))
}

async fn handle_socket(mut socket: WebSocket, receiver: broadcast::Receiver<ServerEvent>) {
    let mut events = BroadcastStream::new(receiver);

    while let Some(event) = events.next().await {
        // Lagged receivers skip missed events instead of disconnecting
        let Ok(event) = event else {
            continue;
        };
        if let Ok(payload) = serde_json::to_string(&event) {
            if socket.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    }
}

async fn invoke(
    Path(command): Path<String>,
    State(state): State<AppState>,
    payload: Option<Json<Value>>,
) -> impl IntoResponse {
    let payload = payload.map(|Json(value)| value).unwrap_or(Value::Null);

    match invoke_theme_command(&state.engine, &command, payload).await {
        Ok(data) => {
            let response = InvokeResponse {
                ok: true,
                data: Some(data),
                error: None,
            };
            (StatusCode::OK, Json(response))
        }
        Err(error) => {
            log::warn!("Command '{command}' failed: {error}");
            let response = InvokeResponse {
                ok: false,
                data: None,
                error: Some(error),
            };
            (StatusCode::BAD_REQUEST, Json(response))
        }
    }
}

/// Waits for Ctrl+C or SIGTERM, then writes out any pending draft
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received");
    state.engine.flush_pending();
    log::info!("Theme server shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, config_warnings) = ServerConfig::from_env();

    let event_bus = EventBus::new();
    init_logger(&config, event_bus.clone())?;
    for warning in config_warnings {
        log::warn!("{warning}");
    }

    log::info!("Data directory: {}", config.data_dir.display());
    log::info!("Log directory: {}", config.log_dir.display());

    let durable: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::new(config.data_dir.clone()));
    let ephemeral: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());

    let site_palette = Arc::new(SitePaletteStore::new(Arc::clone(&durable)));
    let initial_palette = site_palette.load().unwrap_or_else(|| {
        log::info!("No stored site palette, starting from the default");
        default_palette()
    });

    let engine = ThemeEngine::builder(
        CustomThemeStore::new(Arc::clone(&durable)),
        SessionDraftStore::new(ephemeral),
        site_palette,
    )
    .catalog(ThemeCatalog::builtin().clone())
    .events(Arc::new(event_bus.clone()))
    .settings(config.engine_settings())
    .initial_palette(initial_palette)
    .build();

    let state = AppState { engine, event_bus };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/invoke/:command", post(invoke))
        .route("/ws", get(ws_handler))
        .with_state(state.clone())
        .layer(build_cors_layer(&config));

    let address = SocketAddr::new(config.host, config.port);
    log::info!("Storefront theme backend listening on http://{address}");

    let listener = tokio::net::TcpListener::bind(address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}
