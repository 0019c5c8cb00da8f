// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backend HTTP server
//!
//! | Route | Behaviour |
//! |-------|-----------|
//! | `GET /health` | uptime and router connection state |
//! | `GET /swarms` | full registry listing |
//! | `GET /swarms/{alias}` | one record, 404 if unknown |
//! | `POST /launch` | `swarm_launch`; alias reserved until the router answers |
//! | `POST /inject/{alias}` | `inject` to all nodes or one index |
//! | `POST /terminate/{alias}` | `swarm_terminate` |
//! | `GET /ws` | dashboard feed from the fan-out hub |
//!
//! Command endpoints answer as soon as the command is queued; the outcome
//! arrives later on `/ws` correlated by the returned `request_id`.

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use codeswarm_core::domain::config::BackendConfig;
use codeswarm_core::domain::protocol::{Command, NodeTarget, RequestId};
use codeswarm_core::infrastructure::{
    EventBus, EventBusError, RouterClient, TcpTransport, Transport, TransportConfig,
};
use codeswarm_sdk::{CommandAccepted, InjectRequest, LaunchRequest};
use codeswarm_swarm::application::{EventProcessor, SwarmRegistryService};
use codeswarm_swarm::infrastructure::JsonSwarmRepository;

use super::pump::{run_event_loop, run_status_poller};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SwarmRegistryService>,
    pub router: RouterClient,
    pub hub: EventBus,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(registry: Arc<SwarmRegistryService>, router: RouterClient, hub: EventBus) -> Self {
        Self {
            registry,
            router,
            hub,
            start_time: Instant::now(),
        }
    }
}

/// Run the backend in the foreground until Ctrl+C or SIGTERM.
///
/// Fails only if the router cannot be reached within the connect deadline
/// or the listen address cannot be bound.
pub async fn start_backend(config: BackendConfig) -> Result<()> {
    let spec = &config.spec;

    let repository = Arc::new(JsonSwarmRepository::new(spec.state.resolved_path()));
    let registry = Arc::new(
        SwarmRegistryService::new(repository)
            .with_reservation_ttl(spec.server.launch_reservation_ttl()),
    );
    info!(
        "Loaded {} swarm(s) from {}",
        registry.list().len(),
        spec.state.resolved_path().display()
    );

    info!("Connecting to router at {}", spec.router.address());
    let transport = TcpTransport::connect(TransportConfig::from(&spec.router))
        .await
        .context("Failed to connect to router")?;
    let transport: Arc<dyn Transport> = Arc::new(transport);
    let router = RouterClient::new(transport.clone());
    let hub = EventBus::new(spec.hub.capacity);
    let cancel = CancellationToken::new();

    let processor = EventProcessor::new(registry.clone());
    let event_loop = tokio::spawn(run_event_loop(
        processor,
        router.clone(),
        hub.clone(),
        cancel.clone(),
    ));

    if spec.status_poll.enabled {
        info!(
            "Status polling enabled every {}s",
            spec.status_poll.interval_secs
        );
        tokio::spawn(run_status_poller(
            registry.clone(),
            router.clone(),
            spec.status_poll.interval(),
            cancel.clone(),
        ));
    }

    let app = build_router(AppState::new(registry, router, hub));

    let addr = spec.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Backend listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    info!("Backend shutting down");
    cancel.cancel();
    transport.close();
    let _ = event_loop.await;

    served
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/swarms", get(list_swarms_handler))
        .route("/swarms/{alias}", get(get_swarm_handler))
        .route("/launch", post(launch_handler))
        .route("/inject/{alias}", post(inject_handler))
        .route("/terminate/{alias}", post(terminate_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// JSON error body `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unknown_swarm() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Unknown swarm")
    }

    fn router_unavailable(e: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Router unavailable: {}", e),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type AppResult<T> = std::result::Result<T, ApiError>;

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let connection = state.router.transport().connection_state().borrow().clone();
    let status = if connection.is_connected() {
        "healthy"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "router": connection,
        "swarms": state.registry.list().len(),
        "dashboards": state.hub.subscriber_count(),
    }))
}

async fn list_swarms_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::to_value(state.registry.list()).unwrap_or_else(|_| json!([])))
}

async fn get_swarm_handler(
    State(state): State<Arc<AppState>>,
    Path(alias): Path<String>,
) -> AppResult<Json<Value>> {
    let record = state
        .registry
        .get_by_alias(&alias)
        .ok_or_else(ApiError::unknown_swarm)?;
    Ok(Json(record.to_value()))
}

async fn launch_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LaunchRequest>,
) -> AppResult<Json<CommandAccepted>> {
    if request.nodes < 1 {
        return Err(ApiError::bad_request("nodes must be at least 1"));
    }

    let request_id = RequestId::new();
    let alias = request
        .alias
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);

    if let Some(alias) = &alias {
        state
            .registry
            .reserve_alias(request_id.clone(), alias)
            .map_err(|e| ApiError::new(StatusCode::CONFLICT, e.to_string()))?;
    }

    let command = Command::SwarmLaunch {
        nodes: request.nodes,
        system_prompt: request.prompt,
    };
    if let Err(e) = state.router.send_with_id(&command, request_id.clone()) {
        state.registry.take_reservation(&request_id);
        return Err(ApiError::router_unavailable(e));
    }

    info!(request_id = %request_id, nodes = request.nodes, "Launch requested");
    Ok(Json(CommandAccepted {
        request_id: request_id.to_string(),
        alias,
    }))
}

async fn inject_handler(
    State(state): State<Arc<AppState>>,
    Path(alias): Path<String>,
    Json(request): Json<InjectRequest>,
) -> AppResult<Json<CommandAccepted>> {
    let record = state
        .registry
        .get_by_alias(&alias)
        .ok_or_else(ApiError::unknown_swarm)?;

    if let NodeTarget::Node(index) = request.nodes {
        if record.node_count > 0 && index >= record.node_count {
            return Err(ApiError::bad_request(format!(
                "Node {} is out of range for a {}-node swarm",
                index, record.node_count
            )));
        }
    }

    let request_id = state
        .router
        .inject(record.swarm_id.as_str(), request.nodes, request.prompt)
        .map_err(ApiError::router_unavailable)?;

    debug!(request_id = %request_id, swarm_id = %record.swarm_id, "Inject requested");
    Ok(Json(CommandAccepted {
        request_id: request_id.to_string(),
        alias: Some(record.alias),
    }))
}

async fn terminate_handler(
    State(state): State<Arc<AppState>>,
    Path(alias): Path<String>,
) -> AppResult<Json<CommandAccepted>> {
    let record = state
        .registry
        .get_by_alias(&alias)
        .ok_or_else(ApiError::unknown_swarm)?;

    let request_id = state
        .router
        .terminate(record.swarm_id.as_str())
        .map_err(ApiError::router_unavailable)?;

    info!(request_id = %request_id, swarm_id = %record.swarm_id, "Terminate requested");
    Ok(Json(CommandAccepted {
        request_id: request_id.to_string(),
        alias: Some(record.alias),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_dashboard_socket(socket, state.hub.clone()))
}

/// Relay hub messages to one dashboard until either side goes away.
async fn handle_dashboard_socket(socket: WebSocket, hub: EventBus) {
    let mut messages = hub.subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!("Dashboard connected ({} total)", hub.subscriber_count());

    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Ok(message) => {
                    if sender.send(Message::Text(message.to_json().into())).await.is_err() {
                        break;
                    }
                }
                Err(EventBusError::Lagged(skipped)) => {
                    warn!("Dashboard fell behind, skipped {} message(s)", skipped);
                }
                Err(_) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Dashboard disconnected");
}
