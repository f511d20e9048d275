//! traQ bot webhook server for Ichika.
//!
//! traQ delivers bot events as `POST /` with the verification token and the
//! event name in headers. `MESSAGE_CREATED` events run through the
//! orchestrator and the answer is posted back to the origin channel before
//! the request is acknowledged.
//!
//! Built on Axum.

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use ichika_agent::Orchestrator;
use ichika_channels::traq::event::verify_token;
use ichika_channels::traq::{MessageCreatedPayload, TraqApiError, WebhookEvent};
use ichika_channels::{TraqChannel, TraqClient, TraqIngress};
use ichika_config::{AppConfig, ConfigError};
use ichika_core::channel::Channel;
use ichika_core::error::{ProviderError, ToolError};
use ichika_core::provider::Provider;

/// Verification token header.
pub const TOKEN_HEADER: &str = "X-TRAQ-BOT-TOKEN";
/// Event name header.
pub const EVENT_HEADER: &str = "X-TRAQ-BOT-EVENT";
const LEGACY_TOKEN_HEADER: &str = "X-BOT-TOKEN";
const LEGACY_EVENT_HEADER: &str = "X-BOT-EVENT";

const BODY_LIMIT_BYTES: usize = 1024 * 1024;
const EVICTION_INTERVAL: Duration = Duration::from_secs(600);

/// Errors while assembling or running the server.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("traQ client: {0}")]
    Traq(#[from] TraqApiError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state for the webhook server.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    /// Where answers are delivered
    pub channel: Arc<dyn Channel>,
    pub ingress: TraqIngress,
    pub verification_token: String,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        channel: Arc<dyn Channel>,
        ingress: TraqIngress,
        verification_token: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            channel,
            ingress,
            verification_token: verification_token.into(),
        }
    }

    /// Wire the orchestrator, tools and traQ delivery from configuration.
    ///
    /// Requires `BOT_ACCESS_TOKEN` and `BOT_VERIFICATION_TOKEN`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        config.require_server_secrets()?;

        let traq = Arc::new(TraqClient::from_config(&config.traq)?);
        let tools = Arc::new(ichika_tools::default_registry(config, traq.clone())?);
        let orchestrator = Orchestrator::from_config(config, provider, model, tools);

        Ok(Self::new(
            Arc::new(orchestrator),
            Arc::new(TraqChannel::new(traq)),
            TraqIngress::from_config(&config.traq),
            config.traq.verification_token.clone().unwrap_or_default(),
        ))
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(webhook_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the webhook server and the idle-session sweeper.
pub async fn start(config: AppConfig) -> Result<(), GatewayError> {
    let router = ichika_providers::router::build_from_config(&config)?;
    let (provider, model) = router.default_route()?;
    let state = Arc::new(GatewayState::from_config(&config, provider, model)?);

    let sessions = state.orchestrator.sessions().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = sessions.evict_expired().await;
            if evicted > 0 {
                info!(evicted, "Evicted idle sessions");
            }
        }
    });

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    info!(addr = %addr, bot = %config.traq.bot_name, "Webhook server starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &str, legacy: &str) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| headers.get(legacy))
        .and_then(|v| v.to_str().ok())
}

async fn webhook_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(token) = header(&headers, TOKEN_HEADER, LEGACY_TOKEN_HEADER) else {
        warn!("Webhook rejected: missing token header");
        return StatusCode::BAD_REQUEST;
    };
    let Some(event) = header(&headers, EVENT_HEADER, LEGACY_EVENT_HEADER) else {
        warn!("Webhook rejected: missing event header");
        return StatusCode::BAD_REQUEST;
    };
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Webhook rejected: malformed JSON");
            return StatusCode::BAD_REQUEST;
        }
    };
    if !verify_token(&state.verification_token, token) {
        warn!(event = %event, "Webhook rejected: token mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    match WebhookEvent::parse(event) {
        WebhookEvent::Ping => {
            debug!("PING received");
            StatusCode::NO_CONTENT
        }
        WebhookEvent::MessageCreated => {
            let payload = match MessageCreatedPayload::from_value(payload) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Webhook rejected: invalid MESSAGE_CREATED payload");
                    return StatusCode::BAD_REQUEST;
                }
            };
            handle_message(&state, &payload).await;
            StatusCode::NO_CONTENT
        }
        WebhookEvent::Other(name) => {
            debug!(event = %name, "Unsupported event");
            StatusCode::NOT_IMPLEMENTED
        }
    }
}

/// Answer one created message. Failures are logged only; traQ does not retry.
async fn handle_message(state: &GatewayState, payload: &MessageCreatedPayload) {
    let message = state.ingress.normalize(payload);
    if message.author_is_bot {
        debug!(author = %message.author_id, "Ignoring message from a bot");
        return;
    }

    let outcome = state.orchestrator.process(&message).await;
    if !outcome.should_reply() {
        return;
    }

    if let Err(e) = state.channel.send(&message.channel_id, &outcome.text).await {
        error!(
            channel_id = %message.channel_id,
            kind = ?outcome.kind,
            error = %e,
            "Failed to deliver answer"
        );
    }
}
