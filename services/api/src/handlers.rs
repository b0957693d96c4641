//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling the browser's HTTP requests:
//! RTC session parameters, agent start/stop, the business configuration,
//! Google Calendar linking, the agent log relay, and the LLM passthrough.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    body::Bytes,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use workky_core::{
    agent_log::{AgentLogEvent, AgentLogPayload},
    business::BusinessConfig,
    google::{GoogleOAuthClient, oauth::generate_state},
};

use crate::{
    agent::AgentError,
    events, proxy,
    models::{
        AuthUrlResponse, ErrorResponse, GoogleStatus, OAuthCallbackQuery, OkResponse,
        SessionInfo, StartAgentPayload, StartAgentResponse, StopAgentPayload,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    Conflict {
        message: String,
        agent_id: Option<String>,
    },
    /// A failure reported by an upstream service, surfaced with its status.
    Upstream { status: StatusCode, message: String },
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::Conflict { message, agent_id } => (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: message,
                    agent_id,
                }),
            )
                .into_response(),
            ApiError::Upstream { status, message } => {
                (status, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::ServiceUnavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(message)),
            )
                .into_response(),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(message)),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

impl ApiError {
    fn from_agent(err: AgentError, action: &str) -> Self {
        match err {
            AgentError::Invalid(message) => ApiError::BadRequest(message),
            AgentError::ChannelBusy { channel, agent_id } => ApiError::Conflict {
                message: format!("An agent is already running in channel {channel}"),
                agent_id,
            },
            AgentError::Vendor(e) => ApiError::Upstream {
                status: StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY),
                message: format!("Failed to {action} agent"),
            },
        }
    }

    fn from_json(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn google_client(state: &AppState) -> Result<&GoogleOAuthClient, ApiError> {
    state.google.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Google Calendar integration is not configured".to_string())
    })
}

/// Connection parameters for the browser's RTC client.
#[utoipa::path(
    post,
    path = "/api/session",
    responses(
        (status = 200, description = "RTC connection parameters", body = SessionInfo)
    )
)]
pub async fn create_session(State(state): State<Arc<AppState>>) -> Json<SessionInfo> {
    Json(SessionInfo {
        app_id: state.config.agora_app_id.clone(),
        token: state.config.agora_app_token.clone(),
    })
}

/// Start the voice agent in a channel.
#[utoipa::path(
    post,
    path = "/api/start-agent",
    request_body = StartAgentPayload,
    responses(
        (status = 200, description = "Agent started", body = StartAgentResponse),
        (status = 400, description = "Invalid channel or uid", body = ErrorResponse),
        (status = 409, description = "An agent is already running in the channel", body = ErrorResponse),
        (status = 502, description = "Agent platform unreachable", body = ErrorResponse)
    )
)]
pub async fn start_agent(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartAgentPayload>, JsonRejection>,
) -> Result<Json<StartAgentResponse>, ApiError> {
    let Json(payload) = payload.map_err(ApiError::from_json)?;
    let uid = payload.uid_string();
    let agent_id = state
        .agents
        .start_agent(payload.channel.trim(), &uid, payload.remote_uids)
        .await
        .map_err(|e| ApiError::from_agent(e, "start"))?;
    Ok(Json(StartAgentResponse { agent_id }))
}

/// Stop a running voice agent.
#[utoipa::path(
    post,
    path = "/api/stop-agent",
    request_body = StopAgentPayload,
    responses(
        (status = 200, description = "Agent stopped", body = OkResponse),
        (status = 400, description = "Invalid agent id", body = ErrorResponse)
    )
)]
pub async fn stop_agent(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StopAgentPayload>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(payload) = payload.map_err(ApiError::from_json)?;
    state
        .agents
        .stop_agent(payload.agent_id.trim())
        .await
        .map_err(|e| ApiError::from_agent(e, "stop"))?;
    Ok(Json(OkResponse::ok()))
}

/// Replace the stored business configuration.
#[utoipa::path(
    post,
    path = "/api/business/save",
    request_body = BusinessConfig,
    responses(
        (status = 200, description = "Configuration saved", body = OkResponse),
        (status = 400, description = "Body is not a valid configuration", body = ErrorResponse)
    )
)]
pub async fn save_business(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BusinessConfig>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(config) = payload.map_err(ApiError::from_json)?;
    state.business.save(&config).await?;
    info!(business = %config.business_info.name, services = config.services.len(), "Business configuration saved");
    Ok(Json(OkResponse::ok()))
}

/// The stored business configuration, or `null` if none was saved yet.
#[utoipa::path(
    get,
    path = "/api/business/load",
    responses(
        (status = 200, description = "Stored configuration or null", body = BusinessConfig)
    )
)]
pub async fn load_business(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<BusinessConfig>>, ApiError> {
    Ok(Json(state.business.load().await?))
}

/// Begin linking a Google Calendar.
#[utoipa::path(
    get,
    path = "/api/google/auth-url",
    responses(
        (status = 200, description = "Consent URL and CSRF state", body = AuthUrlResponse),
        (status = 503, description = "Google OAuth not configured", body = ErrorResponse)
    )
)]
pub async fn google_auth_url(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    let google = google_client(&state)?;
    let csrf_state = generate_state();
    let url = google.authorization_url(&csrf_state)?;
    state.oauth_states.remember(csrf_state.clone());
    Ok(Json(AuthUrlResponse {
        url,
        state: csrf_state,
    }))
}

fn redirect_with_error(error: &str) -> Redirect {
    let encoded: String = url::form_urlencoded::byte_serialize(error.as_bytes()).collect();
    Redirect::to(&format!("/?google_error={encoded}"))
}

async fn link_calendar(
    state: &AppState,
    google: &GoogleOAuthClient,
    code: &str,
) -> anyhow::Result<Option<String>> {
    let tokens = google.exchange_code(code).await?;
    let email = match google.user_email(&tokens.access_token).await {
        Ok(email) => email,
        Err(e) => {
            warn!(error = %e, "Could not fetch Google account email");
            None
        }
    };
    let stored = tokens.into_stored(google.client_id(), email.clone(), Utc::now());
    state.tokens.save(&stored).await?;
    Ok(email)
}

/// Google's redirect target after the consent screen.
#[utoipa::path(
    get,
    path = "/api/google/callback",
    params(
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("error" = Option<String>, Query, description = "Error reported by Google"),
        ("state" = Option<String>, Query, description = "CSRF state from auth-url")
    ),
    responses(
        (status = 303, description = "Redirect to the app with google_success or google_error"),
        (status = 503, description = "Google OAuth not configured", body = ErrorResponse)
    )
)]
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Redirect, ApiError> {
    let google = google_client(&state)?;

    if let Some(error) = query.error {
        warn!(%error, "Google OAuth consent failed");
        return Ok(redirect_with_error(&error));
    }
    if !query
        .state
        .as_deref()
        .is_some_and(|s| state.oauth_states.take(s))
    {
        warn!("Google OAuth callback with unknown or expired state");
        return Ok(redirect_with_error("invalid_state"));
    }
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Ok(redirect_with_error("missing_code"));
    };

    match link_calendar(&state, google, &code).await {
        Ok(email) => {
            info!(email = ?email, "Google Calendar linked");
            Ok(Redirect::to("/?google_success=true"))
        }
        Err(e) => {
            error!(error = ?e, "Google OAuth token exchange failed");
            Ok(redirect_with_error("token_exchange_failed"))
        }
    }
}

/// Whether a Google Calendar is linked.
#[utoipa::path(
    get,
    path = "/api/google/status",
    responses(
        (status = 200, description = "Calendar link status", body = GoogleStatus)
    )
)]
pub async fn google_status(State(state): State<Arc<AppState>>) -> Json<GoogleStatus> {
    let status = match state.tokens.load().await {
        Ok(Some(token)) => GoogleStatus {
            connected: true,
            email: token.email,
        },
        Ok(None) => GoogleStatus {
            connected: false,
            email: None,
        },
        Err(e) => {
            warn!(error = %e, "Could not read stored Google token");
            GoogleStatus {
                connected: false,
                email: None,
            }
        }
    };
    Json(status)
}

/// Record a tool-call notification and relay it to open browser tabs.
#[utoipa::path(
    post,
    path = "/api/agent-log",
    request_body = AgentLogPayload,
    responses(
        (status = 200, description = "Event relayed", body = OkResponse),
        (status = 400, description = "Malformed event", body = ErrorResponse)
    )
)]
pub async fn post_agent_log(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AgentLogPayload>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(payload) = payload.map_err(ApiError::from_json)?;
    let event = state.events.publish(payload);
    info!(kind = %event.payload.kind, tool = %event.payload.tool, "Agent log event");
    Ok(Json(OkResponse::ok()))
}

/// Server-Sent Events stream of agent log events, starting with recent history.
#[utoipa::path(
    get,
    path = "/api/agent-events",
    responses(
        (status = 200, description = "Stream of agent log events", body = AgentLogEvent, content_type = "text/event-stream")
    )
)]
pub async fn agent_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    events::sse_response(&state.events)
}

/// Streaming passthrough to the custom LLM service.
#[utoipa::path(
    post,
    path = "/api/llm/chat/completions",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Upstream response, streamed unmodified"),
        (status = 502, description = "LLM service unreachable", body = ErrorResponse)
    )
)]
pub async fn llm_proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    proxy::forward(
        &state.http_client,
        &state.config.llm_internal_url,
        method,
        &headers,
        body,
    )
    .await
}
