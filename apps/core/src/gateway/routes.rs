//! REST surface: health check, speech synthesis and the asynchronous TTS
//! callback. Everything conversational goes over the socket instead.

use crate::error::AppError;
use crate::gateway::socket::{self, ServerEvent};
use crate::gateway::GatewayState;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub fn build_router(state: GatewayState) -> Router {
    let cors = match state.config.allowed_origin().parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any),
        Err(_) => {
            warn!("Configured client origin is not a valid header value, allowing any origin");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any)
        }
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/ws", get(socket::ws_handler))
        .route("/v1/speech/openai", post(handle_openai_speech))
        .route("/v1/speech/fpt", post(handle_fpt_speech))
        .route("/v1/speech/fpt-callback", post(handle_fpt_callback))
        .layer(cors)
        .with_state(state)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /v1/speech/openai ============

#[derive(Debug, Deserialize)]
struct SpeechRequest {
    text: String,
}

/// Synthesizes the answer text and returns the audio directly; the widget
/// plays it from a blob URL.
async fn handle_openai_speech(
    State(state): State<GatewayState>,
    Json(body): Json<SpeechRequest>,
) -> Result<impl IntoResponse, AppError> {
    if body.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }
    let audio = state.speech.synthesize_openai(&body.text).await?;
    Ok(([(header::CONTENT_TYPE, "audio/aac")], audio))
}

// ============ POST /v1/speech/fpt ============

#[derive(Debug, Deserialize)]
struct FptSpeechRequest {
    text: String,
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Serialize)]
struct FptSpeechAccepted {
    request_id: String,
    #[serde(rename = "async")]
    async_url: String,
}

/// Fallback voice. FPT renders asynchronously, so this only returns the
/// future audio URL; the finished file is announced over the socket once
/// the provider calls back.
async fn handle_fpt_speech(
    State(state): State<GatewayState>,
    Json(body): Json<FptSpeechRequest>,
) -> Result<Json<FptSpeechAccepted>, AppError> {
    if body.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }

    let response = state.speech.request_fpt_speech(&body.text).await?;
    state
        .registry
        .register_audio_waiter(&response.request_id, &body.session_id)
        .await;

    info!(
        "FPT synthesis {} pending for session {}",
        response.request_id, body.session_id
    );

    Ok(Json(FptSpeechAccepted {
        request_id: response.request_id,
        async_url: response.async_url,
    }))
}

// ============ POST /v1/speech/fpt-callback ============

#[derive(Debug, Deserialize)]
struct FptCallback {
    request_id: String,
    /// URL of the rendered audio file.
    #[serde(rename = "async", default)]
    async_url: Option<String>,
    #[serde(default)]
    success: Option<bool>,
}

#[derive(Serialize)]
struct CallbackAck {
    status: String,
}

/// Receives FPT's completion callback and relays the audio URL to the
/// socket that asked for it. Unknown request ids are acknowledged and
/// ignored; the provider retries callbacks and the waiter may be gone.
async fn handle_fpt_callback(
    State(state): State<GatewayState>,
    Json(body): Json<FptCallback>,
) -> Json<CallbackAck> {
    let Some(session_id) = state.registry.take_audio_waiter(&body.request_id).await else {
        warn!("TTS callback for unknown request {}", body.request_id);
        return Json(CallbackAck { status: "ignored".to_string() });
    };

    match (body.success.unwrap_or(true), body.async_url) {
        (true, Some(url)) => {
            state
                .registry
                .emit(&session_id, ServerEvent::audio_ready(&url))
                .await;
        }
        _ => {
            warn!(
                "TTS request {} for session {} failed at the provider",
                body.request_id, session_id
            );
        }
    }

    Json(CallbackAck { status: "ok".to_string() })
}
