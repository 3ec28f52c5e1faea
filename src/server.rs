//! HTTP control surface over [`Speech`], for hosts that cannot load the
//! native library.
//!
//! | Method | Path       | Body                                   |
//! |--------|------------|----------------------------------------|
//! | POST   | `/speak`   | `{"text", "delay_ms"?}`                |
//! | POST   | `/dialog`  | `{"text", "delay_ms"?, "gender"?}`     |
//! | POST   | `/preview` | `{"text", "role"}`                     |
//! | POST   | `/stop`    |                                        |
//! | GET    | `/status`  |                                        |
//! | GET    | `/voices`  |                                        |
//! | GET    | `/health`  |                                        |

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{
    speech::Speech,
    status::StatusSnapshot,
    voice::{Gender, VoiceRole},
};

pub type AppState = Arc<Speech>;

pub fn router(speech: AppState) -> Router {
    Router::new()
        .route("/speak", post(speak))
        .route("/dialog", post(dialog))
        .route("/preview", post(preview))
        .route("/stop", post(stop))
        .route("/status", get(status))
        .route("/voices", get(voices))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)),
        )
        .with_state(speech)
}

#[derive(Debug, Deserialize)]
struct SpeakBody {
    text: String,
    #[serde(default)]
    delay_ms: u64,
}

#[derive(Debug, Deserialize)]
struct DialogBody {
    text: String,
    #[serde(default)]
    delay_ms: u64,
    /// Free-form: anything but female/male counts as unknown.
    gender: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreviewBody {
    text: String,
    role: String,
}

#[derive(Debug, Serialize)]
struct Queued {
    chunks: usize,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    #[serde(flatten)]
    snapshot: StatusSnapshot,
    message: String,
}

async fn speak(State(speech): State<AppState>, Json(body): Json<SpeakBody>) -> Json<Queued> {
    let chunks = speech.speak(&body.text, Duration::from_millis(body.delay_ms));
    Json(Queued { chunks })
}

async fn dialog(State(speech): State<AppState>, Json(body): Json<DialogBody>) -> Json<Queued> {
    let gender = body.gender.as_deref().map(Gender::parse);
    let chunks = speech.speak_dialog(&body.text, Duration::from_millis(body.delay_ms), gender);
    Json(Queued { chunks })
}

async fn preview(
    State(speech): State<AppState>,
    Json(body): Json<PreviewBody>,
) -> Result<Json<Queued>, (StatusCode, String)> {
    let role: VoiceRole = body.role.parse().map_err(|e| {
        warn!(role = %body.role, "rejecting preview");
        (StatusCode::BAD_REQUEST, format!("{e}"))
    })?;
    Ok(Json(Queued { chunks: speech.speak_preview(&body.text, role) }))
}

async fn stop(State(speech): State<AppState>) -> StatusCode {
    speech.stop();
    StatusCode::NO_CONTENT
}

async fn status(State(speech): State<AppState>) -> Json<StatusBody> {
    let snapshot = speech.reporter().snapshot();
    let message = snapshot.message();
    Json(StatusBody { snapshot, message })
}

async fn voices(State(speech): State<AppState>) -> Json<Vec<String>> {
    Json(speech.available_voices().await)
}

async fn health(State(speech): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "backend": speech.backend_name(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
