use anyhow::{Context, Result};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

use super::{log_requests, metrics, state::*, ServerConfig};
use crate::synthesis::{AudioFormat, NotationDocument, PipelineError, SynthesizedAudio};

const SERVICE_NAME: &str = "Legato Audio Synthesis API";

#[derive(Serialize)]
struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub uptime: String,
    pub soundfont_status: &'static str,
    pub soundfont_path: Option<String>,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

#[derive(Serialize)]
struct HealthResponse {
    pub status: &'static str,
    pub soundfont_found: bool,
    pub soundfont_path: Option<String>,
    pub soundfont_dir: String,
}

#[derive(Deserialize, Debug)]
struct SynthesizeBody {
    pub abc: String,
    #[serde(default)]
    pub format: AudioFormat,
}

#[derive(Serialize)]
struct ErrorResponse {
    pub detail: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let soundfont = state.synthesizer.soundfont().await;
    metrics::set_soundfont_available(soundfont.is_some());

    let endpoints = BTreeMap::from([
        ("/health", "Health check"),
        ("/synthesize", "POST - Convert ABC to audio"),
    ]);
    Json(ServiceInfo {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_uptime(state.start_time.elapsed()),
        soundfont_status: if soundfont.is_some() {
            "ready"
        } else {
            "missing"
        },
        soundfont_path: soundfont.map(|s| s.path().display().to_string()),
        endpoints,
    })
}

async fn health(State(synthesizer): State<GuardedSynthesizer>) -> impl IntoResponse {
    let soundfont = synthesizer.soundfont().await;
    metrics::set_soundfont_available(soundfont.is_some());

    Json(HealthResponse {
        status: "ok",
        soundfont_found: soundfont.is_some(),
        soundfont_path: soundfont.map(|s| s.path().display().to_string()),
        soundfont_dir: synthesizer.soundfont_dir().display().to_string(),
    })
}

async fn synthesize(
    State(synthesizer): State<GuardedSynthesizer>,
    Json(body): Json<SynthesizeBody>,
) -> Response {
    let document = NotationDocument::new(body.abc, body.format);
    match synthesizer.synthesize(document).await {
        Ok(audio) => audio_response(audio).await,
        Err(err) => error_response(err),
    }
}

/// Stream the rendered file back; the temp file is deleted once the body is dropped.
async fn audio_response(audio: SynthesizedAudio) -> Response {
    let media_type = audio.media_type();
    let filename = audio.suggested_filename();
    let size = audio.size();

    let (stream, temp_path) = match audio.into_stream().await {
        Ok(x) => x,
        Err(err) => {
            return error_response(PipelineError::Internal(format!(
                "failed to open audio output: {}",
                err
            )))
        }
    };
    debug!("Returning audio file {:?} ({} bytes)", temp_path, size);

    let body = Body::from_stream(stream.map(move |chunk| {
        let _keep_alive = &temp_path;
        chunk
    }));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(media_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    response
}

fn error_response(err: PipelineError) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let detail = match &err {
        PipelineError::Internal(_) => "Internal server error".to_string(),
        _ => err.to_string(),
    };
    (status, Json(ErrorResponse { detail })).into_response()
}

fn make_cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("Invalid CORS origin: {}", origin))?;
    // Mirroring is the credentials-compatible way of allowing any method/header
    Ok(CorsLayer::new()
        .allow_origin([origin])
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

pub fn make_app(config: ServerConfig, synthesizer: GuardedSynthesizer) -> Result<Router> {
    let cors = make_cors_layer(&config.cors_origin)?;
    let state = ServerState::new(config, synthesizer);

    let app: Router = Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/synthesize", post(synthesize))
        .layer(cors)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state);

    Ok(app)
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

pub async fn run_server<F>(
    config: ServerConfig,
    synthesizer: GuardedSynthesizer,
    metrics_port: u16,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = format!("{}:{}", config.host, config.port);
    let metrics_address = format!("{}:{}", config.host, metrics_port);
    let app = make_app(config, synthesizer)?;

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_address)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", metrics_address))?;

    let metrics_server = tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, make_metrics_app()).await {
            tracing::error!("Metrics server failed: {}", err);
        }
    });

    info!("Listening on {}", address);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await;
    metrics_server.abort();

    info!("Server stopped");
    Ok(result?)
}
