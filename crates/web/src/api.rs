use std::{net::SocketAddr, time::Instant};

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::post,
};
use dronetrigger_core::JsonResponse;
use serde::Deserialize;
use tracing::info;

use crate::state::WebState;

pub async fn start_api(state: WebState) -> Result<()> {
    let addr = state.listen_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("listening on {addr}");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("webserver stopped")?;
    Ok(())
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", post(trigger))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Payload is the body of a webhook call. Every field may be missing or null.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Payload {
    pub repo: Option<String>,
    pub branch: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub release_only: Option<bool>,
}

impl Payload {
    pub fn repo(&self) -> &str {
        self.repo.as_deref().unwrap_or_default()
    }

    /// Branch to rebuild: `branch` if set, else `ref`.
    pub fn branch(&self) -> &str {
        match self.branch.as_deref() {
            Some(branch) if !branch.is_empty() => branch,
            _ => self.reference.as_deref().unwrap_or_default(),
        }
    }

    pub fn release_only(&self) -> bool {
        self.release_only.unwrap_or_default()
    }
}

/// Message describing how a request was handled, picked up by `log_request`.
#[derive(Debug, Clone)]
struct LogMessage(String);

/// Outcome is what the webhook handler decided: the status code, the
/// envelope sent back to the caller and the message for the request log.
#[derive(Debug)]
pub struct Outcome {
    status: StatusCode,
    body: JsonResponse,
    log_message: String,
}

impl Outcome {
    fn ok(log_message: String) -> Self {
        Self {
            status: StatusCode::OK,
            body: JsonResponse::ok(),
            log_message,
        }
    }

    fn error(status: StatusCode, err: &str, log_message: impl Into<String>) -> Self {
        Self {
            status,
            body: JsonResponse::error(err),
            log_message: log_message.into(),
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        response
            .extensions_mut()
            .insert(LogMessage(self.log_message));
        response
    }
}

async fn trigger(State(state): State<WebState>, headers: HeaderMap, body: Bytes) -> Outcome {
    // validate request
    let payload: Payload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return Outcome::error(
                StatusCode::BAD_REQUEST,
                "unable to parse request body",
                format!("unable to load request body as json: {e}"),
            );
        }
    };
    let repo = payload.repo();
    let branch = payload.branch();
    if repo.is_empty() {
        return Outcome::error(
            StatusCode::BAD_REQUEST,
            "no repo specified",
            "no repo specified",
        );
    }
    let Some(token) = state.token_for(repo) else {
        return Outcome::error(
            StatusCode::FORBIDDEN,
            "invalid repository",
            format!("invalid repository {repo}"),
        );
    };
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if authorization != format!("Bearer {token}") {
        return Outcome::error(
            StatusCode::FORBIDDEN,
            "invalid bearer token",
            format!("invalid bearer token for {repo}"),
        );
    }

    // handle request
    let (target, result) = if payload.release_only() {
        (
            format!("{repo} (last tag)"),
            state.drone().rebuild_last_tag(repo).await,
        )
    } else {
        (
            format!("{repo}@{branch}"),
            state.drone().rebuild_last_build(repo, branch).await,
        )
    };

    match result {
        Ok(build) => Outcome::ok(format!("started build {} {target}", build.number)),
        Err(e) => Outcome::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "unable to restart build",
            format!("unable to start last build for {target}: {e}"),
        ),
    }
}

/// Logs one line per request once the response is known.
async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    let response = next.run(request).await;

    let message = response
        .extensions()
        .get::<LogMessage>()
        .map(|m| m.0.as_str())
        .unwrap_or_default();
    info!(
        status = response.status().as_u16(),
        %method,
        path = %path,
        remote = %remote,
        elapsed = ?start.elapsed(),
        "{message}"
    );
    response
}
