//! HTTP prediction service.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::handlers;
use crate::random_forest::RandomForestClassifier;
use crate::stats::ModelStats;
use crate::training::load_model;

pub struct AppState {
	pub model: Option<RandomForestClassifier>,
	pub stats: Option<ModelStats>,
}

impl AppState {
	/// A model that fails to load leaves the server running without one.
	pub fn load(model_path: &Path, stats_path: &Path) -> Self {
		let model = match load_model(model_path) {
			Ok(model) => {
				info!(trees = model.n_trees(), "model loaded from {}", model_path.display());
				Some(model)
			},
			Err(e) => {
				error!("failed to load model {}: {}", model_path.display(), e);
				None
			},
		};

		let stats = match ModelStats::load(stats_path) {
			Ok(stats) => Some(stats),
			Err(e) => {
				warn!("no model statistics at {}: {}", stats_path.display(), e);
				None
			},
		};

		Self { model, stats }
	}
}

/// Application-level errors with HTTP status code mapping.
#[derive(Debug)]
pub enum AppError {
	BadRequest(String),
	Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
	error: String,
}

impl IntoResponse for AppError {
	fn into_response(self) -> axum::response::Response {
		let (status, message) = match self {
			AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
			AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
		};
		(status, Json(ErrorResponse { error: message })).into_response()
	}
}

pub fn router(state: Arc<AppState>) -> Router {
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods(Any)
		.allow_headers(Any);

	let trace_layer = TraceLayer::new_for_http()
		.make_span_with(|req: &Request<Body>| {
			tracing::info_span!(
				"request",
				method = %req.method(),
				uri = %req.uri(),
			)
		})
		.on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
			info!(
				latency = %format!("{} ms", latency.as_millis()),
				status = %res.status().as_u16(),
				"finished processing request"
			);
		});

	let logged_routes = Router::new()
		.route("/predict", post(handlers::predict))
		.route("/stats", get(handlers::stats))
		.layer(trace_layer);

	Router::new()
		.merge(logged_routes)
		.route("/health", get(handlers::health))
		.layer(cors)
		.with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
	let app = router(Arc::new(state));

	info!("Starting server on {}", addr);
	let listener = tokio::net::TcpListener::bind(addr).await?;
	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("failed to listen for shutdown signal: {}", e);
		std::future::pending::<()>().await;
	}
	info!("Shutdown signal received");
}
