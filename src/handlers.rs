//! HTTP route handlers for the prediction server.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::functions::argmax;
use crate::dto::{PredictInput, PredictRequest, PredictResponse};
use crate::link::LinkStatus;
use crate::server::{AppError, AppState};
use crate::stats::ModelStats;

const MODEL_UNAVAILABLE: &str = "Model is not available.";
const STATS_UNAVAILABLE: &str = "Model statistics are not available.";
const PREDICTION_FAILED: &str = "An error occurred during prediction.";

/// Health check endpoint.
pub async fn health() -> &'static str {
	"OK"
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<ModelStats>, AppError> {
	if state.model.is_none() {
		return Err(AppError::Internal(MODEL_UNAVAILABLE.to_string()));
	}

	state
		.stats
		.clone()
		.map(Json)
		.ok_or_else(|| AppError::Internal(STATS_UNAVAILABLE.to_string()))
}

/// Classifies one `{throughput, delay}` sample. The raw body is parsed here so that
/// every malformed input maps to the same 400 response.
pub async fn predict(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<PredictResponse>, AppError> {
	let model = state
		.model
		.as_ref()
		.ok_or_else(|| AppError::Internal(MODEL_UNAVAILABLE.to_string()))?;

	let request = serde_json::from_slice::<PredictRequest>(&body).map_err(|e| {
		debug!("rejecting prediction request: {}", e);
		AppError::BadRequest(PREDICTION_FAILED.to_string())
	})?;

	let sample = request.sample();
	if !sample.is_finite() {
		return Err(AppError::BadRequest(PREDICTION_FAILED.to_string()));
	}

	let proba = model.predict_proba(&sample.features());
	let prediction = LinkStatus::from_class(argmax(&proba));
	let confidence = proba.get(prediction.class()).copied().unwrap_or(0.0);

	info!(
		throughput = sample.throughput,
		delay = sample.delay,
		%prediction,
		confidence,
		"prediction"
	);

	Ok(Json(PredictResponse {
		prediction: prediction.label().to_string(),
		confidence,
		input: PredictInput {
			throughput: sample.throughput,
			delay: sample.delay,
		},
	}))
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use axum::body::Body;
	use axum::http::{Request, StatusCode};
	use serde_json::{json, Value};
	use tower::ServiceExt;

	use crate::random_forest::RandomForestBuilder;
	use crate::server::{router, AppState};
	use crate::stats::ModelStats;
	use crate::training::tests::{link_builder, options};
	use crate::training::train;

	fn trained_state() -> Arc<AppState> {
		let builder = link_builder(300, 21);
		let outcome = train(&builder, &options()).unwrap();

		Arc::new(AppState {
			model: Some(outcome.model),
			stats: Some(outcome.stats),
		})
	}

	fn empty_state() -> Arc<AppState> {
		Arc::new(AppState { model: None, stats: None })
	}

	async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
		let response = router(state).oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

		(status, body)
	}

	fn predict_request(body: &str) -> Request<Body> {
		Request::builder()
			.method("POST")
			.uri("/predict")
			.header("content-type", "application/json")
			.body(Body::from(body.to_string()))
			.unwrap()
	}

	fn get(uri: &str) -> Request<Body> {
		Request::builder().uri(uri).body(Body::empty()).unwrap()
	}

	#[tokio::test]
	async fn predicts_healthy_and_failing_links() {
		let state = trained_state();

		let app = router(state.clone());
		let response = app.oneshot(predict_request(r#"{"throughput": 4.0, "delay": 0.005}"#)).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let body: Value = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(body["prediction"], "OK");
		assert!(body["confidence"].as_f64().unwrap() >= 0.5);
		assert_eq!(body["input"], json!({"throughput": 4.0, "delay": 0.005}));

		let app = router(state);
		let response = app.oneshot(predict_request(r#"{"throughput": "0.3", "delay": "0.005"}"#)).await.unwrap();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let body: Value = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(body["prediction"], "FAILURE");
		assert_eq!(body["input"]["throughput"], 0.3);
	}

	#[tokio::test]
	async fn malformed_requests_are_bad_requests() {
		let state = trained_state();
		for body in &[
			"not json",
			r#"{"throughput": 4.0}"#,
			r#"{"throughput": "fast", "delay": 0.01}"#,
			r#"{"throughput": "nan", "delay": 0.01}"#,
			"[]",
		] {
			let (status, json) = send(state.clone(), predict_request(body)).await;
			assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
			assert_eq!(json["error"], "An error occurred during prediction.");
		}
	}

	#[tokio::test]
	async fn missing_model_is_a_server_error() {
		let (status, json) = send(empty_state(), predict_request(r#"{"throughput": 4.0, "delay": 0.01}"#)).await;
		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(json["error"], "Model is not available.");

		let (status, json) = send(empty_state(), get("/stats")).await;
		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(json["error"], "Model is not available.");
	}

	#[tokio::test]
	async fn stats_come_from_the_training_sidecar() {
		let state = trained_state();
		let (status, json) = send(state.clone(), get("/stats")).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json["model_name"], "Random Forest");
		assert_eq!(json["data_split"]["training"], 80);
		assert!(json["metrics"]["failure"]["precision"].is_number());

		let model = RandomForestBuilder { n_trees: 3, ..Default::default() }.fit(link_builder(60, 2).build());
		let partial = Arc::new(AppState { model: Some(model), stats: None });
		let (status, json) = send(partial, get("/stats")).await;
		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(json["error"], "Model statistics are not available.");

		let parsed: ModelStats = serde_json::from_value(send(state, get("/stats")).await.1).unwrap();
		assert_eq!(parsed.model_name, "Random Forest");
	}

	#[tokio::test]
	async fn health_and_cors() {
		let request = Request::builder()
			.uri("/health")
			.header("origin", "http://localhost:3000")
			.body(Body::empty())
			.unwrap();
		let response = router(empty_state()).oneshot(request).await.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(response.headers()["access-control-allow-origin"], "*");
	}

	#[test]
	fn state_survives_missing_files() {
		let dir = std::env::temp_dir();
		let state = AppState::load(&dir.join("does-not-exist.model"), &dir.join("does-not-exist.stats.json"));
		assert!(state.model.is_none());
		assert!(state.stats.is_none());
	}
}
