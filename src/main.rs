mod classifier;
mod config;
mod engine;
mod error;
mod pooled_engine;
mod preprocess;
mod resolver;
mod types;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    response::Json,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use metrics::counter;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use classifier::{OnnxClassifier, OnnxClassifierConfig};
use config::{Config, LogFormat, PoolConfig};
use engine::{Engine, InferenceService};
use error::ClassifyError;
use pooled_engine::PooledEngine;
use types::{HealthResponse, PredictionResponse};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);
    tracing::info!("Starting waste classifier with config: {:?}", config);
    config.validate()?;

    let labels = Arc::new(config.label_set()?);
    tracing::info!(labels = labels.len(), "Label table ready");

    tracing::info!(path = %config.model_path.display(), "Loading classifier...");
    let classifier = OnnxClassifier::load(
        &config.model_path,
        OnnxClassifierConfig {
            num_classes: labels.len(),
            apply_softmax: config.apply_softmax,
        },
    )?;
    tracing::info!("Classifier loaded successfully");

    let pool_config = PoolConfig::from(&config);
    let service = InferenceService::new(Arc::new(classifier), labels);
    let (engine, workers) = PooledEngine::new(pool_config.clone(), service.clone());
    workers.spawn()?;
    tracing::info!(
        workers = pool_config.workers,
        queue_capacity = pool_config.queue_capacity,
        "Inference workers started"
    );

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let state = AppState::new(Arc::new(engine), service.labels().len());
    let app = router(state, config.max_upload_bytes)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.server_address()).await?;
    tracing::info!("Server running on http://{}", config.server_address());

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,waste_classifier=debug".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[derive(Clone)]
struct AppState {
    engine: Arc<dyn Engine + Send + Sync>,
    num_labels: usize,
}

impl AppState {
    fn new(engine: Arc<dyn Engine + Send + Sync>, num_labels: usize) -> Self {
        Self { engine, num_labels }
    }
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        labels: state.num_labels,
    })
}

/// Pulls the bytes of the `file` field out of the form.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>, ClassifyError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "Request body is not a multipart form");
        ClassifyError::missing_input("No image uploaded")
    })?;

    loop {
        let field = multipart.next_field().await.map_err(|e| {
            tracing::debug!(error = %e, "Failed to read multipart form");
            ClassifyError::missing_input("No image uploaded")
        })?;
        let Some(field) = field else {
            return Err(ClassifyError::missing_input("No image uploaded"));
        };
        if field.name() != Some("file") {
            continue;
        }

        match field.file_name() {
            None => return Err(ClassifyError::missing_input("No image uploaded")),
            Some("") => return Err(ClassifyError::missing_input("Empty filename")),
            Some(name) => tracing::debug!(filename = name, "Received upload"),
        }

        let bytes = field.bytes().await.map_err(|e| {
            ClassifyError::missing_input(format!("Failed to read uploaded file: {}", e.body_text()))
        })?;
        if bytes.is_empty() {
            return Err(ClassifyError::missing_input("Empty upload"));
        }
        return Ok(bytes.to_vec());
    }
}

#[tracing::instrument(
    skip(state, multipart),
    fields(request_id = %uuid::Uuid::new_v4().simple())
)]
async fn predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ClassifyError> {
    counter!("predict_requests_total").increment(1);

    let image = read_upload(multipart).await?;
    tracing::info!(bytes = image.len(), "Processing prediction request");

    let result = state.engine.classify(image).await?;

    tracing::info!(
        prediction = %result.label,
        confidence = result.confidence,
        "Prediction completed successfully"
    );
    Ok(Json(result.into()))
}
