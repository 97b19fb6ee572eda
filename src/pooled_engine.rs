use anyhow::Result;
use async_trait::async_trait;
use metrics::histogram;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::oneshot;

use crate::config::PoolConfig;
use crate::engine::{Engine, InferenceService};
use crate::error::ClassifyError;
use crate::types::PredictionResult;

type ResponseSender = oneshot::Sender<Result<PredictionResult, ClassifyError>>;

#[derive(Debug)]
struct QueuedImage {
    image: Vec<u8>,
    response_tx: ResponseSender,
}

/// Async front of the worker pool. Cloning shares the same queue.
#[derive(Clone)]
pub struct PooledEngine {
    request_tx: flume::Sender<QueuedImage>,
}

impl PooledEngine {
    pub fn new(config: PoolConfig, service: InferenceService) -> (Self, InferenceWorkers) {
        let (request_tx, request_rx) = flume::bounded(config.queue_capacity);

        let workers = InferenceWorkers {
            request_rx,
            config,
            service,
        };

        (Self { request_tx }, workers)
    }
}

#[async_trait]
impl Engine for PooledEngine {
    #[tracing::instrument(skip(self, image), fields(bytes = image.len()))]
    async fn classify(&self, image: Vec<u8>) -> Result<PredictionResult, ClassifyError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send_async(QueuedImage { image, response_tx })
            .await
            .map_err(|_| ClassifyError::Unavailable("inference queue is closed".to_string()))?;
        tracing::debug!(queued = self.request_tx.len(), "Image queued for inference");

        response_rx.await.map_err(|_| {
            ClassifyError::Unavailable("inference worker dropped the request".to_string())
        })?
    }
}

/// Worker side of the pool, consumed by [`InferenceWorkers::spawn`].
pub struct InferenceWorkers {
    request_rx: flume::Receiver<QueuedImage>,
    config: PoolConfig,
    service: InferenceService,
}

impl InferenceWorkers {
    /// Starts one OS thread per configured worker. Each thread exits once every
    /// [`PooledEngine`] handle has been dropped and the queue is drained.
    pub fn spawn(self) -> Result<Vec<JoinHandle<()>>> {
        (0..self.config.workers)
            .map(|id| {
                let request_rx = self.request_rx.clone();
                let service = self.service.clone();
                std::thread::Builder::new()
                    .name(format!("inference-{id}"))
                    .spawn(move || run_worker(id, request_rx, service))
                    .map_err(anyhow::Error::from)
            })
            .collect()
    }
}

#[tracing::instrument(skip(request_rx, service))]
fn run_worker(id: usize, request_rx: flume::Receiver<QueuedImage>, service: InferenceService) {
    tracing::info!("Inference worker started");

    while let Ok(QueuedImage { image, response_tx }) = request_rx.recv() {
        if response_tx.is_closed() {
            tracing::debug!("Caller went away before inference started, skipping");
            continue;
        }

        let started = Instant::now();
        let result = service.classify(&image);
        let elapsed = started.elapsed();
        histogram!("inference_duration_seconds").record(elapsed.as_secs_f64());
        tracing::debug!(
            processing_time_ms = elapsed.as_millis(),
            ok = result.is_ok(),
            "Image processed"
        );

        let _ = response_tx.send(result);
    }

    tracing::info!("Inference queue closed, worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::StubClassifier;
    use crate::preprocess::tests::encode;
    use crate::types::LabelSet;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::sync::Arc;

    fn pool(workers: usize) -> (PooledEngine, Vec<JoinHandle<()>>) {
        let service = InferenceService::new(
            Arc::new(StubClassifier::peaked(9, 2, 0.7, 0.0375)),
            Arc::new(LabelSet::default()),
        );
        let config = PoolConfig {
            workers,
            queue_capacity: 4,
        };
        let (engine, workers) = PooledEngine::new(config, service);
        (engine, workers.spawn().unwrap())
    }

    fn png() -> Vec<u8> {
        let img = RgbImage::from_pixel(80, 60, Rgb([1, 2, 3]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[tokio::test]
    async fn concurrent_requests_all_complete() {
        let (engine, handles) = pool(2);
        assert_eq!(handles.len(), 2);

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.classify(png()).await })
            })
            .collect();

        for task in tasks {
            let result = task.await.unwrap().unwrap();
            assert_eq!(result.label.as_str(), "Glass");
            assert_eq!(result.confidence, 0.7);
        }
    }

    #[tokio::test]
    async fn errors_are_returned_to_the_caller() {
        let (engine, _handles) = pool(1);
        let err = engine.classify(b"garbage".to_vec()).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Decode(_)));
    }

    #[tokio::test]
    async fn workers_exit_when_engine_is_dropped() {
        let (engine, handles) = pool(3);
        drop(engine);
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[tokio::test]
    async fn closed_queue_is_unavailable() {
        let service = InferenceService::new(
            Arc::new(StubClassifier::peaked(9, 0, 1.0, 0.0)),
            Arc::new(LabelSet::default()),
        );
        let config = PoolConfig {
            workers: 1,
            queue_capacity: 1,
        };
        let (engine, workers) = PooledEngine::new(config, service);
        drop(workers);

        let err = engine.classify(png()).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Unavailable(_)));
    }
}
