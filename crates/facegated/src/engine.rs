use crate::config::Config;
use facegate_core::decision::{AccessContext, AccessDecision};
use facegate_core::gallery::{GalleryError, Registry};
use facegate_core::geometric::DetectorError;
use facegate_core::vision::{HttpVisionClient, VisionError};
use facegate_core::{
    EmbeddingMethod, EngineConfig, EnrolledFace, OnnxGeometricDetector, Pipeline, QualityError,
    SemanticDescriptor,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("capture rejected: {0}")]
    Quality(#[from] QualityError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("vision client error: {0}")]
    Vision(#[from] VisionError),
    #[error("registry error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("no usable face in capture (method {0})")]
    NoFace(EmbeddingMethod),
    #[error("engine thread failed to start: {0}")]
    Spawn(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Authenticate {
        image: Vec<u8>,
        gallery: Vec<EnrolledFace>,
        context: AccessContext,
        reply: oneshot::Sender<AccessDecision>,
    },
    Enroll {
        owner: String,
        label: String,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<EnrolledFace, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    geometric: bool,
    semantic: bool,
}

impl EngineHandle {
    /// Run the full matching chain against a gallery snapshot.
    pub async fn authenticate(
        &self,
        image: Vec<u8>,
        gallery: Vec<EnrolledFace>,
        context: AccessContext,
    ) -> Result<AccessDecision, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Authenticate {
                image,
                gallery,
                context,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Extract an embedding from the capture and add it to the registry.
    pub async fn enroll(&self, owner: String, label: String, image: Vec<u8>) -> Result<EnrolledFace, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                owner,
                label,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn geometric_loaded(&self) -> bool {
        self.geometric
    }

    pub fn semantic_enabled(&self) -> bool {
        self.semantic
    }
}

/// Build the pipeline described by `config`. Fails fast when an enabled
/// extractor cannot be constructed.
pub fn build_pipeline(config: &Config, engine_config: &EngineConfig) -> Result<Pipeline, EngineError> {
    let mut pipeline = Pipeline::new(engine_config);

    if config.geometric_enabled {
        let detector = OnnxGeometricDetector::load(&config.scrfd_model_path(), &config.encoder_model_path())?;
        tracing::info!(dir = %config.model_dir.display(), "geometric detector loaded");
        pipeline = pipeline.with_geometric(Box::new(detector));
    } else {
        tracing::info!("geometric detector disabled via FACEGATE_GEOMETRIC_ENABLED=0");
    }

    if let Some(vision) = config.vision_config() {
        tracing::info!(
            endpoint = %vision.endpoint,
            model = vision.model.as_deref(),
            timeout_secs = vision.timeout.as_secs(),
            "semantic descriptor enabled"
        );
        let client = HttpVisionClient::new(vision)?;
        pipeline = pipeline.with_semantic(SemanticDescriptor::new(Arc::new(client), engine_config.semantic.clone()));
    }

    if !pipeline.has_geometric() && !pipeline.has_semantic() {
        tracing::warn!("no extractor configured; every request will be denied");
    }
    Ok(pipeline)
}

/// Spawn the engine on a dedicated OS thread, building the pipeline there.
///
/// The vision client is blocking and must be created and dropped off the
/// async runtime, so construction happens on the engine thread and this
/// waits for it to report ready.
pub async fn spawn_engine(
    config: Config,
    engine_config: EngineConfig,
    registry: Arc<Registry>,
) -> Result<EngineHandle, EngineError> {
    spawn_engine_with(move || build_pipeline(&config, &engine_config), registry).await
}

pub async fn spawn_engine_with<F>(build: F, registry: Arc<Registry>) -> Result<EngineHandle, EngineError>
where
    F: FnOnce() -> Result<Pipeline, EngineError> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(bool, bool), EngineError>>();

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            let mut pipeline = match build() {
                Ok(p) => {
                    let _ = ready_tx.send(Ok((p.has_geometric(), p.has_semantic())));
                    p
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Authenticate {
                        image,
                        gallery,
                        context,
                        reply,
                    } => {
                        let decision = pipeline.authenticate(&image, &gallery, context);
                        let _ = reply.send(decision);
                    }
                    EngineRequest::Enroll {
                        owner,
                        label,
                        image,
                        reply,
                    } => {
                        let result = run_enroll(&mut pipeline, &registry, &owner, &label, &image);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(|e| EngineError::Spawn(e.to_string()))?;

    let (geometric, semantic) = ready_rx.await.map_err(|_| EngineError::ChannelClosed)??;
    Ok(EngineHandle { tx, geometric, semantic })
}

/// Extract, enroll, persist.
fn run_enroll(
    pipeline: &mut Pipeline,
    registry: &Registry,
    owner: &str,
    label: &str,
    image: &[u8],
) -> Result<EnrolledFace, EngineError> {
    let extraction = pipeline.extract_embedding(image)?;
    let embedding = extraction.embedding;
    if !embedding.has_face() {
        return Err(EngineError::NoFace(embedding.method));
    }
    tracing::info!(
        owner,
        method = %embedding.method,
        confidence = embedding.confidence,
        "enroll: embedding extracted"
    );

    let face = registry.enroll(owner, label, embedding, None)?;
    if let Err(e) = registry.save() {
        // keep memory and disk consistent
        registry.revoke(&face.id);
        return Err(e.into());
    }
    Ok(face)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::decision::Outcome;
    use facegate_core::geometric::{GeometricDetector, GeometricResult};
    use facegate_core::{BoundingBox, NormalizedImage, EMBEDDING_DIM};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    struct FixedFace;

    impl GeometricDetector for FixedFace {
        fn detect(&mut self, image: &NormalizedImage) -> Result<GeometricResult, DetectorError> {
            let bbox = BoundingBox {
                x: 0.0,
                y: 0.0,
                width: image.width() as f32 / 2.0,
                height: image.height() as f32 / 2.0,
                confidence: 0.99,
                landmarks: None,
            };
            let embedding = (0..EMBEDDING_DIM).map(|i| (i as f32 * 0.3).cos()).collect();
            Ok(GeometricResult::detected(bbox, embedding, image.width(), image.height()))
        }
    }

    fn capture() -> Vec<u8> {
        let img = RgbImage::from_fn(128, 128, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, ((x ^ y) * 2) as u8]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn bare() -> Result<Pipeline, EngineError> {
        Ok(Pipeline::new(&EngineConfig::default()))
    }

    fn with_face() -> Result<Pipeline, EngineError> {
        Ok(Pipeline::new(&EngineConfig::default()).with_geometric(Box::new(FixedFace)))
    }

    #[tokio::test]
    async fn test_bare_engine_denies_and_refuses_enrollment() {
        let registry = Arc::new(Registry::new());
        let engine = spawn_engine_with(bare, Arc::clone(&registry)).await.unwrap();
        assert!(!engine.geometric_loaded() && !engine.semantic_enabled());

        let decision = engine.authenticate(capture(), Vec::new(), AccessContext::Login).await.unwrap();
        assert_eq!(decision.outcome, Outcome::Denied);

        let err = engine.enroll("alice".into(), "desk".into(), capture()).await.unwrap_err();
        assert!(matches!(err, EngineError::NoFace(EmbeddingMethod::ErrorFallback)));
        assert!(registry.records().is_empty());
    }

    #[tokio::test]
    async fn test_enroll_then_authenticate() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::load(dir.path().join("enrollments.json")).unwrap());
        let engine = spawn_engine_with(with_face, Arc::clone(&registry)).await.unwrap();
        assert!(engine.geometric_loaded());

        let face = engine.enroll("alice".into(), "desk".into(), capture()).await.unwrap();
        assert_eq!(face.owner, "alice");
        assert!(dir.path().join("enrollments.json").exists());

        let decision = engine
            .authenticate(capture(), registry.snapshot(), AccessContext::Login)
            .await
            .unwrap();
        assert_eq!(decision.outcome, Outcome::Permitted, "{}", decision.rationale);
        assert_eq!(decision.method, EmbeddingMethod::GeometricFallback);
        assert_eq!(decision.enrollment_id.as_deref(), Some(face.id.as_str()));
    }

    #[tokio::test]
    async fn test_enroll_rejects_garbage() {
        let engine = spawn_engine_with(with_face, Arc::new(Registry::new())).await.unwrap();
        let err = engine.enroll("alice".into(), String::new(), b"garbage".to_vec()).await.unwrap_err();
        assert!(matches!(err, EngineError::Quality(QualityError::Decode(_))));
    }

    #[tokio::test]
    async fn test_startup_failure_reported() {
        let failing = || Err(EngineError::Spawn("models missing".into()));
        let err = spawn_engine_with(failing, Arc::new(Registry::new())).await.err().unwrap();
        assert!(matches!(err, EngineError::Spawn(_)));
    }
}
