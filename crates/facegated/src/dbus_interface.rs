use crate::engine::{EngineError, EngineHandle};
use facegate_core::decision::AccessContext;
use facegate_core::gallery::{GalleryError, Registry};
use facegate_core::EnrolledFace;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use zbus::{fdo, interface};

pub const BUS_NAME: &str = "org.facegate.Gate1";
pub const OBJECT_PATH: &str = "/org/facegate/Gate1";

/// D-Bus interface for the FaceGate daemon.
///
/// Bus name: org.facegate.Gate1
/// Object path: /org/facegate/Gate1
pub struct GateService {
    engine: EngineHandle,
    registry: Arc<Registry>,
    max_image_bytes: u64,
    started: Instant,
}

impl GateService {
    pub fn new(engine: EngineHandle, registry: Arc<Registry>, max_image_bytes: u64) -> Self {
        Self {
            engine,
            registry,
            max_image_bytes,
            started: Instant::now(),
        }
    }
}

#[interface(name = "org.facegate.Gate1")]
impl GateService {
    /// Decide one access attempt. Returns the decision as JSON.
    async fn authenticate(&self, image_path: &str, context: &str) -> fdo::Result<String> {
        let context: AccessContext = context.parse().map_err(fdo::Error::InvalidArgs)?;
        tracing::info!(image_path, %context, "authenticate requested");

        let image = read_capture(image_path, self.max_image_bytes).await?;
        let decision = self
            .engine
            .authenticate(image, self.registry.snapshot(), context)
            .await
            .map_err(to_fdo)?;
        serde_json::to_string(&decision).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    /// Enroll a capture for `owner`. Returns the new enrollment id.
    async fn enroll(&self, owner: &str, label: &str, image_path: &str) -> fdo::Result<String> {
        tracing::info!(owner, label, image_path, "enroll requested");
        let image = read_capture(image_path, self.max_image_bytes).await?;
        let face = self
            .engine
            .enroll(owner.to_string(), label.to_string(), image)
            .await
            .map_err(to_fdo)?;
        Ok(face.id)
    }

    /// Deactivate an enrollment. False when the id is unknown or already revoked.
    async fn revoke(&self, id: &str) -> fdo::Result<bool> {
        tracing::info!(id, "revoke requested");
        if !self.registry.revoke(id) {
            return Ok(false);
        }
        persist(Arc::clone(&self.registry)).await?;
        Ok(true)
    }

    /// Enrollments of `owner` as JSON, without embedding values.
    async fn list_enrollments(&self, owner: &str) -> fdo::Result<String> {
        let records: Vec<_> = self.registry.list(owner).iter().map(summary).collect();
        Ok(serde_json::Value::Array(records).to_string())
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "geometric_loaded": self.engine.geometric_loaded(),
            "semantic_enabled": self.engine.semantic_enabled(),
            "active_enrollments": self.registry.active_count(),
            "total_enrollments": self.registry.records().len(),
            "registry_path": self.registry.path().map(|p| p.display().to_string()),
            "uptime_secs": self.started.elapsed().as_secs(),
        })
        .to_string())
    }
}

fn summary(face: &EnrolledFace) -> serde_json::Value {
    json!({
        "id": face.id,
        "owner": face.owner,
        "label": face.label,
        "active": face.active,
        "confidence_minimum": face.confidence_minimum,
        "created_at": face.created_at,
        "method": face.embedding.as_ref().map(|e| e.method),
    })
}

fn to_fdo(err: EngineError) -> fdo::Error {
    match err {
        EngineError::Quality(_)
        | EngineError::NoFace(_)
        | EngineError::Gallery(GalleryError::EmptyOwner | GalleryError::InvalidMinimum(_) | GalleryError::NoFace(_)) => {
            fdo::Error::InvalidArgs(err.to_string())
        }
        other => fdo::Error::Failed(other.to_string()),
    }
}

/// Write the registry snapshot on the blocking pool.
async fn persist(registry: Arc<Registry>) -> fdo::Result<()> {
    tokio::task::spawn_blocking(move || registry.save())
        .await
        .map_err(|e| fdo::Error::Failed(format!("registry save task: {e}")))?
        .map_err(|e| to_fdo(e.into()))
}

/// Read a capture file, refusing anything larger than `max_bytes`.
async fn read_capture(path: &str, max_bytes: u64) -> fdo::Result<Vec<u8>> {
    let path = Path::new(path);
    if !path.is_absolute() {
        return Err(fdo::Error::InvalidArgs(format!("image path must be absolute: {}", path.display())));
    }
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| fdo::Error::FileNotFound(format!("{}: {e}", path.display())))?;
    if meta.len() > max_bytes {
        return Err(fdo::Error::InvalidArgs(format!(
            "image is {} bytes, limit is {max_bytes}",
            meta.len()
        )));
    }
    tokio::fs::read(path)
        .await
        .map_err(|e| fdo::Error::IOError(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::{Embedding, EmbeddingMethod};

    #[tokio::test]
    async fn test_read_capture_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.png");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        let path = path.to_str().unwrap();

        assert_eq!(read_capture(path, 64).await.unwrap().len(), 64);
        assert!(matches!(read_capture(path, 63).await, Err(fdo::Error::InvalidArgs(_))));
        assert!(matches!(read_capture("relative.png", 64).await, Err(fdo::Error::InvalidArgs(_))));
        assert!(matches!(
            read_capture("/nonexistent/capture.png", 64).await,
            Err(fdo::Error::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persist_writes_revocation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enrollments.json");
        let registry = Arc::new(Registry::load(&path).unwrap());
        let face = registry
            .enroll("alice", "desk", Embedding::new(vec![0.5; 4], EmbeddingMethod::Hybrid, 0.9), None)
            .unwrap();
        assert!(registry.revoke(&face.id));

        persist(Arc::clone(&registry)).await.unwrap();
        let reopened = Registry::load(&path).unwrap();
        assert_eq!(reopened.records().len(), 1);
        assert!(reopened.snapshot().is_empty());
    }

    #[test]
    fn test_summary_omits_embedding() {
        let registry = Registry::new();
        let face = registry
            .enroll("alice", "desk", Embedding::new(vec![0.5; 4], EmbeddingMethod::Hybrid, 0.9), None)
            .unwrap();
        let s = summary(&face);
        assert_eq!(s["owner"], "alice");
        assert_eq!(s["method"], "hybrid");
        assert!(s.get("embedding").is_none());
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            to_fdo(EngineError::NoFace(EmbeddingMethod::None)),
            fdo::Error::InvalidArgs(_)
        ));
        assert!(matches!(to_fdo(EngineError::ChannelClosed), fdo::Error::Failed(_)));
    }
}
