use facegate_core::vision::VisionConfig;
use facegate_core::EngineConfig;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read tuning file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid tuning file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// JSON snapshot of the enrollment registry.
    pub registry_path: PathBuf,
    /// Load the ONNX geometric detector at startup.
    pub geometric_enabled: bool,
    /// Vision model endpoint; the semantic path is disabled when unset.
    pub vision_endpoint: Option<String>,
    pub vision_model: Option<String>,
    pub vision_api_key: Option<String>,
    pub vision_timeout_secs: u64,
    /// Optional TOML file overriding engine tunables.
    pub tuning_file: Option<PathBuf>,
    /// Captures larger than this are refused before decoding.
    pub max_image_bytes: u64,
    /// Serve on the session bus instead of the system bus.
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(facegate_core::default_model_dir);

        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let parse_or = |key: &str, default: u64| var(key).and_then(|v| v.parse().ok()).unwrap_or(default);
        let flag = |key: &str, default: bool| var(key).map(|v| v != "0").unwrap_or(default);

        Self {
            model_dir,
            registry_path: var("FACEGATE_REGISTRY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("enrollments.json")),
            geometric_enabled: flag("FACEGATE_GEOMETRIC_ENABLED", true),
            vision_endpoint: var("FACEGATE_VISION_ENDPOINT").filter(|v| !v.trim().is_empty()),
            vision_model: var("FACEGATE_VISION_MODEL").filter(|v| !v.trim().is_empty()),
            vision_api_key: var("FACEGATE_VISION_API_KEY").filter(|v| !v.is_empty()),
            vision_timeout_secs: parse_or("FACEGATE_VISION_TIMEOUT_SECS", 30),
            tuning_file: var("FACEGATE_TUNING_FILE").map(PathBuf::from),
            max_image_bytes: parse_or("FACEGATE_MAX_IMAGE_BYTES", 20 * 1024 * 1024),
            session_bus: flag("FACEGATE_SESSION_BUS", false),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the 128-d face encoder model.
    pub fn encoder_model_path(&self) -> String {
        self.model_dir
            .join("face_encoder_128.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn vision_config(&self) -> Option<VisionConfig> {
        let endpoint = self.vision_endpoint.as_ref()?;
        let mut cfg = VisionConfig::new(endpoint.clone());
        cfg.model = self.vision_model.clone();
        cfg.api_key = self.vision_api_key.clone();
        cfg.timeout = Duration::from_secs(self.vision_timeout_secs.max(1));
        Some(cfg)
    }

    /// Engine tunables: defaults, overridden by the tuning file when set.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let Some(path) = &self.tuning_file else {
            return Ok(EngineConfig::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "engine tunables loaded");
        Ok(config)
    }
}
