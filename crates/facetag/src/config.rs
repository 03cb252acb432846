use facetag_core::annotate::DEFAULT_LABEL_SCALE;
use facetag_core::detector::SCRFD_DEFAULT_CONFIDENCE;
use facetag_core::MatchPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Where captured images are written.
    pub output_dir: PathBuf,
    /// Where the display sink writes the latest frame.
    pub preview_path: PathBuf,
    /// Face comparison metric and threshold.
    pub match_policy: MatchPolicy,
    /// Minimum SCRFD confidence for a detection.
    pub detection_threshold: f32,
    /// Frames discarded after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// TrueType font for name labels; boxes only when unset.
    pub label_font: Option<PathBuf>,
    /// Label glyph height in pixels.
    pub label_size: f32,
    /// Start the plain video loop as soon as the engine is up.
    pub preview_on_start: bool,
}

/// Optional TOML file layer. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    camera_device: Option<String>,
    model_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    preview_path: Option<PathBuf>,
    match_metric: Option<String>,
    match_threshold: Option<f32>,
    detection_threshold: Option<f32>,
    warmup_frames: Option<usize>,
    label_font: Option<PathBuf>,
    label_size: Option<f32>,
    preview_on_start: Option<bool>,
}

impl Config {
    /// Defaults, then the TOML file named by `FACETAG_CONFIG`, then
    /// `FACETAG_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("FACETAG_CONFIG") {
            Ok(path) => Some(read_file(Path::new(&path))?),
            Err(_) => None,
        };
        Ok(Self::resolve(file.unwrap_or_default(), |key| std::env::var(key).ok()))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let output_dir = env("FACETAG_OUTPUT_DIR")
            .map(PathBuf::from)
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from("pictures"));

        let preview_path = env("FACETAG_PREVIEW_PATH")
            .map(PathBuf::from)
            .or(file.preview_path)
            .unwrap_or_else(|| output_dir.join("preview.jpg"));

        let metric = env("FACETAG_MATCH_METRIC").or(file.match_metric);
        let mut match_policy = match metric.as_deref() {
            Some(name) => MatchPolicy::for_metric(name).unwrap_or_else(|| {
                tracing::warn!(metric = name, "unknown match metric, using cosine");
                MatchPolicy::default()
            }),
            None => MatchPolicy::default(),
        };
        if let Some(threshold) = parsed(&env, "FACETAG_MATCH_THRESHOLD").or(file.match_threshold) {
            match_policy = match_policy.with_threshold(threshold);
        }

        Self {
            camera_device: env("FACETAG_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| facetag_hw::device_path_for_index(0)),
            model_dir: env("FACETAG_MODEL_DIR")
                .map(PathBuf::from)
                .or(file.model_dir)
                .unwrap_or_else(facetag_core::default_model_dir),
            output_dir,
            preview_path,
            match_policy,
            detection_threshold: parsed(&env, "FACETAG_DETECTION_THRESHOLD")
                .or(file.detection_threshold)
                .unwrap_or(SCRFD_DEFAULT_CONFIDENCE),
            warmup_frames: parsed(&env, "FACETAG_WARMUP_FRAMES")
                .or(file.warmup_frames)
                .unwrap_or(4),
            label_font: env("FACETAG_LABEL_FONT")
                .map(PathBuf::from)
                .or(file.label_font),
            label_size: parsed(&env, "FACETAG_LABEL_SIZE")
                .or(file.label_size)
                .filter(|px: &f32| *px > 0.0)
                .unwrap_or(DEFAULT_LABEL_SCALE),
            preview_on_start: env("FACETAG_PREVIEW_ON_START")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .or(file.preview_on_start)
                .unwrap_or(true),
        }
    }

    /// Built-in defaults only.
    #[cfg(test)]
    pub(crate) fn defaults() -> Self {
        Self::resolve(FileConfig::default(), |_| None)
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(facetag_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(facetag_core::RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_file(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn parse_file(text: &str) -> Result<FileConfig, toml::de::Error> {
    toml::from_str(text)
}

/// Parse an env var, ignoring values that do not parse.
fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable value");
            None
        }
    }
}
