//! "Is this the same person?" predicates.
//!
//! The threshold is fixed when the matcher is built; the registry never
//! sees it.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};

/// Default L2 tolerance for 128-d dlib-style embeddings.
pub const DEFAULT_EUCLIDEAN_TOLERANCE: f32 = 0.6;
/// Default cosine threshold for L2-normalized ArcFace embeddings.
pub const DEFAULT_COSINE_THRESHOLD: f32 = 0.40;

/// Boolean face comparison against a fixed internal threshold.
pub trait FaceMatcher: Send + Sync {
    fn is_match(&self, known: &Embedding, candidate: &Embedding) -> bool;
}

/// Match when the Euclidean distance is within `tolerance` (inclusive).
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub tolerance: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_EUCLIDEAN_TOLERANCE,
        }
    }
}

impl FaceMatcher for EuclideanMatcher {
    fn is_match(&self, known: &Embedding, candidate: &Embedding) -> bool {
        known.dim() == candidate.dim() && known.euclidean_distance(candidate) <= self.tolerance
    }
}

/// Match when cosine similarity reaches `threshold` (inclusive).
#[derive(Debug, Clone, Copy)]
pub struct CosineMatcher {
    pub threshold: f32,
}

impl Default for CosineMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_COSINE_THRESHOLD,
        }
    }
}

impl FaceMatcher for CosineMatcher {
    fn is_match(&self, known: &Embedding, candidate: &Embedding) -> bool {
        known.dim() == candidate.dim() && known.similarity(candidate) >= self.threshold
    }
}

/// Matcher selection, as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "lowercase")]
pub enum MatchPolicy {
    Euclidean { tolerance: f32 },
    Cosine { threshold: f32 },
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy::Cosine {
            threshold: DEFAULT_COSINE_THRESHOLD,
        }
    }
}

impl MatchPolicy {
    /// Policy for a metric name with its default threshold.
    pub fn for_metric(metric: &str) -> Option<Self> {
        match metric.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Some(MatchPolicy::Euclidean {
                tolerance: DEFAULT_EUCLIDEAN_TOLERANCE,
            }),
            "cosine" => Some(MatchPolicy::Cosine {
                threshold: DEFAULT_COSINE_THRESHOLD,
            }),
            _ => None,
        }
    }

    /// Same metric, different threshold.
    pub fn with_threshold(self, value: f32) -> Self {
        match self {
            MatchPolicy::Euclidean { .. } => MatchPolicy::Euclidean { tolerance: value },
            MatchPolicy::Cosine { .. } => MatchPolicy::Cosine { threshold: value },
        }
    }

    pub fn threshold(&self) -> f32 {
        match *self {
            MatchPolicy::Euclidean { tolerance } => tolerance,
            MatchPolicy::Cosine { threshold } => threshold,
        }
    }

    pub fn metric_name(&self) -> &'static str {
        match self {
            MatchPolicy::Euclidean { .. } => "euclidean",
            MatchPolicy::Cosine { .. } => "cosine",
        }
    }

    pub fn build(&self) -> Box<dyn FaceMatcher> {
        match *self {
            MatchPolicy::Euclidean { tolerance } => Box::new(EuclideanMatcher { tolerance }),
            MatchPolicy::Cosine { threshold } => Box::new(CosineMatcher { threshold }),
        }
    }
}
