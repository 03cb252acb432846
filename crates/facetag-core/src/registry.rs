//! In-memory registry of named face embeddings.
//!
//! Entries keep insertion order, which decides ties: when several stored
//! embeddings match a candidate, the earliest enrollment wins.

use crate::matcher::FaceMatcher;
use crate::types::Embedding;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Name reported for a face that matches no enrolled entry.
pub const UNKNOWN: &str = "Unknown";

/// Registry shared between the enrollment flow and the recognition loop.
pub type SharedRegistry = Arc<Mutex<Registry>>;

#[derive(Error, Debug, PartialEq)]
pub enum EnrollError {
    #[error("no face detected, nothing to enroll")]
    NoFaceDetected,
    #[error("embedding has {actual} dimensions, registry holds {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: String,
    pub embedding: Embedding,
}

pub struct Registry {
    entries: Vec<RegistryEntry>,
    matcher: Box<dyn FaceMatcher>,
}

impl Registry {
    pub fn new(matcher: Box<dyn FaceMatcher>) -> Self {
        Self {
            entries: Vec::new(),
            matcher,
        }
    }

    /// Wrap into the shared handle used across threads.
    pub fn shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Append a (name, embedding) pair and return the new entry count.
    ///
    /// `None` means embedding extraction found no face; the registry is left
    /// untouched.
    pub fn enroll(
        &mut self,
        name: &str,
        embedding: Option<Embedding>,
    ) -> Result<usize, EnrollError> {
        let embedding = embedding.ok_or(EnrollError::NoFaceDetected)?;

        if let Some(first) = self.entries.first() {
            if first.embedding.dim() != embedding.dim() {
                return Err(EnrollError::DimensionMismatch {
                    expected: first.embedding.dim(),
                    actual: embedding.dim(),
                });
            }
        }

        self.entries.push(RegistryEntry {
            name: name.to_string(),
            embedding,
        });
        tracing::info!(name, entries = self.entries.len(), "enrolled face");
        Ok(self.entries.len())
    }

    /// First entry, in insertion order, that matches the candidate.
    pub fn identify(&self, candidate: &Embedding) -> Option<&RegistryEntry> {
        self.entries
            .iter()
            .find(|entry| self.matcher.is_match(&entry.embedding, candidate))
    }

    /// Name of the first matching entry, or [`UNKNOWN`].
    pub fn match_face(&self, candidate: &Embedding) -> &str {
        self.identify(candidate)
            .map(|entry| entry.name.as_str())
            .unwrap_or(UNKNOWN)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn embeddings(&self) -> impl Iterator<Item = &Embedding> {
        self.entries.iter().map(|e| &e.embedding)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
