//! Result of identifying a tree from a photo.
//!
//! Produced by the external recognition service. This crate stores it and
//! hands it back; it never looks inside.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single identification result.
///
/// Fields the recognition service adds later are kept in `extra` so a stored
/// result round-trips without loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Common species name
    pub name: String,
    pub scientific_name: String,
    /// Recognition confidence, 0.0 to 1.0
    pub confidence: f64,
    pub description: String,
    pub characteristics: Vec<String>,
    pub fun_facts: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
