//! Ingredient detection types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which detector proposed an ingredient
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    /// Locally hosted image model
    Local,
    /// Remote vision API
    Remote,
}

/// One detector's guess for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedIngredient {
    pub name: String,
    pub confidence: f64,
    pub source: DetectionSource,
}

impl DetectedIngredient {
    pub fn new(name: impl Into<String>, confidence: f64, source: DetectionSource) -> Self {
        Self {
            name: name.into(),
            confidence,
            source,
        }
    }
}

/// Fused result for one ingredient name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedIngredient {
    pub name: String,
    pub confidence: f64,
    pub sources: BTreeSet<DetectionSource>,
}

impl MergedIngredient {
    pub fn found_by(&self, source: DetectionSource) -> bool {
        self.sources.contains(&source)
    }
}
