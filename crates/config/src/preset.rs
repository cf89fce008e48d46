//! Generation presets

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A bag of dialect-specific generation parameters (temperature, top_p,
/// repetition penalties, …) merged verbatim into backend payloads. The
/// gateway never interprets individual keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preset(pub Map<String, Value>);

impl Preset {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The parameter map, for merging into a payload.
    pub fn params(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_params(self) -> Map<String, Value> {
        self.0
    }
}
