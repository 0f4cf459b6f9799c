//! Configuration options for picking.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How pixels are read back from a pick target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadbackMode {
    /// Block the caller until the GPU copy is done.
    Blocking,
    /// Await a completion signal without stalling the render thread.
    #[default]
    Deferred,
}

/// Options for a picking handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickOptions {
    /// Readback strategy.
    pub readback: ReadbackMode,

    /// Visit candidates nearest bounding box first.
    pub sort_candidates_by_bounds: bool,

    /// Reuse the full-buffer depth capture until the next frame.
    pub cache_depth_per_frame: bool,
}

impl Default for PickOptions {
    fn default() -> Self {
        Self {
            readback: ReadbackMode::Deferred,
            sort_candidates_by_bounds: true,
            cache_depth_per_frame: true,
        }
    }
}

impl PickOptions {
    /// Options using the blocking readback strategy.
    #[must_use]
    pub fn blocking() -> Self {
        Self {
            readback: ReadbackMode::Blocking,
            ..Self::default()
        }
    }

    /// Parses options from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options = serde_json::from_str(json)?;
        log::debug!("loaded pick options: {options:?}");
        Ok(options)
    }

    /// Serializes the options to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
