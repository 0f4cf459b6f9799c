//! Per-node render modes used to retarget shader output for picking.

use serde::{Deserialize, Serialize};

/// What a node's geometry writes into the color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderMode {
    /// Regular shaded output.
    #[default]
    Normal,
    /// Base-255 packed tree index in RGB, alpha 255.
    TreeIndex,
    /// Packed clip-space depth across RGBA.
    Depth,
}

impl RenderMode {
    /// Returns display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            RenderMode::Normal => "Normal",
            RenderMode::TreeIndex => "TreeIndex",
            RenderMode::Depth => "Depth",
        }
    }

    /// Whether this mode encodes a pick payload instead of shaded color.
    #[must_use]
    pub fn is_picking(self) -> bool {
        !matches!(self, RenderMode::Normal)
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_normal() {
        assert_eq!(RenderMode::default(), RenderMode::Normal);
        assert!(!RenderMode::Normal.is_picking());
        assert!(RenderMode::TreeIndex.is_picking());
        assert!(RenderMode::Depth.is_picking());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&RenderMode::TreeIndex).unwrap();
        assert_eq!(json, "\"TreeIndex\"");
        let mode: RenderMode = serde_json::from_str("\"Depth\"").unwrap();
        assert_eq!(mode, RenderMode::Depth);
    }
}
