use serde::{Deserialize, Serialize};

/// Largest streaming radius honoured, in cells.
pub const MAX_STREAMING_RADIUS: u32 = 64;

/// How cache misses are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BuildMode {
    /// Build on the caller's thread inside `update_streaming`.
    #[default]
    Synchronous,
    /// Decode on worker threads; commit to the scene on the next update.
    Background { workers: usize },
}

/// Streaming configuration: radii, cell size and per-update budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Radius (in cells) around the viewer that is kept resident.
    pub streaming_radius: u32,
    /// Radius (in cells) around the viewer whose objects are visible.
    /// Never larger than `streaming_radius` once validated.
    pub detail_radius: u32,
    /// World units per cell side.
    pub cell_side_length: f32,
    /// Maximum number of cells to request per update. `None` is unlimited.
    pub load_budget: Option<usize>,
    pub build_mode: BuildMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            streaming_radius: 2,
            detail_radius: 1,
            cell_side_length: 8192.0,
            load_budget: None,
            build_mode: BuildMode::Synchronous,
        }
    }
}

impl StreamConfig {
    /// Clamp the detail radius to the streaming radius and replace values
    /// that cannot work.
    pub fn validated(mut self) -> Self {
        if self.streaming_radius > MAX_STREAMING_RADIUS {
            tracing::warn!(
                streaming = self.streaming_radius,
                max = MAX_STREAMING_RADIUS,
                "streaming radius too large, clamping"
            );
            self.streaming_radius = MAX_STREAMING_RADIUS;
        }
        if self.detail_radius > self.streaming_radius {
            tracing::warn!(
                detail = self.detail_radius,
                streaming = self.streaming_radius,
                "detail radius exceeds streaming radius, clamping"
            );
            self.detail_radius = self.streaming_radius;
        }
        if !(self.cell_side_length.is_finite() && self.cell_side_length > 0.0) {
            tracing::warn!(
                side = self.cell_side_length,
                "invalid cell side length, using default"
            );
            self.cell_side_length = Self::default().cell_side_length;
        }
        if self.load_budget == Some(0) {
            tracing::warn!("load budget of zero would never load, treating as unlimited");
            self.load_budget = None;
        }
        if let BuildMode::Background { workers: 0 } = self.build_mode {
            self.build_mode = BuildMode::Background { workers: 1 };
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_config_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.streaming_radius, 2);
        assert_eq!(config.detail_radius, 1);
        assert_eq!(config.load_budget, None);
        assert_eq!(config.build_mode, BuildMode::Synchronous);
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn detail_radius_clamped() {
        let config = StreamConfig {
            streaming_radius: 1,
            detail_radius: 4,
            ..StreamConfig::default()
        }
        .validated();
        assert_eq!(config.detail_radius, 1);
    }

    #[test]
    fn huge_radius_clamped() {
        let config = StreamConfig {
            streaming_radius: u32::MAX,
            detail_radius: u32::MAX,
            ..StreamConfig::default()
        }
        .validated();
        assert_eq!(config.streaming_radius, MAX_STREAMING_RADIUS);
        assert_eq!(config.detail_radius, MAX_STREAMING_RADIUS);
    }

    #[test]
    fn unusable_values_replaced() {
        let config = StreamConfig {
            cell_side_length: -3.0,
            load_budget: Some(0),
            build_mode: BuildMode::Background { workers: 0 },
            ..StreamConfig::default()
        }
        .validated();
        assert_eq!(config.cell_side_length, 8192.0);
        assert_eq!(config.load_budget, None);
        assert_eq!(config.build_mode, BuildMode::Background { workers: 1 });
    }

    #[test]
    fn partial_config_deserializes() {
        let json = r#"{
            "streaming_radius": 3,
            "build_mode": { "mode": "background", "workers": 2 }
        }"#;
        let config: StreamConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.streaming_radius, 3);
        assert_eq!(config.detail_radius, 1);
        assert_eq!(config.build_mode, BuildMode::Background { workers: 2 });
    }
}
