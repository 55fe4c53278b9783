use std::env;

use gridstore_core::{ChunkKind, GridDimensions};
use gridstore_stats::StatsMode;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// Grid configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Grid height in cells
    pub n_rows: u64,
    /// Grid width in cells
    pub n_cols: u64,
    /// Chunk height in cells
    pub chunk_rows: usize,
    /// Chunk width in cells
    pub chunk_cols: usize,
    /// Encoding for newly created chunks
    pub chunk_kind: ChunkKind,
    /// How grid statistics are kept
    pub stats_mode: StatsMode,
    /// Tracked memory above which scans compact the grid first
    pub memory_budget_bytes: Option<usize>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            n_rows: 1000,
            n_cols: 1000,
            chunk_rows: 64,
            chunk_cols: 64,
            chunk_kind: ChunkKind::Map,
            stats_mode: StatsMode::NotUpdated,
            memory_budget_bytes: None,
        }
    }
}

impl GridConfig {
    /// Load configuration from `GRIDSTORE_*` environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from any variable lookup, falling back to defaults
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let n_rows = lookup("GRIDSTORE_ROWS")
            .unwrap_or_else(|| defaults.n_rows.to_string())
            .parse()?;
        let n_cols = lookup("GRIDSTORE_COLS")
            .unwrap_or_else(|| defaults.n_cols.to_string())
            .parse()?;
        let chunk_rows = lookup("GRIDSTORE_CHUNK_ROWS")
            .unwrap_or_else(|| defaults.chunk_rows.to_string())
            .parse()?;
        let chunk_cols = lookup("GRIDSTORE_CHUNK_COLS")
            .unwrap_or_else(|| defaults.chunk_cols.to_string())
            .parse()?;
        let chunk_kind = lookup("GRIDSTORE_CHUNK_KIND")
            .unwrap_or_else(|| defaults.chunk_kind.to_string())
            .parse()?;
        let stats_mode = lookup("GRIDSTORE_STATS_MODE")
            .unwrap_or_else(|| defaults.stats_mode.to_string())
            .parse()?;
        let memory_budget_bytes = match lookup("GRIDSTORE_MEMORY_BUDGET") {
            Some(bytes) => Some(bytes.parse()?),
            None => defaults.memory_budget_bytes,
        };

        let config = Self {
            n_rows,
            n_cols,
            chunk_rows,
            chunk_cols,
            chunk_kind,
            stats_mode,
            memory_budget_bytes,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_dimensions(&self.dimensions())
    }

    pub fn dimensions(&self) -> GridDimensions {
        GridDimensions::new(self.n_rows, self.n_cols, self.chunk_rows, self.chunk_cols)
    }
}

/// Reject empty grids, empty chunks and grids with more chunks per axis than a
/// [`ChunkId`](gridstore_core::ChunkId) can address.
pub fn validate_dimensions(dims: &GridDimensions) -> Result<()> {
    if dims.n_rows == 0 || dims.n_cols == 0 {
        return Err(GridError::InvalidConfig(format!(
            "grid extent {}x{} must be non-zero",
            dims.n_rows, dims.n_cols
        )));
    }
    if dims.chunk_rows == 0 || dims.chunk_cols == 0 {
        return Err(GridError::InvalidConfig(format!(
            "chunk extent {}x{} must be non-zero",
            dims.chunk_rows, dims.chunk_cols
        )));
    }
    let too_many = |cells: u64, chunk: usize| cells.div_ceil(chunk as u64) > u64::from(u32::MAX);
    if too_many(dims.n_rows, dims.chunk_rows) || too_many(dims.n_cols, dims.chunk_cols) {
        return Err(GridError::InvalidConfig(
            "grid has more chunks per axis than chunk ids can address".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_empty_environment() {
        let config = GridConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config, GridConfig::default());
        assert_eq!(config.dimensions().n_chunks(), 16 * 16);
    }

    #[test]
    fn test_from_vars() {
        let config = GridConfig::from_vars(vars(&[
            ("GRIDSTORE_ROWS", "200"),
            ("GRIDSTORE_COLS", "300"),
            ("GRIDSTORE_CHUNK_ROWS", "32"),
            ("GRIDSTORE_CHUNK_KIND", "array"),
            ("GRIDSTORE_STATS_MODE", "updated"),
            ("GRIDSTORE_MEMORY_BUDGET", "1048576"),
        ]))
        .unwrap();
        assert_eq!((config.n_rows, config.n_cols), (200, 300));
        assert_eq!((config.chunk_rows, config.chunk_cols), (32, 64));
        assert_eq!(config.chunk_kind, ChunkKind::Array);
        assert_eq!(config.stats_mode, StatsMode::Updated);
        assert_eq!(config.memory_budget_bytes, Some(1 << 20));
    }

    #[test]
    fn test_from_vars_rejects_bad_values() {
        assert!(GridConfig::from_vars(vars(&[("GRIDSTORE_ROWS", "many")])).is_err());
        assert!(GridConfig::from_vars(vars(&[("GRIDSTORE_CHUNK_KIND", "sparse")])).is_err());
        assert!(GridConfig::from_vars(vars(&[("GRIDSTORE_CHUNK_COLS", "0")])).is_err());
    }

    #[test]
    fn test_from_json() {
        let config =
            GridConfig::from_json(r#"{"n_rows": 10, "chunk_kind": "singlet", "stats_mode": "not_updated"}"#)
                .unwrap();
        assert_eq!(config.n_rows, 10);
        assert_eq!(config.n_cols, 1000);
        assert_eq!(config.chunk_kind, ChunkKind::Singlet);

        let err = GridConfig::from_json(r#"{"n_rows": 0}"#).unwrap_err();
        assert!(matches!(err, GridError::InvalidConfig(_)));
        let err = GridConfig::from_json("{").unwrap_err();
        assert!(matches!(err, GridError::ConfigParse(_)));
    }

    #[test]
    fn test_json_round_trip_keeps_budget() {
        let config = GridConfig {
            memory_budget_bytes: Some(4096),
            ..GridConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(GridConfig::from_json(&json).unwrap(), config);
    }
}
