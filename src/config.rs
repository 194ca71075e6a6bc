use serde::{Deserialize, Serialize};

use crate::core::{OgmError, Result};

/// How the materializer treats edges that no relationship field claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// Unmapped edges are skipped and logged at debug level.
    #[default]
    Permissive,
    /// Unmapped edges fail the materialization with a mapping error.
    Strict,
}

/// Mapping configuration
///
/// Shared by the serializer, the materializer and [`crate::GraphSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Policy for unmapped incoming edges
    pub mapping_mode: MappingMode,

    /// Relationship hops the serializer cascades through (None = unlimited)
    pub max_write_depth: Option<usize>,

    /// Relationship hops followed when loading a record (None = unlimited)
    pub max_load_depth: Option<usize>,

    /// Version stored when a versioned entity is inserted
    pub initial_version: i64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingConfig {
    /// Create the default configuration: permissive, unlimited depth
    pub fn new() -> Self {
        Self {
            mapping_mode: MappingMode::Permissive,
            max_write_depth: None,
            max_load_depth: None,
            initial_version: 0,
        }
    }

    /// Set the mapping mode
    pub fn mapping_mode(mut self, mode: MappingMode) -> Self {
        self.mapping_mode = mode;
        self
    }

    /// Shortcut for `mapping_mode(MappingMode::Strict)`
    pub fn strict(self) -> Self {
        self.mapping_mode(MappingMode::Strict)
    }

    /// Limit how deep saves cascade
    pub fn max_write_depth(mut self, depth: usize) -> Self {
        self.max_write_depth = Some(depth);
        self
    }

    /// Limit how deep loads traverse
    pub fn max_load_depth(mut self, depth: usize) -> Self {
        self.max_load_depth = Some(depth);
        self
    }

    /// Set the version written on insert
    pub fn initial_version(mut self, version: i64) -> Self {
        self.initial_version = version;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.mapping_mode == MappingMode::Strict
    }

    /// Parse from a JSON document; missing keys keep their defaults.
    ///
    /// ```
    /// use graphmodel::{MappingConfig, MappingMode};
    ///
    /// let config = MappingConfig::from_json_str(r#"{"mapping_mode": "strict"}"#).unwrap();
    /// assert_eq!(config.mapping_mode, MappingMode::Strict);
    /// assert_eq!(config.max_write_depth, None);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| OgmError::Schema(format!("Invalid mapping config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_version < 0 {
            return Err(OgmError::Schema(format!(
                "initial_version must be non-negative, got {}",
                self.initial_version
            )));
        }
        Ok(())
    }
}
