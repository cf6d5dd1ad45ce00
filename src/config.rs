//! Codec and lowering settings.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! { "codec": { "strict_version": true }, "lower": { "source_file": "main.bal" } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BirConfig {
    pub codec: CodecConfig,
    pub lower: LowerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Reject files whose version differs from the supported one instead of warning.
    pub strict_version: bool,
    /// Nesting limit for SemTypes and constant values.
    pub max_type_depth: usize,
    /// Reject trailing bytes after the module and inside length-prefixed sections.
    pub require_full_consumption: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            strict_version: false,
            max_type_depth: 256,
            require_full_consumption: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowerConfig {
    /// File name stamped on positions when the AST does not carry one.
    pub source_file: String,
}

impl Default for LowerConfig {
    fn default() -> Self {
        LowerConfig {
            source_file: "<source>".to_string(),
        }
    }
}

impl BirConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let cfg = BirConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, BirConfig::default());
        assert_eq!(cfg.codec.max_type_depth, 256);
        assert!(cfg.codec.require_full_consumption);
    }

    #[test]
    fn test_partial_override() {
        let cfg = BirConfig::from_json_str(r#"{"codec": {"strict_version": true}}"#).unwrap();
        assert!(cfg.codec.strict_version);
        assert_eq!(cfg.codec.max_type_depth, 256);
        assert_eq!(cfg.lower.source_file, "<source>");
    }

    #[test]
    fn test_bad_json_is_a_parse_error() {
        assert!(matches!(
            BirConfig::from_json_str("{codec"),
            Err(ConfigError::Parse(_))
        ));
    }
}
