//! Marshaling configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{MarshalError, Result};

/// Default capacity of getter-mode byte buffers.
pub const DEFAULT_GETTER_CAPACITY: usize = 1024;

/// Knobs shared by the packer and the attribute helpers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarshalConfig {
    /// Bytes allocated for buffer-shaped attributes read back from the
    /// driver when the caller gives no size.
    pub getter_buffer_capacity: usize,

    /// Reject finite floats that overflow a narrower float type instead of
    /// saturating them to infinity.
    pub strict_float_narrowing: bool,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            getter_buffer_capacity: DEFAULT_GETTER_CAPACITY,
            strict_float_narrowing: true,
        }
    }
}

impl MarshalConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| MarshalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MarshalError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.getter_buffer_capacity == 0 {
            return Err(MarshalError::Config(
                "getter_buffer_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = MarshalConfig::default();
        assert_eq!(c.getter_buffer_capacity, 1024);
        assert!(c.strict_float_narrowing);
    }

    #[test]
    fn test_partial_json() {
        let c = MarshalConfig::from_json(r#"{"strict_float_narrowing": false}"#).unwrap();
        assert_eq!(c.getter_buffer_capacity, 1024);
        assert!(!c.strict_float_narrowing);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = MarshalConfig::from_json(r#"{"getter_buffer_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, MarshalError::Config(_)));
    }

    #[test]
    fn test_bad_json() {
        assert!(MarshalConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("cuarg-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"getter_buffer_capacity": 4096}"#).unwrap();
        let c = MarshalConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(c.getter_buffer_capacity, 4096);
    }
}
