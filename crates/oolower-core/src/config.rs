use crate::dispatch::InterfaceCallType;
use crate::{OoError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Target and policy knobs for layout and lowering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringConfig {
    pub pointer_size: u32,
    /// Width of the length word stored in front of array data.
    pub array_length_size: u32,
    pub interface_call_type: InterfaceCallType,
    /// Leave final methods that would open a new slot out of the vtable.
    pub omit_final_methods: bool,
    pub emit_rtti: bool,
    /// Create a `<class>$vtable` entity for classes that have none.
    pub create_missing_vtables: bool,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            pointer_size: 8,
            array_length_size: 4,
            interface_call_type: InterfaceCallType::RuntimeLookup,
            omit_final_methods: false,
            emit_rtti: true,
            create_missing_vtables: true,
        }
    }
}

impl LoweringConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| OoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.pointer_size, 4 | 8) {
            return Err(OoError::Config(format!(
                "pointer_size must be 4 or 8, got {}",
                self.pointer_size
            )));
        }
        if !matches!(self.array_length_size, 1 | 2 | 4 | 8) {
            return Err(OoError::Config(format!(
                "array_length_size must be a power of two up to 8, got {}",
                self.array_length_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = LoweringConfig::from_json_str(
            r#"{ "pointer_size": 4, "interface_call_type": { "shape": "indexed-itable" } }"#,
        )
        .unwrap();

        assert_eq!(config.pointer_size, 4);
        assert_eq!(config.interface_call_type, InterfaceCallType::IndexedItable);
        assert_eq!(config.array_length_size, 4);
        assert!(config.emit_rtti);
        assert!(!config.omit_final_methods);
    }

    #[test]
    fn test_invalid_pointer_size_rejected() {
        let err = LoweringConfig::from_json_str(r#"{ "pointer_size": 3 }"#).unwrap_err();
        assert!(matches!(err, OoError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "omit_final_methods": true }}"#).unwrap();

        let config = LoweringConfig::load(file.path()).unwrap();
        assert!(config.omit_final_methods);
        assert_eq!(config.pointer_size, 8);
    }
}
