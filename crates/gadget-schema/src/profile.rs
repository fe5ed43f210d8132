use crate::model::{ModelCharacteristics, ValidationConstraints};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Validation inputs supplied by the device model and installer, loaded
/// from a TOML profile:
///
/// ```toml
/// [model]
/// classic = false
/// requires-system-seed = true
///
/// [constraints]
/// encrypted-data = true
/// ```
///
/// A missing section means no model- or deployment-specific rules apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationProfile {
    #[serde(default)]
    pub model: Option<ModelCharacteristics>,
    #[serde(default)]
    pub constraints: Option<ValidationConstraints>,
}

pub fn parse_profile_str(input: &str) -> Result<ValidationProfile, SchemaError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_profile_file(path: impl AsRef<Path>) -> Result<ValidationProfile, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_profile_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_profile() {
        let input = r"
[model]
classic = false
requires-system-seed = true

[constraints]
encrypted-data = true
";
        let profile = parse_profile_str(input).expect("should parse");
        let model = profile.model.unwrap();
        assert!(!model.classic);
        assert!(model.requires_system_seed);
        assert!(profile.constraints.unwrap().encrypted_data);
    }

    #[test]
    fn empty_profile_has_no_sections() {
        let profile = parse_profile_str("").unwrap();
        assert_eq!(profile, ValidationProfile::default());
    }

    #[test]
    fn section_fields_default_to_false() {
        let profile = parse_profile_str("[model]\n").unwrap();
        assert_eq!(profile.model, Some(ModelCharacteristics::default()));
        assert!(profile.constraints.is_none());
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r"
[constraints]
encrypted-data = true
tpm = true
";
        assert!(parse_profile_str(input).is_err());
    }

    #[test]
    fn reads_profile_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.toml");
        std::fs::write(&path, "[model]\nrequires-system-seed = true\n").unwrap();
        let profile = parse_profile_file(&path).unwrap();
        assert!(profile.model.unwrap().requires_system_seed);
    }

    #[test]
    fn missing_profile_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_profile_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, SchemaError::Io(_)));
    }
}
