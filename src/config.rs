//! Configuration documents.
//!
//! Reduction configurations are persisted as pretty printed JSON. Documents are validated on
//! load in the same way as stage options.

use std::path::{Path, PathBuf};

use expanduser::expanduser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use validator::Validate;

use crate::error::Imars3dError;

/// Expand a leading `~` in `path`.
///
/// Paths that cannot be expanded are returned unchanged.
pub fn expand_path(path: &str) -> PathBuf {
    expanduser(path).unwrap_or_else(|_| PathBuf::from(path))
}

/// Fail unless `path` has a `.json` extension.
fn check_extension(path: &Path) -> Result<(), Imars3dError> {
    match path.extension().and_then(|extension| extension.to_str()) {
        Some(extension) if extension.eq_ignore_ascii_case("json") => Ok(()),
        _ => Err(Imars3dError::ExtensionMismatch {
            path: path.to_path_buf(),
            expected: ".json".to_string(),
        }),
    }
}

/// Write `document` as JSON, creating parent directories as needed.
pub fn save_document<T: Serialize + ?Sized>(
    path: &Path,
    document: &T,
) -> Result<(), Imars3dError> {
    check_extension(path)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| Imars3dError::io(parent, err))?;
    }
    let contents = serde_json::to_string_pretty(document)?;
    std::fs::write(path, contents).map_err(|err| Imars3dError::io(path, err))?;
    info!(path = %path.display(), "saved configuration");
    Ok(())
}

/// Read a JSON document and validate it.
pub fn load_document<T: DeserializeOwned + Validate>(path: &Path) -> Result<T, Imars3dError> {
    let document: T = load_value(path)?;
    document.validate()?;
    Ok(document)
}

/// Read a JSON document without validation.
pub fn load_value<T: DeserializeOwned>(path: &Path) -> Result<T, Imars3dError> {
    check_extension(path)?;
    let contents = std::fs::read(path).map_err(|err| Imars3dError::io(path, err))?;
    serde_json::from_slice(&contents).map_err(|source| Imars3dError::InvalidOptions {
        context: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TiltOptions;

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        let options = TiltOptions {
            max_tilt: 2.0,
            ..Default::default()
        };
        save_document(&path, &options).unwrap();
        assert_eq!(options, load_document::<TiltOptions>(&path).unwrap());
    }

    #[test]
    fn wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let err = save_document(&path, &TiltOptions::default()).unwrap_err();
        assert!(matches!(err, Imars3dError::ExtensionMismatch { .. }));
        assert!(!path.exists());
        assert!(matches!(
            load_value::<serde_json::Value>(&path),
            Err(Imars3dError::ExtensionMismatch { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_tilt": 2.0, "colour": "red"}"#).unwrap();
        let err = load_document::<TiltOptions>(&path).unwrap_err();
        assert!(matches!(err, Imars3dError::InvalidOptions { .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_tilt": 90.0}"#).unwrap();
        assert!(matches!(
            load_document::<TiltOptions>(&path),
            Err(Imars3dError::Validation(_))
        ));
    }

    #[test]
    fn missing_document() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_value::<serde_json::Value>(&dir.path().join("absent.json")),
            Err(Imars3dError::NotFound { .. })
        ));
    }

    #[test]
    fn expand_home() {
        assert_eq!(PathBuf::from("/data/ct.tiff"), expand_path("/data/ct.tiff"));
        assert!(!expand_path("~/ct.tiff").starts_with("~"));
    }
}
