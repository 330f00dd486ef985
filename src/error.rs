//! Error types for artloop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in artloop
#[derive(Debug, Error)]
pub enum ArtloopError {
    /// Top-level configuration is unusable (missing paths, bad YAML)
    #[error("Config error: {0}")]
    Config(String),

    /// Named tagset does not exist
    #[error("Tagset not found: {0}")]
    TagsetNotFound(String),

    /// Tagset is still referenced by a device selection or override
    #[error("Tagset in use: {0}")]
    TagsetInUse(String),

    /// Device not present in state
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Override duration must be strictly positive
    #[error("Invalid override: {0}")]
    InvalidOverride(String),

    /// Device transfer failed (unreachable, rejected upload)
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Persisted next_run drifted into the past beyond tolerance
    #[error("Schedule drift: {0}")]
    ScheduleDrift(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for ArtloopError {
    fn from(err: rusqlite::Error) -> Self {
        ArtloopError::Storage(err.to_string())
    }
}

/// Result type alias for artloop operations
pub type Result<T> = std::result::Result<T, ArtloopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagset_not_found_error() {
        let err = ArtloopError::TagsetNotFound("safari".to_string());
        assert_eq!(err.to_string(), "Tagset not found: safari");
    }

    #[test]
    fn test_tagset_in_use_error() {
        let err = ArtloopError::TagsetInUse("safari".to_string());
        assert_eq!(err.to_string(), "Tagset in use: safari");
    }

    #[test]
    fn test_invalid_override_error() {
        let err = ArtloopError::InvalidOverride("duration must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid override: duration must be positive");
    }

    #[test]
    fn test_transfer_error() {
        let err = ArtloopError::Transfer("device unreachable".to_string());
        assert_eq!(err.to_string(), "Transfer error: device unreachable");
    }

    #[test]
    fn test_schedule_drift_error() {
        let err = ArtloopError::ScheduleDrift("next_run 3h in the past".to_string());
        assert_eq!(err.to_string(), "Schedule drift: next_run 3h in the past");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ArtloopError = io_err.into();
        assert!(matches!(err, ArtloopError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ArtloopError = json_err.into();
        assert!(matches!(err, ArtloopError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(ArtloopError::DeviceNotFound("tv-1".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
