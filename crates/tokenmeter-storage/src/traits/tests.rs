//! Tests for storage trait types

use super::*;

#[test]
fn test_trim_stats_serialization() {
    let stats = TrimStats {
        kept: 12,
        removed: 3,
        duration_ms: 7,
    };

    let json = serde_json::to_string(&stats).unwrap();
    assert_eq!(json, r#"{"kept":12,"removed":3,"durationMs":7}"#);

    let deserialized: TrimStats = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, stats);
}

#[test]
fn test_trim_stats_default() {
    let stats = TrimStats::default();
    assert_eq!(stats.kept, 0);
    assert_eq!(stats.removed, 0);
    assert_eq!(stats.duration_ms, 0);
}

#[test]
fn test_storage_error_from_json() {
    let err = serde_json::from_str::<TrimStats>("{not json").unwrap_err();
    let storage_err: StorageError = err.into();
    assert!(matches!(storage_err, StorageError::Serialization(_)));
    assert!(storage_err.to_string().starts_with("Serialization error"));
}

#[test]
fn test_storage_error_display() {
    let err = StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "denied",
    ));
    assert_eq!(err.to_string(), "IO error: denied");
}
