//! Common types used across Graft modules.

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Free-form plugin configuration map.
pub type ConfigMap = std::collections::HashMap<String, serde_json::Value>;
