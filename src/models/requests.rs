//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{PolicyOverride, Priority};

/// Request body for `PUT /cache/:key`
///
/// Every field besides `value` is optional and adjusts the key class policy
/// for this one write.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// Any JSON value
    pub value: Value,
    /// TTL in milliseconds
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    /// Extra tags, merged with the class tags
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub compress: Option<bool>,
    #[serde(default)]
    pub encrypt: Option<bool>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.ttl_ms == Some(0) {
            return Some("ttl_ms must be greater than zero".to_string());
        }
        if self.tags.iter().any(|tag| tag.is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        None
    }

    /// Policy adjustments requested by this body.
    pub fn to_override(&self) -> PolicyOverride {
        let mut overrides = PolicyOverride::new().tags(self.tags.iter().cloned());
        overrides.ttl = self.ttl_ms.map(std::time::Duration::from_millis);
        overrides.priority = self.priority;
        overrides.compress = self.compress;
        overrides.encrypt = self.encrypt;
        overrides
    }
}

/// Request body for `POST /invalidate`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    pub tags: Vec<String>,
}

impl InvalidateRequest {
    pub fn validate(&self) -> Option<String> {
        if self.tags.is_empty() {
            return Some("At least one tag is required".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_request_deserialize() {
        let json = r#"{"value": {"name": "Ann"}}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.value["name"], "Ann");
        assert!(req.ttl_ms.is_none());
        assert!(req.tags.is_empty());
        assert_eq!(req.to_override(), PolicyOverride::new());
    }

    #[test]
    fn test_set_request_with_options() {
        let json = r#"{"value": 1, "ttl_ms": 500, "tags": ["u"], "priority": "high", "encrypt": true}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        let overrides = req.to_override();

        assert_eq!(overrides.ttl, Some(Duration::from_millis(500)));
        assert_eq!(overrides.tags, vec!["u".to_string()]);
        assert_eq!(overrides.priority, Some(Priority::High));
        assert_eq!(overrides.encrypt, Some(true));
        assert_eq!(overrides.compress, None);
    }

    #[test]
    fn test_validate_zero_ttl() {
        let req: SetRequest = serde_json::from_str(r#"{"value": 1, "ttl_ms": 0}"#).unwrap();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_empty_tag() {
        let req: SetRequest = serde_json::from_str(r#"{"value": 1, "tags": [""]}"#).unwrap();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_valid_request() {
        let req: SetRequest = serde_json::from_str(r#"{"value": "x", "ttl_ms": 60}"#).unwrap();
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_invalidate_request() {
        let req: InvalidateRequest = serde_json::from_str(r#"{"tags": []}"#).unwrap();
        assert!(req.validate().is_some());

        let req: InvalidateRequest = serde_json::from_str(r#"{"tags": ["u"]}"#).unwrap();
        assert!(req.validate().is_none());
    }
}
