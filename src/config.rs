//! Session configuration.

use serde::Deserialize;

fn default_max_streams() -> usize {
    100
}

/// Per-connection session configuration.
///
/// Loadable from TOML; every field has a default so an empty table is a
/// valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Maximum number of concurrently active streams. Stream-open
    /// requests beyond this limit are refused (RST REFUSED_STREAM).
    #[serde(default = "default_max_streams")]
    pub max_streams_per_connection: usize,

    /// Reject stream-open requests whose id is not strictly greater
    /// than the last accepted client id (RST PROTOCOL_ERROR). Off by
    /// default: out-of-order ids from older clients are only logged.
    #[serde(default)]
    pub strict_stream_id_ordering: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_streams_per_connection: default_max_streams(),
            strict_stream_id_ordering: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_streams_per_connection, 100);
        assert!(!config.strict_stream_id_ordering);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_streams_per_connection, 100);
        assert!(!config.strict_stream_id_ordering);
    }

    #[test]
    fn test_toml_overrides() {
        let config: SessionConfig = toml::from_str(
            r#"
            max_streams_per_connection = 8
            strict_stream_id_ordering = true
            "#,
        )
        .unwrap();
        assert_eq!(config.max_streams_per_connection, 8);
        assert!(config.strict_stream_id_ordering);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<SessionConfig, _> = toml::from_str("max_streams = 8");
        assert!(result.is_err());
    }
}
