//! Replica naming convention
//!
//! Every workload deployed by the console is named
//! `<app>-1-<tag>-dhorse`, and the orchestrator appends generated
//! segments to it for each running instance
//! (`shop-1-prod-dhorse-7d9c6b5f4-x2k4p`). This name is the only
//! identifier guaranteed to be present on every backend, so it is the
//! join key between live cluster state and the application records.

use crate::error::{ConsoleError, Result};

/// Literal between the application name and the environment tag
pub const SEPARATOR: &str = "-1-";

/// Product marker closing the deterministic part of the name
pub const MARKER: &str = "-dhorse";

/// Encodes and decodes replica names
#[derive(Debug, Clone, Copy, Default)]
pub struct NamingCodec;

impl NamingCodec {
    /// Build the deterministic workload name for an application environment.
    ///
    /// Segments containing the separator or the marker are rejected: they
    /// would make correlation by prefix ambiguous.
    pub fn encode(app_name: &str, env_tag: &str) -> Result<String> {
        Self::check_segment(app_name, "application name")?;
        Self::check_segment(env_tag, "environment tag")?;

        let head = format!("{app_name}{SEPARATOR}{env_tag}");
        if !Self::single_separator(&head) {
            return Err(ConsoleError::AmbiguousName(head));
        }
        // A tag such as `dhorse-eu` would place an earlier marker in the name
        let name = format!("{head}{MARKER}");
        if Self::marker_position(&name) != Some(head.len()) {
            return Err(ConsoleError::AmbiguousName(head));
        }
        Ok(name)
    }

    /// Recover `(app_name, env_tag)` from a workload or replica name
    pub fn decode(replica_name: &str) -> Result<(String, String)> {
        let name = replica_name.trim();
        let marker_at = Self::marker_position(name)
            .ok_or_else(|| ConsoleError::MalformedName(name.to_string()))?;

        let head = &name[..marker_at];
        if head.contains(SEPARATOR) && !Self::single_separator(head) {
            return Err(ConsoleError::AmbiguousName(name.to_string()));
        }
        let (app_name, env_tag) = head
            .split_once(SEPARATOR)
            .ok_or_else(|| ConsoleError::MalformedName(name.to_string()))?;

        if app_name.is_empty() || env_tag.is_empty() {
            return Err(ConsoleError::MalformedName(name.to_string()));
        }

        Ok((app_name.to_string(), env_tag.to_string()))
    }

    /// Truncate a live resource name to its correlation key, the
    /// deterministic prefix produced by [`NamingCodec::encode`].
    pub fn correlation_key(resource_name: &str) -> Option<&str> {
        Self::marker_position(resource_name).map(|at| &resource_name[..at + MARKER.len()])
    }

    /// Position of the first marker that either ends the name or is
    /// followed by a generated segment.
    fn marker_position(name: &str) -> Option<usize> {
        let mut from = 0;
        while let Some(found) = name[from..].find(MARKER) {
            let at = from + found;
            let rest = &name[at + MARKER.len()..];
            if rest.is_empty() || rest.starts_with('-') {
                return Some(at);
            }
            from = at + MARKER.len();
        }
        None
    }

    /// Overlapping occurrences count: `a-1-1-b` holds the separator twice
    fn single_separator(head: &str) -> bool {
        head.find(SEPARATOR) == head.rfind(SEPARATOR)
    }

    fn check_segment(segment: &str, what: &str) -> Result<()> {
        if segment.trim().is_empty() {
            return Err(ConsoleError::MalformedName(format!("empty {what}")));
        }
        if segment.contains(SEPARATOR) || segment.contains(MARKER) {
            return Err(ConsoleError::MalformedName(format!(
                "{what} '{segment}' contains a reserved naming literal"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(
            NamingCodec::encode("shop", "prod").unwrap(),
            "shop-1-prod-dhorse"
        );
    }

    #[test]
    fn test_decode_round_trip() {
        let pairs = [
            ("shop", "prod"),
            ("order-service", "pre-release"),
            ("a", "b"),
            ("billing-2", "qa1"),
        ];
        for (app, tag) in pairs {
            let name = NamingCodec::encode(app, tag).unwrap();
            let (decoded_app, decoded_tag) = NamingCodec::decode(&name).unwrap();
            assert_eq!((decoded_app.as_str(), decoded_tag.as_str()), (app, tag));
            assert_eq!(NamingCodec::encode(&decoded_app, &decoded_tag).unwrap(), name);
        }
    }

    #[test]
    fn test_decode_replica_with_generated_suffix() {
        let (app, tag) = NamingCodec::decode("shop-1-prod-dhorse-7d9c6b5f4-x2k4p").unwrap();
        assert_eq!(app, "shop");
        assert_eq!(tag, "prod");
    }

    #[test]
    fn test_decode_rejects_missing_marker() {
        let err = NamingCodec::decode("shop-1-prod-7d9c6b5f4-x2k4p").unwrap_err();
        assert!(matches!(err, ConsoleError::MalformedName(_)));

        // Marker glued to another word does not count
        let err = NamingCodec::decode("shop-1-prod-dhorsex-abc").unwrap_err();
        assert!(matches!(err, ConsoleError::MalformedName(_)));
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        let err = NamingCodec::decode("shop-prod-dhorse-abc").unwrap_err();
        assert!(matches!(err, ConsoleError::MalformedName(_)));
    }

    #[test]
    fn test_decode_rejects_empty_segments() {
        assert!(matches!(
            NamingCodec::decode("-1-prod-dhorse-abc").unwrap_err(),
            ConsoleError::MalformedName(_)
        ));
        assert!(matches!(
            NamingCodec::decode("").unwrap_err(),
            ConsoleError::MalformedName(_)
        ));
    }

    #[test]
    fn test_decode_rejects_embedded_separator() {
        let err = NamingCodec::decode("shop-1-prod-1-eu-dhorse-abc").unwrap_err();
        assert!(matches!(err, ConsoleError::AmbiguousName(_)));
    }

    #[test]
    fn test_overlapping_separator_is_ambiguous() {
        // ("a-1", "b") and ("a", "1-b") would both produce "a-1-1-b-dhorse"
        assert!(matches!(
            NamingCodec::encode("a-1", "b").unwrap_err(),
            ConsoleError::AmbiguousName(_)
        ));
        assert!(matches!(
            NamingCodec::encode("a", "1-b").unwrap_err(),
            ConsoleError::AmbiguousName(_)
        ));
        assert!(matches!(
            NamingCodec::decode("a-1-1-b-dhorse-xyz").unwrap_err(),
            ConsoleError::AmbiguousName(_)
        ));
    }

    #[test]
    fn test_encode_rejects_reserved_literals() {
        assert!(NamingCodec::encode("shop-1-x", "prod").is_err());
        assert!(NamingCodec::encode("shop-dhorse", "prod").is_err());
        assert!(NamingCodec::encode("shop", "").is_err());
        assert!(NamingCodec::encode("  ", "prod").is_err());
    }

    #[test]
    fn test_encode_rejects_tags_opening_with_marker_word() {
        for tag in ["dhorse", "dhorse-eu"] {
            assert!(matches!(
                NamingCodec::encode("shop", tag).unwrap_err(),
                ConsoleError::AmbiguousName(_)
            ));
        }
        // Only a whole segment matches the marker
        let name = NamingCodec::encode("shop", "dhorsex").unwrap();
        assert_eq!(NamingCodec::correlation_key(&name), Some(name.as_str()));
        assert_eq!(
            NamingCodec::decode(&name).unwrap(),
            ("shop".to_string(), "dhorsex".to_string())
        );
    }

    #[test]
    fn test_correlation_key() {
        assert_eq!(
            NamingCodec::correlation_key("shop-1-prod-dhorse-7d9c6b5f4-x2k4p"),
            Some("shop-1-prod-dhorse")
        );
        assert_eq!(
            NamingCodec::correlation_key("shop-1-prod-dhorse"),
            Some("shop-1-prod-dhorse")
        );
        assert_eq!(NamingCodec::correlation_key("coredns-5d78c9869d-abcde"), None);
    }
}
