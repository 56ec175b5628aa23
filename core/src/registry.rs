use crate::error::{HangingError, Result};
use crate::protocols::{builtin_protocols, default_protocol, DEFAULT_PROTOCOL_ID};
use crate::types::Protocol;
use log::{debug, info};
use std::path::Path;

/// Ordered, append-only store of hanging protocols
///
/// Registration order is the tie-break order of protocol matching. One
/// protocol is designated the fallback default; it is applied when no other
/// protocol matches and is never ranked itself.
///
/// # Example
///
/// ```
/// use hanging_core::{Protocol, ProtocolRegistry, Stage};
///
/// let mut registry = ProtocolRegistry::new();
/// registry
///     .add_protocol(Protocol::new("single").with_stage(Stage::grid(1, 1)))
///     .unwrap();
///
/// assert!(registry.get("single").is_some());
/// assert!(registry.add_protocol(Protocol::new("single").with_stage(Stage::grid(1, 1))).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    protocols: Vec<Protocol>,
    default_id: String,
}

impl ProtocolRegistry {
    /// Creates a registry holding only the built-in default protocol
    pub fn new() -> Self {
        Self {
            protocols: vec![default_protocol()],
            default_id: DEFAULT_PROTOCOL_ID.to_string(),
        }
    }

    /// Creates a registry holding every built-in protocol
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for protocol in builtin_protocols() {
            if protocol.id != DEFAULT_PROTOCOL_ID {
                registry.protocols.push(protocol);
            }
        }
        registry
    }

    /// Validates and appends a protocol
    ///
    /// # Errors
    ///
    /// Returns an error if the protocol is malformed or its id is taken.
    pub fn add_protocol(&mut self, mut protocol: Protocol) -> Result<()> {
        if self.protocols.iter().any(|p| p.id == protocol.id) {
            return Err(HangingError::DuplicateProtocol(protocol.id));
        }
        protocol.validate()?;
        debug!(
            "Registered protocol {} at position {}",
            protocol.id,
            self.protocols.len()
        );
        self.protocols.push(protocol);
        Ok(())
    }

    /// Parses one protocol object or an array of them
    pub fn load_json(&mut self, json: &str) -> Result<usize> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let protocols: Vec<Protocol> = match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)?,
            other => vec![serde_json::from_value(other)?],
        };

        let count = protocols.len();
        for protocol in protocols {
            self.add_protocol(protocol)?;
        }
        Ok(count)
    }

    /// Reads protocols from a JSON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let json = std::fs::read_to_string(path)?;
        let count = self.load_json(&json)?;
        info!("Loaded {} protocol(s) from {}", count, path.display());
        Ok(count)
    }

    /// Looks up a protocol by id, falling back to a case-insensitive match
    pub fn get(&self, id: &str) -> Option<&Protocol> {
        self.protocols
            .iter()
            .find(|p| p.id == id)
            .or_else(|| self.protocols.iter().find(|p| p.id.eq_ignore_ascii_case(id)))
    }

    /// Looks up a protocol, failing with `UnknownProtocol`
    pub fn require(&self, id: &str) -> Result<&Protocol> {
        self.get(id)
            .ok_or_else(|| HangingError::UnknownProtocol(id.to_string()))
    }

    /// Designates a registered protocol as the fallback
    pub fn set_default_protocol(&mut self, id: &str) -> Result<()> {
        let id = self.require(id)?.id.clone();
        info!("Default protocol is now {}", id);
        self.default_id = id;
        Ok(())
    }

    pub fn default_protocol(&self) -> Option<&Protocol> {
        self.get(&self.default_id)
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Protocols taking part in matching, in registration order
    pub fn candidates(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.iter().filter(move |p| p.id != self.default_id)
    }

    /// Every protocol, including the default
    pub fn iter(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.iter()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;
    use rstest::rstest;

    #[test]
    fn test_registration_order_preserved() {
        let mut registry = ProtocolRegistry::new();
        for id in ["b", "a", "c"] {
            registry
                .add_protocol(Protocol::new(id).with_stage(Stage::grid(1, 1)))
                .unwrap();
        }

        let ids: Vec<_> = registry.candidates().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_duplicate_and_invalid_rejected() {
        let mut registry = ProtocolRegistry::new();
        assert!(matches!(
            registry.add_protocol(Protocol::new(DEFAULT_PROTOCOL_ID).with_stage(Stage::grid(1, 1))),
            Err(HangingError::DuplicateProtocol(_))
        ));
        assert!(matches!(
            registry.add_protocol(Protocol::new("no-stages")),
            Err(HangingError::InvalidProtocol(_))
        ));
    }

    #[test]
    fn test_get_case_insensitive() {
        let mut registry = ProtocolRegistry::new();
        registry
            .add_protocol(Protocol::new("MG-Screening").with_stage(Stage::grid(1, 1)))
            .unwrap();

        assert!(registry.get("mg-screening").is_some());
        assert!(matches!(
            registry.require("ct"),
            Err(HangingError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn test_load_json_object_or_array() {
        let mut registry = ProtocolRegistry::new();
        let single = r#"{"id": "one", "stages": [{"name": "s"}]}"#;
        let many = r#"[{"id": "two", "stages": [{}]}, {"id": "three", "stages": [{}]}]"#;

        assert_eq!(registry.load_json(single).unwrap(), 1);
        assert_eq!(registry.load_json(many).unwrap(), 2);
        assert!(registry.load_json("{not json").is_err());
        assert_eq!(registry.candidates().count(), 3);
    }

    #[rstest]
    #[case(0, 2)]
    #[case(9, 9)]
    #[case(usize::MAX, 2)]
    fn test_load_json_rejects_unsupported_grid(#[case] rows: usize, #[case] columns: usize) {
        let mut registry = ProtocolRegistry::new();
        let json = serde_json::json!({
            "id": "huge",
            "stages": [{"viewportStructure": {"rows": rows, "columns": columns}}]
        })
        .to_string();

        assert!(matches!(
            registry.load_json(&json),
            Err(HangingError::InvalidProtocol(_))
        ));
        assert!(registry.get("huge").is_none());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protocols.json");
        std::fs::write(&path, r#"[{"id": "file", "stages": [{}]}]"#).unwrap();

        let mut registry = ProtocolRegistry::new();
        assert_eq!(registry.load_file(&path).unwrap(), 1);
        assert!(registry.load_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_default_excluded_from_candidates() {
        let mut registry = ProtocolRegistry::with_builtins();
        assert!(registry.candidates().all(|p| p.id != DEFAULT_PROTOCOL_ID));
        assert!(registry.default_protocol().is_some());

        registry
            .add_protocol(Protocol::new("fallback").with_stage(Stage::grid(1, 1)))
            .unwrap();
        registry.set_default_protocol("fallback").unwrap();

        assert_eq!(registry.default_id(), "fallback");
        assert!(registry.candidates().any(|p| p.id == DEFAULT_PROTOCOL_ID));
        assert!(registry.set_default_protocol("missing").is_err());
    }
}
