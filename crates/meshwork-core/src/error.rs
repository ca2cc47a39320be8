use thiserror::Error;

use crate::types::EdgeKind;

#[derive(Debug, Error)]
pub enum MeshworkError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Configuration group '{group}' has {actual} slots, expected {expected}")]
    GroupSize {
        group: String,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} mask has {actual} entries, expected {expected}")]
    MaskLength {
        kind: EdgeKind,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown configuration group: {0}")]
    UnknownGroup(String),

    #[error("No configuration groups available")]
    NoGroups,

    #[error("Unknown role '{role}' for domain '{domain}'")]
    UnknownRole { role: String, domain: String },

    #[error("Unknown external tool type: {0}")]
    UnknownTool(String),

    #[error("Unknown prompt set domain: {0}")]
    UnknownDomain(String),

    // Graph errors
    #[error("Node not found: {id} among {known:?}")]
    UnknownNode { id: String, known: Vec<String> },

    // Node execution errors
    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("Node timeout after {timeout_ms}ms: {node}")]
    NodeTimeout { node: String, timeout_ms: u64 },

    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MeshworkError {
    /// Node-execution failures, as opposed to configuration and reference
    /// errors. The scheduler spends the retry budget on both but logs only
    /// these as warnings.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MeshworkError::NodeExecution { .. }
                | MeshworkError::NodeTimeout { .. }
                | MeshworkError::LlmRequest(_)
                | MeshworkError::LlmParse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MeshworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(MeshworkError::NodeTimeout {
            node: "a1".into(),
            timeout_ms: 10
        }
        .is_recoverable());
        assert!(MeshworkError::LlmRequest("HTTP 503".into()).is_recoverable());
        assert!(!MeshworkError::NoGroups.is_recoverable());
        assert!(!MeshworkError::UnknownNode {
            id: "zz".into(),
            known: vec![]
        }
        .is_recoverable());
    }

    #[test]
    fn test_mask_length_message() {
        let err = MeshworkError::MaskLength {
            kind: EdgeKind::Spatial,
            expected: 9,
            actual: 4,
        };
        assert_eq!(err.to_string(), "spatial mask has 4 entries, expected 9");
    }
}
