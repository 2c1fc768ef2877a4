use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a node in a workflow graph.
///
/// `Start` and `End` are virtual: the runner begins at the node the entry
/// edge points to and treats `End` as the completion marker. Every real node
/// is `Custom` with a stable label, e.g. `brand_industry_classifier.process`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Start,
    End,
    Custom(String),
}

impl NodeKind {
    /// Convenience constructor for a custom node.
    #[must_use]
    pub fn custom(label: impl Into<String>) -> Self {
        NodeKind::Custom(label.into())
    }

    /// Stable string encoding used by checkpoints.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => "Start".to_string(),
            NodeKind::End => "End".to_string(),
            NodeKind::Custom(label) => format!("Custom:{label}"),
        }
    }

    /// Inverse of [`NodeKind::encode`]. Unknown encodings round-trip as
    /// `Custom` so old checkpoints stay loadable.
    #[must_use]
    pub fn decode(s: &str) -> Self {
        match s {
            "Start" => NodeKind::Start,
            "End" => NodeKind::End,
            other => match other.strip_prefix("Custom:") {
                Some(label) => NodeKind::Custom(label.to_string()),
                None => NodeKind::Custom(other.to_string()),
            },
        }
    }

    /// Human-readable label, used in status reports and error messages.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::End => "End",
            NodeKind::Custom(label) => label,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        for kind in [
            NodeKind::Start,
            NodeKind::End,
            NodeKind::custom("classifier.process"),
        ] {
            assert_eq!(NodeKind::decode(&kind.encode()), kind);
        }
    }

    #[test]
    fn unknown_encoding_becomes_custom() {
        assert_eq!(
            NodeKind::decode("legacy_node"),
            NodeKind::Custom("legacy_node".into())
        );
    }
}
