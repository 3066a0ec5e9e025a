use serde::Deserialize;

/// Tunables of a [`StateTree`](crate::StateTree).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use state_tree::TreeOptions;
///
/// let opts = TreeOptions::from_json(r#"{"node_capacity": 256}"#).unwrap();
/// assert_eq!(opts.node_capacity, 256);
/// assert_eq!(opts.max_execution_rounds, TreeOptions::default().max_execution_rounds);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    /// Reject invariant violations with an error. When off they are logged
    /// and repaired where possible. Defaults to on in debug builds.
    pub strict_invariants: bool,
    /// Number of node slots reserved up front.
    pub node_capacity: usize,
    /// Upper bound on before-flush execution passes within one flush.
    pub max_execution_rounds: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            strict_invariants: cfg!(debug_assertions),
            node_capacity: 64,
            max_execution_rounds: 1_000,
        }
    }
}

impl TreeOptions {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}
