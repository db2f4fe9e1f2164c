//! Trace payload tree.

use serde_json::Value;

/// One node of a trace payload.
///
/// Numbers, booleans and nulls all collapse into `Other`: the miner treats
/// them exactly like a shape it does not understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceNode {
    /// Keyed children in payload order.
    Map(Vec<(String, TraceNode)>),
    List(Vec<TraceNode>),
    Text(String),
    Other,
}

impl TraceNode {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Build a map node from `(key, child)` pairs, keeping their order.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, TraceNode)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<Value> for TraceNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::String(s) => Self::Text(s),
            Value::Null | Value::Bool(_) | Value::Number(_) => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn converts_json_preserving_key_order() {
        let node = TraceNode::from(json!({"zeta": "z", "alpha": ["a", 1, null]}));
        assert_eq!(
            node,
            TraceNode::map([
                ("zeta", TraceNode::text("z")),
                (
                    "alpha",
                    TraceNode::List(vec![TraceNode::text("a"), TraceNode::Other, TraceNode::Other])
                ),
            ])
        );
    }

    #[test]
    fn scalars_are_other() {
        assert_eq!(TraceNode::from(json!(true)), TraceNode::Other);
        assert_eq!(TraceNode::from(json!(3.5)), TraceNode::Other);
        assert_eq!(TraceNode::from(json!(null)), TraceNode::Other);
    }
}
