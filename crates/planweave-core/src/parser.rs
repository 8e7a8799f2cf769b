//! Structural parser
//!
//! Converts one plan-text line into a command node without resolving
//! references, and a whole plan into a node table. The same decoding path
//! is applied a second time per node, to the fully substituted line, right
//! before that node executes.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::command::CommandRegistry;
use crate::error::GraphError;
use crate::graph::{CommandNode, Edge, NodeTable};
use crate::reference;

/// Wire format revision accepted by the parser and pinned in the
/// recognizer prompt. One node per non-empty line:
/// `[id, "NAME", {args}, [[target, condition_field|null, required_value], ...]]`
pub const PLAN_WIRE_VERSION: &str = "v2";

/// Parse one plan line into a node descriptor, references still unresolved.
pub fn parse_line(
    line_no: usize,
    text: &str,
    registry: &CommandRegistry,
) -> Result<CommandNode, GraphError> {
    let blanked = reference::blank(text);
    let decoded: Value = serde_json::from_str(&blanked).map_err(|e| GraphError::Parse {
        line: line_no,
        raw: text.to_string(),
        message: e.to_string(),
    })?;

    let entry = decoded
        .as_array()
        .ok_or_else(|| schema(line_no, "node entry must be an array"))?;
    if entry.len() != 4 {
        return Err(schema(
            line_no,
            &format!("node entry must have 4 elements, got {}", entry.len()),
        ));
    }

    let id = entry[0]
        .as_i64()
        .ok_or_else(|| schema(line_no, "node id must be an integer"))?;
    let name = entry[1].as_str().ok_or_else(|| {
        if entry[1].is_array() || entry[1].is_null() {
            // Legacy backward-link entries put the predecessor tuple here.
            schema(
                line_no,
                "legacy backward-link plan shape is not supported; \
                 use the forward-adjacency format (name in second position)",
            )
        } else {
            schema(line_no, "command name must be a string")
        }
    })?;
    if !entry[2].is_object() {
        return Err(schema(line_no, "arguments must be an object"));
    }
    let successor_entries = entry[3]
        .as_array()
        .ok_or_else(|| schema(line_no, "successors must be an array"))?;

    let mut successors = Vec::with_capacity(successor_entries.len());
    for raw_edge in successor_entries {
        successors.push(parse_edge(line_no, raw_edge)?);
    }

    if !registry.contains(name) {
        return Err(GraphError::Schema(format!(
            "line {line_no}: unknown command '{name}'"
        )));
    }

    let prerequisites = reference::scan(text).iter().map(|r| r.source).collect();

    Ok(CommandNode {
        id,
        name: name.to_string(),
        line: line_no,
        raw_line: text.to_string(),
        successors,
        prerequisites,
    })
}

fn parse_edge(line_no: usize, raw: &Value) -> Result<Edge, GraphError> {
    let parts = raw
        .as_array()
        .filter(|parts| parts.len() == 3)
        .ok_or_else(|| {
            schema(
                line_no,
                "successor entry must be [target, condition_field|null, required_value]",
            )
        })?;
    let target = parts[0]
        .as_i64()
        .ok_or_else(|| schema(line_no, "successor target must be an integer"))?;
    let condition_field = match &parts[1] {
        Value::Null => None,
        Value::String(field) => Some(field.clone()),
        _ => {
            return Err(schema(
                line_no,
                "successor condition field must be a string or null",
            ))
        }
    };
    Ok(Edge {
        target,
        condition_field,
        required_value: parts[2].clone(),
    })
}

/// Parse a whole plan into a node table, validating the construction-time
/// contract: decodable lines, known command names, well-formed successor
/// entries, unique ids, edges to defined targets. Runs before any handler.
pub fn parse_plan(text: &str, registry: &CommandRegistry) -> Result<NodeTable, GraphError> {
    let mut nodes: BTreeMap<i64, CommandNode> = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let node = parse_line(index + 1, line, registry)?;
        let id = node.id;
        if nodes.insert(id, node).is_some() {
            return Err(GraphError::Schema(format!(
                "line {}: duplicate node id {id}",
                index + 1
            )));
        }
    }
    if nodes.is_empty() {
        return Err(GraphError::Schema("plan contains no nodes".to_string()));
    }
    for node in nodes.values() {
        for edge in &node.successors {
            if !nodes.contains_key(&edge.target) {
                return Err(GraphError::Schema(format!(
                    "node {} links to undefined node {}",
                    node.id, edge.target
                )));
            }
        }
    }
    Ok(NodeTable::new(nodes))
}

/// Decode the argument mapping from a fully substituted plan line. The JSON
/// decode undoes the escaping applied during substitution, so handlers see
/// literal text.
pub fn decode_arguments(
    line_no: usize,
    resolved_text: &str,
) -> Result<Map<String, Value>, GraphError> {
    let decoded: Value = serde_json::from_str(resolved_text).map_err(|e| GraphError::Parse {
        line: line_no,
        raw: resolved_text.to_string(),
        message: e.to_string(),
    })?;
    decoded
        .as_array()
        .and_then(|entry| entry.get(2))
        .and_then(|arguments| arguments.as_object())
        .cloned()
        .ok_or_else(|| schema(line_no, "resolved node entry lost its argument object"))
}

fn schema(line_no: usize, message: &str) -> GraphError {
    GraphError::Schema(format!("line {line_no}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandContext, CommandError, CommandMeta};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Named(&'static str);

    #[async_trait]
    impl Command for Named {
        fn meta(&self) -> CommandMeta {
            CommandMeta::new(self.0, "test stub")
        }

        async fn run(
            &self,
            _arguments: Map<String, Value>,
            _ctx: CommandContext,
        ) -> Result<Map<String, Value>, CommandError> {
            Ok(Map::new())
        }
    }

    fn registry(names: &[&'static str]) -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        for name in names {
            registry.register(Arc::new(Named(name)));
        }
        registry
    }

    #[test]
    fn test_parse_line_extracts_node_descriptor() {
        let registry = registry(&["THINK"]);
        let node = parse_line(
            1,
            r#"[1, "THINK", {"about": "x"}, [[2, null, null], [3, "result", 1]]]"#,
            &registry,
        )
        .unwrap();
        assert_eq!(node.id, 1);
        assert_eq!(node.name, "THINK");
        assert_eq!(node.successors.len(), 2);
        assert_eq!(node.successors[0].condition_field, None);
        assert_eq!(
            node.successors[1].condition_field.as_deref(),
            Some("result")
        );
        assert_eq!(node.successors[1].required_value, Value::from(1));
        assert!(node.prerequisites.is_empty());
    }

    #[test]
    fn test_parse_line_collects_prerequisites_from_references() {
        let registry = registry(&["ECHO"]);
        let node = parse_line(
            3,
            r#"[4, "ECHO", {"a": "__&1.x__", "b": "__&2.y__ and __&1.z__"}, []]"#,
            &registry,
        )
        .unwrap();
        assert_eq!(
            node.prerequisites.iter().copied().collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_unknown_command_is_schema_error() {
        let registry = registry(&["THINK"]);
        let err = parse_line(1, r#"[1, "NOPE", {}, []]"#, &registry).unwrap_err();
        assert!(matches!(err, GraphError::Schema(ref m) if m.contains("NOPE")));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let registry = registry(&["THINK"]);
        let plan = "[1, \"THINK\", {}, []]\n[2, \"THINK\", {, []]";
        let err = parse_plan(plan, &registry).unwrap_err();
        match err {
            GraphError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_backward_link_shape_is_rejected() {
        let registry = registry(&["THINK"]);
        let err = parse_line(1, r#"[2, [1, null, null], "THINK", {}]"#, &registry).unwrap_err();
        assert!(matches!(err, GraphError::Schema(ref m) if m.contains("backward-link")));
    }

    #[test]
    fn test_bad_successor_shape_is_schema_error() {
        let registry = registry(&["THINK"]);
        let err = parse_line(1, r#"[1, "THINK", {}, [[2, null]]]"#, &registry).unwrap_err();
        assert!(matches!(err, GraphError::Schema(_)));

        let err = parse_line(1, r#"[1, "THINK", {}, [[2, 7, null]]]"#, &registry).unwrap_err();
        assert!(matches!(err, GraphError::Schema(_)));
    }

    #[test]
    fn test_duplicate_id_is_schema_error() {
        let registry = registry(&["THINK"]);
        let plan = "[1, \"THINK\", {}, []]\n[1, \"THINK\", {}, []]";
        let err = parse_plan(plan, &registry).unwrap_err();
        assert!(matches!(err, GraphError::Schema(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn test_edge_to_undefined_target_is_schema_error() {
        let registry = registry(&["THINK"]);
        let err = parse_plan(r#"[1, "THINK", {}, [[9, null, null]]]"#, &registry).unwrap_err();
        assert!(matches!(err, GraphError::Schema(ref m) if m.contains("undefined")));
    }

    #[test]
    fn test_decode_arguments_restores_literal_text() {
        let resolved = r#"[2, "ECHO", {"content": "He said \"hi\"\nBye"}, []]"#;
        let arguments = decode_arguments(2, resolved).unwrap();
        assert_eq!(
            arguments.get("content").and_then(Value::as_str),
            Some("He said \"hi\"\nBye")
        );
    }

    #[test]
    fn test_plan_with_blank_lines_parses() {
        let registry = registry(&["THINK"]);
        let plan = "\n[1, \"THINK\", {\"about\": \"x\"}, [[2, null, null]]]\n\n[2, \"THINK\", {\"about\": \"__&1.thought__\"}, []]\n";
        let table = parse_plan(plan, &registry).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(2).unwrap().line, 4);
    }
}
