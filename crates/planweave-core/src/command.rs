//! Command contract
//!
//! Commands are black boxes to the executor. Each one declares a name, an
//! argument schema, and an output schema, and is dispatched through a
//! capability table keyed by name. The executor checks existence only;
//! schemas document the contract for handler authors and feed the planner
//! prompt, they are never enforced at runtime.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::graph::NodeTable;
use crate::NodeId;

/// Failure raised by a command implementation. Fatal to the run.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Informal field schema: a description and a loose type hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub description: String,
    #[serde(rename = "type")]
    pub type_hint: String,
}

impl FieldSpec {
    pub fn new(description: impl Into<String>, type_hint: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            type_hint: type_hint.into(),
        }
    }
}

/// Command metadata: argument and output contracts.
#[derive(Debug, Clone, Serialize)]
pub struct CommandMeta {
    pub name: String,
    pub description: String,
    /// Argument name -> informal spec.
    pub arguments: BTreeMap<String, FieldSpec>,
    /// Output field name -> informal spec.
    pub generates: BTreeMap<String, FieldSpec>,
}

impl CommandMeta {
    /// Create new command metadata
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: BTreeMap::new(),
            generates: BTreeMap::new(),
        }
    }

    /// Declare an argument.
    pub fn with_argument(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.arguments.insert(name.into(), spec);
        self
    }

    /// Declare an output field.
    pub fn with_generates(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.generates.insert(name.into(), spec);
        self
    }
}

/// Execution context handed to a command: its node id and a read-only view
/// of the node table. Collaborators a command needs beyond this (a chat
/// client, a model name) are injected when the command is constructed.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub node_id: NodeId,
    pub table: Arc<NodeTable>,
}

impl CommandContext {
    pub fn new(node_id: NodeId, table: Arc<NodeTable>) -> Self {
        Self { node_id, table }
    }
}

/// The command abstraction: an atomic, synchronous-in-effect unit of work.
///
/// Implementations may block the whole run (network calls, user prompts);
/// once invoked they run to completion. The returned mapping's keys must
/// match the declared `generates` keys.
#[async_trait]
pub trait Command: Send + Sync {
    /// The command's contract. `meta().name` must be unique in a registry.
    fn meta(&self) -> CommandMeta;

    /// Execute with fully resolved, literal arguments.
    async fn run(
        &self,
        arguments: Map<String, Value>,
        ctx: CommandContext,
    ) -> Result<Map<String, Value>, CommandError>;
}

/// Capability table mapping a command name to its implementation.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Register a command under its declared name.
    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.insert(command.meta().name.clone(), command);
    }

    /// Get a command by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Metadata of every registered command, sorted by name.
    pub fn metas(&self) -> Vec<CommandMeta> {
        let mut metas: Vec<CommandMeta> = self.commands.values().map(|c| c.meta()).collect();
        metas.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        metas
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    #[async_trait]
    impl Command for Nop {
        fn meta(&self) -> CommandMeta {
            CommandMeta::new("NOP", "Does nothing")
                .with_generates("done", FieldSpec::new("Always 1", "integer"))
        }

        async fn run(
            &self,
            _arguments: Map<String, Value>,
            _ctx: CommandContext,
        ) -> Result<Map<String, Value>, CommandError> {
            let mut out = Map::new();
            out.insert("done".to_string(), Value::from(1));
            Ok(out)
        }
    }

    #[test]
    fn test_registry_lookup_by_declared_name() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(Nop));

        assert!(registry.contains("NOP"));
        assert!(registry.get("NOP").is_some());
        assert!(registry.get("MISSING").is_none());
        assert_eq!(registry.names(), vec!["NOP".to_string()]);
        assert_eq!(registry.metas()[0].generates.len(), 1);
    }
}
