//! Command graph
//!
//! The node table built from plan text, the run-scoped executor state, and
//! the executor itself: a breadth-first, condition-aware traversal that
//! resolves each node's references against previously produced outputs,
//! invokes its handler at most once, and prunes subtrees behind
//! unsatisfied conditions simply by never admitting them to the frontier.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::command::{CommandContext, CommandRegistry};
use crate::error::GraphError;
use crate::parser;
use crate::reference;
use crate::NodeId;

/// A successor link, optionally gated on one output field of its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub target: NodeId,
    /// Output field gating this edge; `None` means unconditional.
    pub condition_field: Option<String>,
    /// Value the gating field must equal for the edge to be followed.
    pub required_value: Value,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn unconditional(target: NodeId) -> Self {
        Self {
            target,
            condition_field: None,
            required_value: Value::Null,
        }
    }

    /// Create a conditional edge.
    pub fn conditional(target: NodeId, field: impl Into<String>, required_value: Value) -> Self {
        Self {
            target,
            condition_field: Some(field.into()),
            required_value,
        }
    }

    /// Whether this edge is satisfied by the given source output.
    pub fn is_eligible(&self, output: &Map<String, Value>) -> bool {
        match &self.condition_field {
            None => true,
            Some(field) => output.get(field) == Some(&self.required_value),
        }
    }
}

/// One parsed command with its successor links and prerequisite set.
#[derive(Debug, Clone)]
pub struct CommandNode {
    pub id: NodeId,
    /// Registered command name.
    pub name: String,
    /// 1-based line this node came from, for error identity.
    pub line: usize,
    /// Verbatim plan line, references intact, kept so the node can be
    /// re-resolved and re-decoded right before execution.
    pub raw_line: String,
    pub successors: Vec<Edge>,
    /// Ids whose outputs this node's arguments reference.
    pub prerequisites: BTreeSet<NodeId>,
}

/// Immutable table of parsed nodes, ordered by id. Built once per run and
/// discarded when the run ends.
#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    nodes: BTreeMap<NodeId, CommandNode>,
}

impl NodeTable {
    pub(crate) fn new(nodes: BTreeMap<NodeId, CommandNode>) -> Self {
        Self { nodes }
    }

    pub fn get(&self, id: NodeId) -> Option<&CommandNode> {
        self.nodes.get(&id)
    }

    /// Smallest node id; execution always begins here.
    pub fn first_id(&self) -> Option<NodeId> {
        self.nodes.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandNode> {
        self.nodes.values()
    }

    /// Human-readable rendering of the graph, shown at verbosity >= 1.
    pub fn describe(&self) -> String {
        let mut out = String::from("--- Command graph ---\n");
        for node in self.nodes.values() {
            let _ = writeln!(out, "{}. {}", node.id, node.name);
            if !node.prerequisites.is_empty() {
                let needs: Vec<String> =
                    node.prerequisites.iter().map(NodeId::to_string).collect();
                let _ = writeln!(out, "   needs output of: {}", needs.join(", "));
            }
            for edge in &node.successors {
                match &edge.condition_field {
                    None => {
                        let _ = writeln!(out, "   -> runs node {}", edge.target);
                    }
                    Some(field) => {
                        let _ = writeln!(
                            out,
                            "   -> runs node {} when '{}' == {}",
                            edge.target, field, edge.required_value
                        );
                    }
                }
            }
        }
        out.push_str("--- ------------- ---");
        out
    }
}

/// Results and frontier of one run.
///
/// Owned exclusively by the executor and threaded through calls; results
/// are append-only with exactly one entry per node ever executed.
#[derive(Debug, Default)]
pub struct ExecutorState {
    results: BTreeMap<NodeId, Map<String, Value>>,
    frontier: BTreeSet<NodeId>,
}

impl ExecutorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output of a node, if it has executed.
    pub fn output(&self, id: NodeId) -> Option<&Map<String, Value>> {
        self.results.get(&id)
    }

    /// All outputs produced so far, in id order.
    pub fn results(&self) -> &BTreeMap<NodeId, Map<String, Value>> {
        &self.results
    }

    /// Number of nodes executed so far.
    pub fn executed(&self) -> usize {
        self.results.len()
    }

    /// Ids eligible to run in the current traversal step.
    pub fn frontier(&self) -> &BTreeSet<NodeId> {
        &self.frontier
    }
}

/// Drives a parsed plan to completion: strictly sequential, one handler in
/// flight, no timeout, no cancellation.
pub struct Executor {
    registry: Arc<CommandRegistry>,
    /// Log a warning when a handler's returned keys differ from its
    /// declared `generates` keys. Never fails the run.
    warn_on_undeclared_outputs: bool,
}

impl Executor {
    /// Create a new executor over a command table.
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            warn_on_undeclared_outputs: true,
        }
    }

    /// Configure the output-key contract warning.
    pub fn with_output_contract(mut self, warn_on_undeclared_outputs: bool) -> Self {
        self.warn_on_undeclared_outputs = warn_on_undeclared_outputs;
        self
    }

    /// Parse plan text into a node table and per-node prerequisite sets.
    /// Any construction-time violation fails here, before any handler runs.
    pub fn build(&self, plan_text: &str) -> Result<NodeTable, GraphError> {
        parser::parse_plan(plan_text, &self.registry)
    }

    /// Execute one node and return the ids of its eligible successors.
    ///
    /// A node that already has a result is not re-run: its successors are
    /// recomputed from the cached output, so a node reached through two
    /// different edges still fans out correctly.
    pub async fn execute(
        &self,
        table: &Arc<NodeTable>,
        id: NodeId,
        state: &mut ExecutorState,
    ) -> Result<Vec<NodeId>, GraphError> {
        let node = table.get(id).ok_or_else(|| {
            GraphError::Schema(format!("frontier references undefined node {id}"))
        })?;

        if let Some(output) = state.results.get(&id) {
            return Ok(eligible_targets(node, output));
        }

        let mut resolved = node.raw_line.clone();
        for source in &node.prerequisites {
            let output = state.results.get(source).ok_or_else(|| {
                GraphError::Lookup(format!(
                    "node {} references output of node {source}, which has not produced a result",
                    node.id
                ))
            })?;
            resolved = reference::substitute(&resolved, *source, output)?;
        }
        let arguments = parser::decode_arguments(node.line, &resolved)?;

        let command = self
            .registry
            .get(&node.name)
            .ok_or_else(|| GraphError::Schema(format!("unknown command '{}'", node.name)))?;

        info!(node_id = node.id, command = %node.name, "node execution started");
        let rendered_arguments = Value::Object(arguments.clone());
        debug!(
            node_id = node.id,
            arguments = %rendered_arguments,
            "resolved arguments"
        );

        let ctx = CommandContext::new(node.id, Arc::clone(table));
        let output = command
            .run(arguments, ctx)
            .await
            .map_err(|e| GraphError::Handler {
                id: node.id,
                name: node.name.clone(),
                message: e.to_string(),
            })?;

        if self.warn_on_undeclared_outputs {
            let declared = command.meta().generates;
            for key in output.keys() {
                if !declared.contains_key(key) {
                    warn!(
                        node_id = node.id,
                        command = %node.name,
                        key = %key,
                        "handler returned a field it does not declare"
                    );
                }
            }
            for key in declared.keys() {
                if !output.contains_key(key) {
                    warn!(
                        node_id = node.id,
                        command = %node.name,
                        key = %key,
                        "handler omitted a declared output field"
                    );
                }
            }
        }

        info!(node_id = node.id, command = %node.name, "node execution completed");

        let targets = eligible_targets(node, &output);
        state.results.insert(id, output);
        Ok(targets)
    }

    /// Build the table, seed the frontier with the smallest id, and run a
    /// breadth-first, level-by-level traversal until a frontier is empty.
    ///
    /// Every node reachable from the first node through satisfied edges is
    /// executed exactly once; a node behind an unsatisfied condition on its
    /// only path never enters the frontier, which prunes its whole subtree.
    /// Already-executed targets are not re-admitted, so a self-edge has no
    /// effect beyond the first run and cyclic links terminate.
    pub async fn run(&self, plan_text: &str) -> Result<ExecutorState, GraphError> {
        let table = Arc::new(self.build(plan_text)?);
        let mut state = ExecutorState::new();
        let Some(first) = table.first_id() else {
            return Ok(state);
        };
        state.frontier.insert(first);

        while !state.frontier.is_empty() {
            let level: Vec<NodeId> = state.frontier.iter().copied().collect();
            state.frontier.clear();
            let mut next = BTreeSet::new();
            for id in level {
                for target in self.execute(&table, id, &mut state).await? {
                    if !state.results.contains_key(&target) {
                        next.insert(target);
                    }
                }
            }
            state.frontier = next;
        }

        info!(executed = state.executed(), "run completed");
        Ok(state)
    }
}

fn eligible_targets(node: &CommandNode, output: &Map<String, Value>) -> Vec<NodeId> {
    node.successors
        .iter()
        .filter(|edge| edge.is_eligible(output))
        .map(|edge| edge.target)
        .collect()
}
