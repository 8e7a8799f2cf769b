//! # Planweave Core
//!
//! The command graph engine. A plan — produced by a language model, opaque
//! text to this crate — is parsed into a table of command nodes, embedded
//! references to earlier nodes' outputs are resolved lazily, and a
//! breadth-first, condition-aware traversal drives every reachable node to
//! execution exactly once.
//!
//! This crate contains:
//! - the placeholder grammar (`reference`)
//! - the structural parser (`parser`)
//! - the command contract and registry (`command`)
//! - the node table, executor state, and executor (`graph`)
//!
//! This crate does NOT care about:
//! - how plan text is produced (see `planweave-llm`)
//! - what any command actually does (commands are registered capabilities)
//! - how results are displayed

pub mod command;
pub mod error;
pub mod graph;
pub mod parser;
pub mod reference;

/// Node identifier, unique within a plan.
pub type NodeId = i64;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::command::{
        Command, CommandContext, CommandError, CommandMeta, CommandRegistry, FieldSpec,
    };
    pub use crate::error::GraphError;
    pub use crate::graph::{CommandNode, Edge, Executor, ExecutorState, NodeTable};
    pub use crate::parser::PLAN_WIRE_VERSION;
    pub use crate::reference::{Accessor, DataReference};
    pub use crate::NodeId;
}

// Re-export key types at crate root
pub use command::{Command, CommandContext, CommandError, CommandMeta, CommandRegistry, FieldSpec};
pub use error::GraphError;
pub use graph::{CommandNode, Edge, Executor, ExecutorState, NodeTable};
pub use parser::PLAN_WIRE_VERSION;
