//! Error taxonomy for the graph engine.

use thiserror::Error;

use crate::NodeId;

/// Errors raised while building or executing a command graph.
///
/// Parse and Schema errors occur at construction time and prevent any
/// execution. Lookup and Handler errors occur per node and abort the whole
/// run; a failing branch is not contained.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Plan text (or a node's resolved text) did not decode as JSON.
    #[error("line {line}: plan text is not decodable: {message} (raw: {raw})")]
    Parse {
        line: usize,
        raw: String,
        message: String,
    },

    /// The decoded structure violates the wire contract: unknown command
    /// name, malformed successor entry, duplicate id, undefined edge target.
    #[error("schema error: {0}")]
    Schema(String),

    /// A reference could not be resolved against a produced output.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// A command implementation failed. Not caught; terminates the run.
    #[error("command '{name}' (node {id}) failed: {message}")]
    Handler {
        id: NodeId,
        name: String,
        message: String,
    },
}
