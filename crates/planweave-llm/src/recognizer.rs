//! Instruction recognition
//!
//! Turns a natural-language instruction into plan text: a system prompt is
//! assembled from the command catalog, the model replies with one node per
//! line, and the reply is normalized so the structural parser can consume
//! it. The same collaborator can also render an existing plan back into
//! natural language.

use planweave_core::CommandMeta;
use tracing::debug;

use crate::client::{ChatClient, ChatError, ChatMessage, ChatRequest};
use crate::retry::{complete_with_retry, RetryPolicy};

/// Model settings for the recognizer.
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.2,
        }
    }
}

/// Produces plan text from instructions using a chat model.
pub struct Recognizer<C: ChatClient> {
    client: C,
    config: RecognizerConfig,
    policy: RetryPolicy,
}

impl<C: ChatClient> Recognizer<C> {
    pub fn new(client: C, config: RecognizerConfig) -> Self {
        Self {
            client,
            config,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Recognize an instruction into normalized plan text.
    pub async fn recognize(
        &self,
        instruction: &str,
        commands: &[CommandMeta],
    ) -> Result<String, ChatError> {
        let request = ChatRequest::new(
            self.config.model.clone(),
            vec![
                ChatMessage::system(build_system_prompt(commands)),
                ChatMessage::user(instruction),
            ],
        )
        .with_temperature(self.config.temperature);
        let reply = complete_with_retry(&self.client, request, self.policy).await?;
        let plan = normalize_plan_text(&reply);
        debug!(lines = plan.lines().count(), "instruction recognized");
        Ok(plan)
    }

    /// Render plan text back into a short natural-language description.
    pub async fn explain(
        &self,
        plan_text: &str,
        commands: &[CommandMeta],
    ) -> Result<String, ChatError> {
        let request = ChatRequest::new(
            self.config.model.clone(),
            vec![
                ChatMessage::system(build_explain_prompt(commands)),
                ChatMessage::user(plan_text.to_string()),
            ],
        )
        .with_temperature(self.config.temperature);
        complete_with_retry(&self.client, request, self.policy).await
    }
}

fn render_catalog(commands: &[CommandMeta]) -> String {
    let mut catalog = String::new();
    for meta in commands {
        catalog.push_str(&format!("- {}: {}\n", meta.name, meta.description));
        for (name, spec) in &meta.arguments {
            catalog.push_str(&format!(
                "    argument \"{}\" ({}): {}\n",
                name, spec.type_hint, spec.description
            ));
        }
        for (name, spec) in &meta.generates {
            catalog.push_str(&format!(
                "    produces \"{}\" ({}): {}\n",
                name, spec.type_hint, spec.description
            ));
        }
    }
    catalog
}

/// Build the recognition prompt: catalog, wire format rules, referencing
/// rules, and worked examples.
pub fn build_system_prompt(commands: &[CommandMeta]) -> String {
    let catalog = render_catalog(commands);
    format!(
        r#"You translate a user's instruction into a command plan.

Available commands:
{catalog}
Output format, one node per line, nothing else:
[id, "COMMAND_NAME", {{argument mapping}}, [successor links]]

- id is a unique positive integer; execution starts at the smallest id.
- Each successor link is [target_id, condition_field, required_value].
  Use [target_id, null, null] for an unconditional link. A conditional
  link runs its target only when the named output field of this node
  equals the required value.
- An argument value may embed the output of an earlier node as
  __&id.field__. One index or key lookup is allowed: __&1.items[0]__ or
  __&1.counts["key"]__. Nothing else; no slices, no nested lookups.
- Only use commands from the list above. Do not invent commands.
- Reply with the plan lines only. No prose, no code fences.

Example. Instruction: "Calculate 2+2 and think about the result"
[1, "CALCULATE", {{"expression": "2+2"}}, [[2, null, null]]]
[2, "THINK", {{"about": "the number __&1.result__"}}, []]

Example. Instruction: "If 17 is greater than 5, think about cats, otherwise think about dogs"
[1, "IF", {{"condition": "17 > 5"}}, [[2, "result", 1], [3, "result", 0]]]
[2, "THINK", {{"about": "cats"}}, []]
[3, "THINK", {{"about": "dogs"}}, []]

Example. Instruction: "Compute 12 % 5 and if the result equals 2, think about remainders"
[1, "CALCULATE", {{"expression": "12 % 5"}}, [[2, null, null]]]
[2, "IF", {{"condition": "__&1.result__ == 2"}}, [[3, "result", 1]]]
[3, "THINK", {{"about": "remainders"}}, []]"#
    )
}

fn build_explain_prompt(commands: &[CommandMeta]) -> String {
    let catalog = render_catalog(commands);
    format!(
        r#"You describe a command plan in plain language.

The commands that may appear:
{catalog}
The user sends a plan, one node per line:
[id, "COMMAND_NAME", {{argument mapping}}, [successor links]]
A successor link [target_id, field, value] runs the target only when the
node's output field equals the value; [target_id, null, null] always runs.
__&id.field__ inside an argument stands for the output of an earlier node.

Describe what the plan will do, step by step, in a few short sentences."#
    )
}

/// Normalize a model reply into plan text: strip code fences and blank
/// lines, and split a single top-level JSON array of nodes into one node
/// per line.
pub fn normalize_plan_text(reply: &str) -> String {
    let stripped: Vec<&str> = reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .collect();
    let joined = stripped.join("\n");

    if let Some(nodes) = split_node_array(&joined) {
        return nodes.join("\n");
    }
    joined
}

/// If `text` is exactly one balanced JSON array whose top-level elements
/// are themselves arrays, return those elements verbatim. Tracks strings
/// and escapes so brackets inside argument text do not confuse the split.
fn split_node_array(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('[')?.strip_suffix(']')?;

    let mut nodes = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for c in body.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                current.push(c);
            }
            ',' if depth == 0 => {
                nodes.push(std::mem::take(&mut current));
                continue;
            }
            other => current.push(other),
        }
    }
    if in_string || depth != 0 {
        return None;
    }
    nodes.push(current);

    let nodes: Vec<String> = nodes
        .into_iter()
        .map(|node| node.trim().to_string())
        .collect();
    if nodes.iter().all(|node| node.starts_with('[')) {
        Some(nodes)
    } else {
        None
    }
}
