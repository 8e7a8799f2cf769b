//! Essential commands
//!
//! The three commands every deployment registers. THINK and IF are thin
//! wrappers over the chat model; CALCULATE evaluates locally and consults
//! the model only to recover an expression from prose.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use planweave_core::{
    Command, CommandContext, CommandError, CommandMeta, CommandRegistry, FieldSpec,
};
use planweave_llm::{complete_with_retry, ChatClient, ChatMessage, ChatRequest, RetryPolicy};

use crate::math::{self, Number};

fn require_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str, CommandError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::new(format!("missing string argument '{key}'")))
}

/// Shared chat collaborator for the model-backed commands.
#[derive(Clone)]
struct ChatBackend {
    client: Arc<dyn ChatClient>,
    model: String,
    temperature: f32,
    policy: RetryPolicy,
}

impl ChatBackend {
    async fn ask(&self, system: &str, user: &str) -> Result<String, CommandError> {
        let request = ChatRequest::new(
            self.model.clone(),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
        .with_temperature(self.temperature);
        complete_with_retry(self.client.as_ref(), request, self.policy)
            .await
            .map_err(|e| CommandError::new(e.to_string()))
    }
}

/// THINK: reason about a topic and produce a thought.
pub struct ThinkCommand {
    backend: ChatBackend,
}

#[async_trait]
impl Command for ThinkCommand {
    fn meta(&self) -> CommandMeta {
        CommandMeta::new("THINK", "Think about a topic and produce a thought")
            .with_argument(
                "about",
                FieldSpec::new("The topic to think about", "string"),
            )
            .with_generates("thought", FieldSpec::new("The produced thought", "string"))
    }

    async fn run(
        &self,
        arguments: Map<String, Value>,
        _ctx: CommandContext,
    ) -> Result<Map<String, Value>, CommandError> {
        let about = require_str(&arguments, "about")?;
        let thought = self
            .backend
            .ask(
                "Think about the topic the user gives you and reply with a \
                 single concise thought. Reply with the thought only, no \
                 preamble.",
                about,
            )
            .await?;
        let mut out = Map::new();
        out.insert("thought".to_string(), Value::String(thought.trim().to_string()));
        Ok(out)
    }
}

/// IF: evaluate a condition to 1 (true) or 0 (false).
pub struct IfCommand {
    backend: ChatBackend,
}

#[async_trait]
impl Command for IfCommand {
    fn meta(&self) -> CommandMeta {
        CommandMeta::new("IF", "Decide whether a condition holds")
            .with_argument(
                "condition",
                FieldSpec::new("The condition to evaluate", "string"),
            )
            .with_generates(
                "result",
                FieldSpec::new("1 if the condition holds, 0 otherwise", "integer"),
            )
    }

    async fn run(
        &self,
        arguments: Map<String, Value>,
        _ctx: CommandContext,
    ) -> Result<Map<String, Value>, CommandError> {
        let condition = require_str(&arguments, "condition")?;
        let reply = self
            .backend
            .ask(
                "Decide whether the condition the user gives you is true. \
                 Reply with exactly one character: 1 if it is true, 0 if it \
                 is false. No other text.",
                condition,
            )
            .await?;
        let result = match reply.trim() {
            "1" => 1,
            "0" => 0,
            other => {
                return Err(CommandError::new(format!(
                    "condition verdict must be 0 or 1, got '{other}'"
                )))
            }
        };
        let mut out = Map::new();
        out.insert("result".to_string(), Value::from(result));
        Ok(out)
    }
}

/// CALCULATE: evaluate an arithmetic expression.
pub struct CalculateCommand {
    backend: ChatBackend,
}

#[async_trait]
impl Command for CalculateCommand {
    fn meta(&self) -> CommandMeta {
        CommandMeta::new("CALCULATE", "Evaluate an arithmetic expression")
            .with_argument(
                "expression",
                FieldSpec::new(
                    "Arithmetic over + - * / // % ** and parentheses",
                    "string",
                ),
            )
            .with_generates("result", FieldSpec::new("The numeric result", "number"))
    }

    async fn run(
        &self,
        arguments: Map<String, Value>,
        _ctx: CommandContext,
    ) -> Result<Map<String, Value>, CommandError> {
        let expression = require_str(&arguments, "expression")?;
        let value = match math::eval(expression) {
            Ok(value) => value,
            // Prose instead of an expression; ask the model to extract one.
            Err(math::MathError::Syntax(_)) => {
                let extracted = self
                    .backend
                    .ask(
                        "Rewrite the user's request as one arithmetic \
                         expression using only numbers, + - * / // % **, and \
                         parentheses. Reply with the expression only.",
                        expression,
                    )
                    .await?;
                math::eval(extracted.trim()).map_err(|e| CommandError::new(e.to_string()))?
            }
            Err(other) => return Err(CommandError::new(other.to_string())),
        };
        let mut out = Map::new();
        out.insert("result".to_string(), number_value(value));
        Ok(out)
    }
}

fn number_value(value: Number) -> Value {
    match value {
        Number::Int(v) => Value::from(v),
        Number::Float(v) => Value::from(v),
    }
}

/// Register THINK, IF, and CALCULATE against one chat backend.
pub fn register_essential_commands(
    registry: &mut CommandRegistry,
    client: Arc<dyn ChatClient>,
    model: impl Into<String>,
    temperature: f32,
    policy: RetryPolicy,
) {
    let backend = ChatBackend {
        client,
        model: model.into(),
        temperature,
        policy,
    };
    registry.register(Arc::new(ThinkCommand {
        backend: backend.clone(),
    }));
    registry.register(Arc::new(IfCommand {
        backend: backend.clone(),
    }));
    registry.register(Arc::new(CalculateCommand { backend }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use planweave_core::NodeTable;
    use planweave_llm::MockChatClient;
    use serde_json::json;
    use std::time::Duration;

    fn backend(mock: MockChatClient) -> ChatBackend {
        ChatBackend {
            client: Arc::new(mock),
            model: "test-model".to_string(),
            temperature: 0.2,
            policy: RetryPolicy::new(1, Duration::ZERO),
        }
    }

    fn ctx() -> CommandContext {
        CommandContext::new(1, Arc::new(NodeTable::default()))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().expect("object args").clone()
    }

    #[tokio::test]
    async fn test_if_parses_verdict() {
        let command = IfCommand {
            backend: backend(MockChatClient::new().reply(" 1\n")),
        };
        let out = command
            .run(args(json!({"condition": "water is wet"})), ctx())
            .await
            .unwrap();
        assert_eq!(out.get("result"), Some(&Value::from(1)));
    }

    #[tokio::test]
    async fn test_if_rejects_non_verdict_reply() {
        let command = IfCommand {
            backend: backend(MockChatClient::new().reply("probably yes")),
        };
        let err = command
            .run(args(json!({"condition": "water is wet"})), ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be 0 or 1"));
    }

    #[tokio::test]
    async fn test_calculate_evaluates_locally_without_chat() {
        // Empty script; any chat call would panic the mock.
        let command = CalculateCommand {
            backend: backend(MockChatClient::new()),
        };
        let out = command
            .run(args(json!({"expression": "2 + 3 * 4"})), ctx())
            .await
            .unwrap();
        assert_eq!(out.get("result"), Some(&Value::from(14)));
    }

    #[tokio::test]
    async fn test_calculate_falls_back_to_chat_for_prose() {
        let command = CalculateCommand {
            backend: backend(MockChatClient::new().reply("6 * 7")),
        };
        let out = command
            .run(args(json!({"expression": "six times seven"})), ctx())
            .await
            .unwrap();
        assert_eq!(out.get("result"), Some(&Value::from(42)));
    }

    #[tokio::test]
    async fn test_calculate_division_by_zero_is_not_retried_via_chat() {
        let command = CalculateCommand {
            backend: backend(MockChatClient::new()),
        };
        let err = command
            .run(args(json!({"expression": "1 / 0"})), ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[tokio::test]
    async fn test_think_returns_trimmed_thought() {
        let command = ThinkCommand {
            backend: backend(MockChatClient::new().reply("  a thought \n")),
        };
        let out = command
            .run(args(json!({"about": "testing"})), ctx())
            .await
            .unwrap();
        assert_eq!(out.get("thought"), Some(&Value::from("a thought")));
    }

    #[test]
    fn test_register_essential_commands_registers_all_three() {
        let mut registry = CommandRegistry::new();
        register_essential_commands(
            &mut registry,
            Arc::new(MockChatClient::new()),
            "test-model",
            0.2,
            RetryPolicy::default(),
        );
        assert_eq!(registry.names(), vec!["CALCULATE", "IF", "THINK"]);
    }
}
