//! Argument parsing and subcommand dispatch.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;

use planweave_commands::register_essential_commands;
use planweave_config::{load_config, model_is_known, Config};
use planweave_core::{CommandRegistry, Executor, ExecutorState};
use planweave_llm::{
    ChatClient, OpenAiClient, OpenAiClientConfig, Recognizer, RecognizerConfig, RetryPolicy,
};

#[derive(Parser)]
#[command(name = "planweave", version, about = "Command graph engine")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize an instruction into a plan and execute it
    Run {
        /// Path to a YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured chat model
        #[arg(short, long)]
        model: Option<String>,

        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,

        /// Recognize and show the plan without executing it
        #[arg(long)]
        dry_run: bool,

        /// The instruction; read from stdin when omitted
        instruction: Vec<String>,
    },

    /// Execute plan text from a file
    Exec {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        verbose: bool,

        /// Path to a plan text file, one node per line
        plan: PathBuf,
    },

    /// Describe plan text from a file in natural language
    Explain {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        verbose: bool,

        /// Path to a plan text file, one node per line
        plan: PathBuf,
    },
}

fn ensure_log_filter(verbose: bool) {
    if std::env::var("RUST_LOG").is_err() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }
}

fn init_tracing(verbose: bool) {
    ensure_log_filter(verbose);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn resolve_config(path: Option<&PathBuf>, model: Option<&String>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(model) = model {
        config.chat_model = model.clone();
        config.validate()?;
    }
    if !model_is_known(&config.chat_model) {
        warn!(model = %config.chat_model, "chat model is not on the known-good list");
    }
    Ok(config)
}

struct Engine {
    config: Config,
    client: Arc<dyn ChatClient>,
    registry: Arc<CommandRegistry>,
    policy: RetryPolicy,
}

impl Engine {
    fn new(config: Config) -> anyhow::Result<Self> {
        let client = OpenAiClient::new(OpenAiClientConfig {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key(),
            ..OpenAiClientConfig::default()
        })
        .context("building chat client")?;
        let client: Arc<dyn ChatClient> = Arc::new(client);

        let policy = RetryPolicy::new(
            config.retry.max_attempts,
            std::time::Duration::from_secs(config.retry.delay_secs),
        );

        let mut registry = CommandRegistry::new();
        register_essential_commands(
            &mut registry,
            Arc::clone(&client),
            config.chat_model.clone(),
            config.temperature,
            policy,
        );

        Ok(Self {
            config,
            client,
            registry: Arc::new(registry),
            policy,
        })
    }

    fn recognizer(&self) -> Recognizer<Arc<dyn ChatClient>> {
        Recognizer::new(
            Arc::clone(&self.client),
            RecognizerConfig {
                model: self.config.chat_model.clone(),
                temperature: self.config.temperature,
            },
        )
        .with_retry_policy(self.policy)
    }

    async fn execute(&self, plan_text: &str) -> anyhow::Result<ExecutorState> {
        let executor = Executor::new(Arc::clone(&self.registry));
        if self.config.verbosity >= 1 {
            let table = executor.build(plan_text)?;
            println!("{}", table.describe());
        }
        let state = executor.run(plan_text).await?;
        if self.config.verbosity >= 1 {
            for (id, output) in state.results() {
                println!("node {id}: {}", serde_json::Value::Object(output.clone()));
            }
        }
        Ok(state)
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Run {
                config,
                model,
                verbose,
                dry_run,
                instruction,
            } => {
                init_tracing(verbose);
                let config = resolve_config(config.as_ref(), model.as_ref())?;
                let engine = Engine::new(config)?;

                let instruction = if instruction.is_empty() {
                    let mut text = String::new();
                    std::io::stdin()
                        .read_to_string(&mut text)
                        .context("reading instruction from stdin")?;
                    text.trim().to_string()
                } else {
                    instruction.join(" ")
                };
                anyhow::ensure!(!instruction.is_empty(), "no instruction given");

                let plan_text = engine
                    .recognizer()
                    .recognize(&instruction, &engine.registry.metas())
                    .await?;
                if engine.config.verbosity >= 2 {
                    println!("{plan_text}");
                }

                if dry_run {
                    let table = Executor::new(Arc::clone(&engine.registry)).build(&plan_text)?;
                    println!("{}", table.describe());
                    return Ok(());
                }
                engine.execute(&plan_text).await?;
                Ok(())
            }

            Commands::Exec {
                config,
                verbose,
                plan,
            } => {
                init_tracing(verbose);
                let config = resolve_config(config.as_ref(), None)?;
                let engine = Engine::new(config)?;
                let plan_text = std::fs::read_to_string(&plan)
                    .with_context(|| format!("reading plan from {}", plan.display()))?;
                engine.execute(&plan_text).await?;
                Ok(())
            }

            Commands::Explain {
                config,
                verbose,
                plan,
            } => {
                init_tracing(verbose);
                let config = resolve_config(config.as_ref(), None)?;
                let engine = Engine::new(config)?;
                let plan_text = std::fs::read_to_string(&plan)
                    .with_context(|| format!("reading plan from {}", plan.display()))?;
                let description = engine
                    .recognizer()
                    .explain(&plan_text, &engine.registry.metas())
                    .await?;
                println!("{description}");
                Ok(())
            }
        }
    }
}
