// Solace CLI - Command Line Interface Entry Point

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use solace_config::{Config, ConfigLoader, LoggingConfig, parse_override};
use solace_model_provider::{ChatTurn, CompletionClient, LiveUpdate, RequestOptions, TurnOutcome};
use solace_protocol::{ChatMessage, StreamChunk};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Solace - talk to your configured AI providers
#[derive(Parser, Debug)]
#[command(name = "solace")]
#[command(version, about, long_about = None)]
struct TopCli {
  #[clap(flatten)]
  config_overrides: CliConfigOverrides,

  /// Extra configuration file layered over the global and project files
  #[arg(long = "config", value_name = "PATH", global = true)]
  config_file: Option<PathBuf>,

  #[clap(subcommand)]
  command: Commands,
}

/// CLI configuration overrides
#[derive(Debug, clap::Args)]
struct CliConfigOverrides {
  /// Configuration override in key=value format
  #[arg(short = 'c', value_name = "KEY=VALUE", global = true)]
  overrides: Vec<String>,
}

/// Available commands
#[derive(Debug, Subcommand)]
enum Commands {
  /// Send one message and stream the reply
  Chat {
    /// Message to send
    prompt: String,

    /// Model id, bare or provider/model
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// System prompt
    #[arg(short = 's', long = "system")]
    system: Option<String>,

    /// Wait for the whole reply instead of streaming
    #[arg(long = "no-stream")]
    no_stream: bool,
  },

  /// List enabled providers and their models
  Models {
    /// Only this provider
    #[arg(short = 'p', long = "provider")]
    provider: Option<String>,

    /// Ask providers that support it for their model list first
    #[arg(long = "discover")]
    discover: bool,
  },

  /// Configuration management
  Config {
    #[command(subcommand)]
    config_command: ConfigCommands,
  },
}

/// Configuration commands
#[derive(Debug, Subcommand)]
enum ConfigCommands {
  /// Show the effective configuration with credentials masked
  Show,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = TopCli::parse();
  let config = load_config(&cli)?;
  init_logging(&config.logging);

  info!("Solace CLI starting");

  match cli.command {
    Commands::Chat {
      prompt,
      model,
      system,
      no_stream,
    } => run_chat(&config, prompt, model, system, no_stream).await,
    Commands::Models { provider, discover } => list_models(&config, provider, discover).await,
    Commands::Config { config_command } => match config_command {
      ConfigCommands::Show => show_config(&config),
    },
  }
}

fn load_config(cli: &TopCli) -> Result<Config> {
  let overrides = cli
    .config_overrides
    .overrides
    .iter()
    .map(|raw| parse_override(raw))
    .collect::<Result<Vec<_>, _>>()?;

  let mut loader = ConfigLoader::new();
  if let Ok(cwd) = std::env::current_dir() {
    loader = loader.with_project_dir(cwd);
  }
  if let Some(path) = &cli.config_file {
    loader = loader.with_file(path.clone());
  }
  loader
    .load_with_cli_overrides(overrides)
    .context("failed to load configuration")
}

fn init_logging(logging: &LoggingConfig) {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_ansi(logging.ansi)
    .with_writer(std::io::stderr)
    .init();
}

async fn run_chat(
  config: &Config,
  prompt: String,
  model: Option<String>,
  system: Option<String>,
  no_stream: bool,
) -> Result<()> {
  let client = CompletionClient::from_config(&config.ai)?;

  let mut history = Vec::new();
  if let Some(system) = system {
    history.push(ChatMessage::system(system));
  }
  history.push(ChatMessage::user(prompt));

  let mut turn = ChatTurn::new(history).with_options(RequestOptions {
    stream: !no_stream,
    ..RequestOptions::default()
  });
  if let Some(model) = model {
    turn = turn.with_model(model);
  }

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_interrupt.cancel();
    }
  });

  let mut stdout = std::io::stdout();
  let outcome = client
    .run_turn(turn, &cancel, |update| match update {
      LiveUpdate::Chunk(StreamChunk::Content { text, .. }) => {
        let _ = write!(stdout, "{text}");
        let _ = stdout.flush();
      }
      LiveUpdate::Reset {
        attempt,
        delay,
        error,
      } => {
        eprintln!(
          "\n[attempt {attempt} failed: {error}; retrying in {:.1}s]",
          delay.as_secs_f64()
        );
      }
      LiveUpdate::Chunk(_) => {}
    })
    .await?;
  println!();

  match outcome {
    TurnOutcome::Completed(turn) => {
      for call in turn.message.tool_calls() {
        println!("[tool call] {}({})", call.function.name, call.function.arguments);
      }
      if let Some(usage) = turn.usage {
        eprintln!(
          "[{}: {} prompt + {} completion tokens, {:.1}s]",
          turn.model,
          usage.prompt_tokens,
          usage.completion_tokens,
          turn.elapsed.as_secs_f64()
        );
      }
      Ok(())
    }
    TurnOutcome::Failed(failed) => {
      bail!("completion failed after {} attempt(s): {}", failed.attempts, failed.error)
    }
    TurnOutcome::Cancelled { .. } => {
      warn!("turn cancelled");
      eprintln!("[cancelled]");
      Ok(())
    }
  }
}

async fn list_models(config: &Config, only: Option<String>, discover: bool) -> Result<()> {
  let client = CompletionClient::from_config(&config.ai)?;
  let registry = client.registry();
  let default = registry.default_model().await.ok().map(|m| m.qualified_id());

  let providers = registry.list_enabled_providers().await;
  if let Some(id) = &only {
    if !providers.iter().any(|provider| &provider.id == id) {
      bail!("provider `{id}` is not configured or not enabled");
    }
  }

  for provider in providers {
    if only.as_ref().is_some_and(|id| id != &provider.id) {
      continue;
    }
    if discover && provider.capabilities.model_discovery {
      match client.discover_models(&provider.id).await {
        Ok(added) => info!(provider = %provider.id, added, "discovered models"),
        Err(err) => eprintln!("[{}: discovery failed: {err}]", provider.id),
      }
    }

    let credential = if provider.has_required_credential() {
      ""
    } else {
      " (missing credential)"
    };
    println!("{} - {}{credential}", provider.id, provider.name);
    for model in registry.list_enabled_models(&provider.id).await {
      let qualified = format!("{}/{}", provider.id, model.id);
      let marker = if default.as_deref() == Some(qualified.as_str()) {
        "*"
      } else {
        " "
      };
      println!(
        "  {marker} {:<32} {:>7} ctx  {}",
        model.id,
        model.context_length,
        model.display_name()
      );
    }
    println!();
  }
  Ok(())
}

fn show_config(config: &Config) -> Result<()> {
  let mut shown = config.clone();
  for provider in &mut shown.ai.providers {
    provider.api_key = provider.api_key.as_deref().map(mask_secret);
  }
  print!("{}", toml::to_string_pretty(&shown)?);
  Ok(())
}

fn mask_secret(secret: &str) -> String {
  let visible: String = secret.chars().take(4).collect();
  if secret.chars().count() <= 8 {
    "****".to_string()
  } else {
    format!("{visible}****")
  }
}
