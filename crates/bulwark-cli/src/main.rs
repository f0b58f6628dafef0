//! Bulwark CLI - put one agent action through the firewall
//!
//! Usage:
//!   bulwark intent <action> [--params <json>]   - Validate and run an intent
//!   bulwark tool <name> [--args <json>]         - Same, addressed by tool name
//!   bulwark check-url <url>                     - Run the network policy only
//!   bulwark check-name <name>                   - Check a project identifier
//!   bulwark tools                               - Print tool schemas
//!
//! Results go to stdout as JSON, logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use bulwark_core::{tool_schemas, Firewall, FirewallConfig, ToolExecutor, ValidationResult};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bulwark")]
#[command(author = "HeyBattle1")]
#[command(version)]
#[command(about = "Deterministic action firewall for LLM agents", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root, overriding the configuration file
    #[arg(long, global = true, env = "BULWARK_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and perform one intent
    Intent {
        /// Action name, e.g. write_file
        action: String,

        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Run a tool call the way an LLM would issue it
    Tool {
        /// Tool name, e.g. run_command
        name: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Check a URL against the network policy without fetching it
    CheckUrl { url: String },

    /// Check a proposed project name
    CheckName { name: String },

    /// Print the OpenAI-compatible tool schemas
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Commands::Tools = cli.command {
        print_json(&Value::Array(tool_schemas()))?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    let firewall = Firewall::new(config).context("Failed to start firewall")?;
    debug!(firewall = ?firewall, "firewall constructed");

    let outcome = match cli.command {
        Commands::Intent { action, params } => {
            let params = parse_object(&params, "--params")?;
            let result = firewall.validate(&action, &params).await;
            print_json(&result.to_json())?;
            exit_code(&result)
        }

        Commands::Tool { name, args } => {
            let args = parse_object(&args, "--args")?;
            let output = ToolExecutor::new(&firewall).execute_tool_call(&name, &args).await;
            println!("{output}");
            match serde_json::from_str::<Value>(&output) {
                Ok(v) if v["status"] == "success" => ExitCode::SUCCESS,
                Ok(v) if v["status"] == "blocked" => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }

        Commands::CheckUrl { url } => {
            let network = firewall.network();
            match network.validate_url(&url, network.allowed_domains()).await {
                Ok(validated) => {
                    let addrs: Vec<String> = validated.addrs.iter().map(ToString::to_string).collect();
                    print_json(&json!({
                        "status": "success",
                        "url": validated.url.as_str(),
                        "host": validated.host,
                        "addrs": addrs,
                    }))?;
                    ExitCode::SUCCESS
                }
                Err(v) => {
                    print_json(&violation_json(&v))?;
                    ExitCode::from(2)
                }
            }
        }

        Commands::CheckName { name } => match firewall.validate_project_name(&name) {
            Ok(valid) => {
                print_json(&json!({"status": "success", "name": valid}))?;
                ExitCode::SUCCESS
            }
            Err(v) => {
                print_json(&violation_json(&v))?;
                ExitCode::from(2)
            }
        },

        Commands::Tools => ExitCode::SUCCESS,
    };

    Ok(outcome)
}

/// Logs go to stderr; `RUST_LOG` overrides the default `info` level
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Defaults, then the config file, then `--workspace` / `BULWARK_WORKSPACE`
fn load_config(cli: &Cli) -> anyhow::Result<FirewallConfig> {
    let mut config = match &cli.config {
        Some(path) => FirewallConfig::load(path)?,
        None => FirewallConfig::default(),
    };
    if let Some(workspace) = &cli.workspace {
        config.workspace_root = workspace.clone();
    }
    Ok(config)
}

fn parse_object(raw: &str, flag: &str) -> anyhow::Result<Value> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("{flag} is not valid JSON"))?;
    anyhow::ensure!(value.is_object(), "{flag} must be a JSON object");
    Ok(value)
}

fn violation_json(v: &bulwark_primitives::SecurityViolation) -> Value {
    json!({
        "status": "blocked",
        "guard": v.guard,
        "reason": v.message,
        "violator": v.value,
    })
}

fn exit_code(result: &ValidationResult) -> ExitCode {
    match result {
        ValidationResult::Success(_) => ExitCode::SUCCESS,
        ValidationResult::Blocked(_) => ExitCode::from(2),
        ValidationResult::Error(_) => ExitCode::FAILURE,
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
