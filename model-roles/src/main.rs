use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use model_roles::config::resolve_config_path;
use model_roles::redact::display_value;
use model_roles::runtime_env::{load_env_file, relevant_env_vars};
use model_roles::{
    load_static_config, resolve, ChatClient, ClientCache, OpenAiCompatibleFactory, Role,
    StaticConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "model-roles", version, about = "Inspect and exercise role-based LLM settings")]
struct Cli {
    /// Static config file (defaults to conf.toml in the current dir or an ancestor)
    #[arg(long, global = true, env = "MODEL_ROLES_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve each role and print its settings with the key masked
    Check {
        /// Only check this role
        #[arg(long)]
        role: Option<String>,
    },
    /// List the environment variables that affect resolution
    Env,
    /// Send one chat completion through a role's client
    Ping {
        #[arg(long, default_value = "basic")]
        role: String,
        #[arg(long, default_value = "Hello! Please respond with 'Test successful'.")]
        prompt: String,
    },
    /// List the model ids a role's credential can see
    Models {
        #[arg(long, default_value = "basic")]
        role: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "model_roles=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // .env must be applied before clap reads env-backed flags.
    load_env_file();
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(resolve_config_path);

    let result = match cli.command {
        Command::Check { role } => check(&config_path, role.as_deref()),
        Command::Env => {
            print_env();
            Ok(true)
        }
        Command::Ping { role, prompt } => ping(config_path, &role, &prompt).await,
        Command::Models { role } => list_models(config_path, &role).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn check(config_path: &std::path::Path, role: Option<&str>) -> anyhow::Result<bool> {
    let roles = match role {
        Some(name) => vec![name.parse::<Role>()?],
        None => Role::ALL.to_vec(),
    };

    let static_config: StaticConfig = load_static_config(config_path)?;
    println!("static config: {}", config_path.display());
    if static_config.is_empty() {
        println!("  (no sections found)");
    }

    let mut all_ok = true;
    for role in roles {
        match resolve(role, &static_config) {
            Ok(resolved) => {
                println!("[{role}] ok");
                println!("  model:    {}", resolved.model);
                println!(
                    "  base_url: {}",
                    resolved
                        .base_url
                        .as_deref()
                        .unwrap_or(model_roles::DEFAULT_OPENAI_BASE_URL)
                );
                println!("  api_key:  {}", resolved.masked_api_key());
                if !resolved.default_headers.is_empty() {
                    let names: Vec<&str> =
                        resolved.default_headers.keys().map(String::as_str).collect();
                    println!("  headers:  {}", names.join(", "));
                }
                for (key, value) in &resolved.extra {
                    println!("  {key}: {}", display_value(key, value));
                }
            }
            Err(err) => {
                all_ok = false;
                println!("[{role}] FAILED: {err}");
            }
        }
    }
    Ok(all_ok)
}

fn print_env() {
    let vars = relevant_env_vars();
    if vars.is_empty() {
        println!("no model role environment variables are set");
        return;
    }
    for (name, value) in vars {
        println!("{name}={}", display_value(&name, &value));
    }
}

fn build_client(config_path: PathBuf, role: &str) -> anyhow::Result<Arc<ChatClient>> {
    let cache = ClientCache::new(OpenAiCompatibleFactory, config_path);
    cache
        .get_client_by_name(role, false)
        .with_context(|| format!("failed to build client for role '{role}'"))
}

async fn ping(config_path: PathBuf, role: &str, prompt: &str) -> anyhow::Result<bool> {
    let client = build_client(config_path, role)?;

    println!("[{}] {} via {}", client.role(), client.model(), client.base_url());
    let reply = client
        .complete(prompt)
        .await
        .context("chat completion failed")?;
    println!("{reply}");
    Ok(true)
}

async fn list_models(config_path: PathBuf, role: &str) -> anyhow::Result<bool> {
    let client = build_client(config_path, role)?;
    let models = client
        .list_models()
        .await
        .context("listing models failed")?;
    for id in &models {
        println!("{id}");
    }
    tracing::info!(count = models.len(), base_url = %client.base_url(), "Listed models");
    Ok(true)
}
