//! did-agent CLI: the `didagent` command.
//!
//! Creates, lists, resolves, and deactivates identifiers held in a local
//! agent home. `did:web` documents are published under `<home>/web`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use did_agent::config::AgentConfig;
use did_agent::methods::DirectoryHost;
use did_agent::time::micros_to_rfc3339;
use did_agent::{build_agent, Agent, Environment, SecretBox};

const SECRET_ENV: &str = "DID_AGENT_SECRET_KEY";
const HOME_ENV: &str = "DID_AGENT_HOME";

// ── Directory helpers ─────────────────────────────────────────────────────────

fn default_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow!("HOME not set, pass --home"))?;
    Ok(PathBuf::from(home).join(".did-agent"))
}

fn load_config(home: &Path, path: Option<&Path>) -> Result<AgentConfig> {
    let mut config = match path {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig {
            storage_dir: PathBuf::from("store"),
            ..Default::default()
        },
    };
    if config.storage_dir.is_relative() {
        config.storage_dir = home.join(&config.storage_dir);
    }
    if let Ok(secret) = std::env::var(SECRET_ENV) {
        config.kms_secret_key = secret;
    }
    if config.kms_secret_key.is_empty() {
        return Err(anyhow!(
            "no vault secret: set {SECRET_ENV} (see `didagent generate-secret`)"
        ));
    }
    Ok(config)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── CLI structure ─────────────────────────────────────────────────────────────

/// did-agent CLI: manage decentralized identifiers and their keys.
#[derive(Parser, Debug)]
#[command(
    name = "didagent",
    about = "did-agent CLI",
    version,
    long_about = "didagent: the did-agent CLI\n\nCreate, list, resolve, and deactivate DIDs whose keys are sealed\nin a local vault."
)]
struct Cli {
    /// Agent home directory (default: $DID_AGENT_HOME or ~/.did-agent)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a fresh vault secret
    GenerateSecret,

    /// Create an identifier and print it
    Create {
        #[arg(long)]
        alias: Option<String>,

        /// Provider name, e.g. did:web or did:ethr:<network>
        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        kms: Option<String>,
    },

    /// List managed identifiers
    List {
        #[arg(long)]
        provider: Option<String>,

        /// Include revoked identifiers
        #[arg(long)]
        all: bool,
    },

    /// Resolve a DID to its document
    Resolve { did: String },

    /// Sign data with a key, or with the controller key of a DID
    Sign {
        data: String,

        #[arg(long, conflicts_with = "did", required_unless_present = "did")]
        kid: Option<String>,

        #[arg(long)]
        did: Option<String>,

        /// Data is hex-encoded
        #[arg(long)]
        hex: bool,
    },

    /// Deactivate an identifier
    Delete { did: String },

    /// List managed keys
    Keys,
}

// ── Main entry point ──────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::GenerateSecret = cli.command {
        println!("{}", SecretBox::generate_hex());
        return Ok(());
    }

    let home = match cli.home {
        Some(home) => home,
        None => default_home()?,
    };
    let config = load_config(&home, cli.config.as_deref())?;
    log::debug!("agent home {}", home.display());
    let host = DirectoryHost::new(home.join("web"));
    let agent = build_agent(&config, Environment::files(std::sync::Arc::new(host)))
        .context("failed to start agent")?;

    match cli.command {
        Commands::GenerateSecret => Ok(()),
        Commands::Create {
            alias,
            provider,
            kms,
        } => cmd_create(&agent, alias, provider, kms).await,
        Commands::List { provider, all } => cmd_list(&agent, provider, all).await,
        Commands::Resolve { did } => cmd_resolve(&agent, &did).await,
        Commands::Sign {
            data,
            kid,
            did,
            hex,
        } => cmd_sign(&agent, &data, kid, did, hex).await,
        Commands::Delete { did } => cmd_delete(&agent, &did).await,
        Commands::Keys => cmd_keys(&agent).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

/// `didagent create [--alias A] [--provider P] [--kms K]`
async fn cmd_create(
    agent: &Agent,
    alias: Option<String>,
    provider: Option<String>,
    kms: Option<String>,
) -> Result<()> {
    let identifier = agent
        .execute(
            "createIdentifier",
            json!({ "alias": alias, "provider": provider, "kms": kms }),
        )
        .await?;
    print_json(&identifier)
}

/// `didagent list [--provider P] [--all]`
async fn cmd_list(agent: &Agent, provider: Option<String>, all: bool) -> Result<()> {
    let state = if all { Value::Null } else { json!("active") };
    let identifiers = agent
        .execute(
            "listIdentifiers",
            json!({ "provider": provider, "state": state }),
        )
        .await?;
    let identifiers = identifiers.as_array().cloned().unwrap_or_default();
    if identifiers.is_empty() {
        eprintln!("no identifiers");
        return Ok(());
    }
    for id in identifiers {
        println!(
            "{}\t{}\t{}\t{}",
            id["did"].as_str().unwrap_or_default(),
            id["alias"].as_str().unwrap_or("-"),
            id["state"].as_str().unwrap_or_default(),
            micros_to_rfc3339(id["createdAt"].as_u64().unwrap_or_default())
        );
    }
    Ok(())
}

/// `didagent resolve <did>`
async fn cmd_resolve(agent: &Agent, did: &str) -> Result<()> {
    let document = agent.execute("resolveDID", json!({ "didUrl": did })).await?;
    print_json(&document)
}

/// `didagent sign <data> (--kid K | --did D) [--hex]`
async fn cmd_sign(
    agent: &Agent,
    data: &str,
    kid: Option<String>,
    did: Option<String>,
    hex: bool,
) -> Result<()> {
    let kid = match (kid, did) {
        (Some(kid), _) => kid,
        (None, Some(did)) => {
            let identifier = agent.execute("getIdentifier", json!({ "did": did })).await?;
            identifier["controllerKeyId"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("identifier {did} has no controller key"))?
        }
        (None, None) => return Err(anyhow!("pass --kid or --did")),
    };
    let encoding = if hex { "hex" } else { "utf8" };
    let signature = agent
        .execute(
            "sign",
            json!({ "kid": kid, "data": data, "encoding": encoding }),
        )
        .await?;
    println!("{}", signature.as_str().unwrap_or_default());
    Ok(())
}

/// `didagent delete <did>`
async fn cmd_delete(agent: &Agent, did: &str) -> Result<()> {
    agent.execute("deleteIdentifier", json!({ "did": did })).await?;
    eprintln!("deactivated {did}");
    Ok(())
}

/// `didagent keys`
async fn cmd_keys(agent: &Agent) -> Result<()> {
    let keys = agent.execute("listKeys", json!({})).await?;
    for key in keys.as_array().cloned().unwrap_or_default() {
        println!(
            "{}\t{}\t{}",
            key["kid"].as_str().unwrap_or_default(),
            key["type"].as_str().unwrap_or_default(),
            key["kms"].as_str().unwrap_or_default()
        );
    }
    Ok(())
}
