//! geotab-cli - Command-line access to the MyGeotab fleet API
//!
//! Credentials come from flags or the `GEOTAB_*` environment
//! variables; results print as pretty JSON on stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use geotab_client::{Credentials, GeotabClient};
use serde_json::{json, Map, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "geotab-cli")]
#[command(author, version, about = "MyGeotab fleet management CLI")]
struct Cli {
    /// Account username, usually an email address
    #[arg(short, long, env = "GEOTAB_USERNAME")]
    username: String,

    /// Account password (omit when a session id is supplied)
    #[arg(short, long, env = "GEOTAB_PASSWORD")]
    password: Option<String>,

    /// Database (company) name; resolved by the server when omitted
    #[arg(short, long, env = "GEOTAB_DATABASE")]
    database: Option<String>,

    /// Session id from a previous authentication
    #[arg(long, env = "GEOTAB_SESSION_ID")]
    session_id: Option<String>,

    /// API server host (default: my.geotab.com)
    #[arg(short, long, env = "GEOTAB_SERVER")]
    server: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and print the refreshed session credentials
    Auth,

    /// Fetch entities of a type, with an optional search filter
    Get {
        /// Entity type, e.g. Device or Trip
        type_name: String,

        /// Search filter as JSON, e.g. '{"id": "b123"}'
        #[arg(long)]
        search: Option<String>,
    },

    /// Invoke an arbitrary API method
    Call {
        /// Method name, e.g. GetCountOf
        method: String,

        /// Entity type for generic methods
        #[arg(long)]
        type_name: Option<String>,

        /// Method parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Batch several calls into one ExecuteMultiCall request
    MultiCall {
        /// Calls as JSON pairs: '[["Get", {"typeName": "Trip"}], ...]'
        calls: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "geotab_client=debug,geotab_cli=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer())
        .init();

    let credentials = Credentials::new(
        &cli.username,
        cli.password.as_deref(),
        cli.database.as_deref(),
        cli.session_id.as_deref(),
        cli.server.as_deref(),
    )?;
    let client = GeotabClient::new(credentials)?;

    let output = match cli.command {
        Commands::Auth => {
            let fresh = client.authenticate().await?;
            json!({
                "server": fresh.server(),
                "credentials": fresh.as_param(),
            })
        }
        Commands::Get { type_name, search } => {
            let mut params = Map::new();
            if let Some(search) = search {
                let filter: Value =
                    serde_json::from_str(&search).context("--search must be valid JSON")?;
                params.insert("search".to_string(), filter);
            }
            client.get(&type_name, params).await?
        }
        Commands::Call {
            method,
            type_name,
            params,
        } => {
            let params: Value =
                serde_json::from_str(&params).context("--params must be valid JSON")?;
            let Value::Object(params) = params else {
                bail!("--params must be a JSON object");
            };
            client.call(&method, type_name.as_deref(), params).await?
        }
        Commands::MultiCall { calls } => {
            let parsed: Vec<(String, Value)> = serde_json::from_str(&calls)
                .context("calls must be a JSON list of [method, params] pairs")?;
            let calls: Vec<(&str, Value)> = parsed
                .iter()
                .map(|(method, params)| (method.as_str(), params.clone()))
                .collect();
            client.multi_call(&calls).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
