//! db-ask - ask questions of a relational database in plain language.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use db_ask::cli::{Cli, Command};
use db_ask::config::{Config, ConnectionConfig};
use db_ask::db::{self, readonly_setup_script, DataStore, SchemaCatalog};
use db_ask::error::AskError;
use db_ask::llm::{create_client, ConversationTurn};
use db_ask::logging::init_stderr_logging;
use db_ask::orchestrator::{Orchestrator, QuestionRequest};
use db_ask::safety::validate_sql;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exit code when the pipeline reported an error code in its response.
const EXIT_REJECTED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    init_stderr_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<AskError>() {
                Some(ask) => error!("{}: {}", ask.category(), ask.message()),
                None => error!("{e:#}"),
            }
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config_path();
    debug!(path = %config_path.display(), "Loading config");
    let mut config = Config::load_from_file(&config_path)?;
    if let Some(provider) = &cli.llm {
        config.llm.provider = provider.clone();
    }

    let connection = resolve_connection(&cli, &config)?;

    match &cli.command {
        Command::Validate { sql } => {
            let verdict = validate_sql(sql);
            print_json(&verdict)?;
            return Ok(exit_code(verdict.is_accepted()));
        }
        Command::ReadonlySetup { role } => {
            let database = connection
                .as_ref()
                .and_then(|c| c.database.as_deref())
                .unwrap_or("postgres");
            let schema = connection
                .as_ref()
                .map(ConnectionConfig::schema_name)
                .unwrap_or("public");
            print!("{}", readonly_setup_script(role, database, schema));
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let connection = connection.context(
        "No database connection configured. Pass --url, set DATABASE_URL, \
         or add [connections.default] to the config file.",
    )?;
    info!(connection = %connection.display_string(), "Connecting");
    let store = db::connect(&connection).await?;

    let outcome = dispatch(&cli.command, Arc::clone(&store), &config, &connection).await;
    if let Err(e) = store.close().await {
        warn!(error = %e, "Failed to close store");
    }
    outcome
}

async fn dispatch(
    command: &Command,
    store: Arc<dyn DataStore>,
    config: &Config,
    connection: &ConnectionConfig,
) -> Result<ExitCode> {
    match command {
        Command::Check => {
            store.ping().await?;
            print_json(&serde_json::json!({
                "ok": true,
                "backend": connection.backend.as_str(),
                "connection": connection.display_string(),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Schema { text } => {
            let limits = &config.limits;
            let snapshot = SchemaCatalog::new(store, limits.query_timeout())
                .capture()
                .await?;
            if *text {
                println!("{}", snapshot.format_for_llm(limits.schema_budget()));
            } else {
                print_json(&snapshot)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Ask {
            question,
            model,
            history,
            chart_x,
            chart_y,
        } => {
            let llm = create_client(&config.llm, None)?;
            let orchestrator = Orchestrator::new(store, llm, &config.llm, &config.limits);

            let mut request = QuestionRequest::new(question.clone())
                .with_chart_axes(chart_x.clone(), chart_y.clone());
            if let Some(path) = history {
                request = request.with_history(load_history(path)?);
            }
            if let Some(model) = model {
                request = request.with_model(model.clone());
            }

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let response = orchestrator.ask(&request, &cancel).await;
            print_json(&response)?;
            Ok(exit_code(response.is_success()))
        }
        Command::Validate { .. } | Command::ReadonlySetup { .. } => {
            Err(AskError::internal("command does not use a store").into())
        }
    }
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
///
/// Precedence: CLI arguments, then the named connection, then the default
/// connection, then `DATABASE_URL`. PG* variables fill remaining gaps.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(AskError::config(format!(
                    "Connection '{}' not found in config file",
                    name
                ))
                .into());
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if connection.is_none() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            connection = Some(ConnectionConfig::from_connection_string(&url)?);
        }
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}

fn load_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("History file {} is not a list of turns", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_REJECTED)
    }
}
