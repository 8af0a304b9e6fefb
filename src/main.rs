use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use ideaforge::context::SystemClock;
use ideaforge::error::{code, SessionError};
use ideaforge::identity::HttpIdentityVerifier;
use ideaforge::llm::HttpModelService;
use ideaforge::protocol_envelope::ProtocolEnvelope;
use ideaforge::transfer::{export_session, import_session, ImportOptions};
use ideaforge::{
    http, load_config, RuntimeConfig, SessionDb, SessionDeps, SessionId, SessionRegistry,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ideaforge")]
#[command(about = "Session runtime for a tool-calling idea assessment assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: .ideaforge/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP and WebSocket API
    Serve,

    /// Create the database and apply the schema
    InitDb,

    /// Write a session export document
    Export {
        #[arg(short, long)]
        session: String,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Restore a session from an export document
    Import {
        #[arg(short, long)]
        session: String,

        #[arg(short, long)]
        file: PathBuf,

        /// Keep the session id stored in each row
        #[arg(long)]
        preserve_session_id: bool,

        #[arg(long)]
        skip_messages: bool,

        #[arg(long)]
        skip_scheduled_tasks: bool,
    },

    /// Validate the configuration and print the resolved values
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ideaforge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let envelope = err.downcast_ref::<SessionError>().map_or_else(
                || ProtocolEnvelope::error(code::INTERNAL, format!("{err:#}")),
                |session_error| ProtocolEnvelope::from_error(session_error),
            );
            let exit_code = err
                .downcast_ref::<SessionError>()
                .map_or(1, SessionError::exit_code);
            error!("{err:#}");
            println!(
                "{}",
                serde_json::to_string(&envelope).unwrap_or_else(|_| "{\"ok\":false}".to_string())
            );
            ExitCode::from(u8::try_from(exit_code).unwrap_or(1))
        }
    }
}

async fn open_db(config: &RuntimeConfig) -> anyhow::Result<SessionDb> {
    let db = SessionDb::new(&config.database_url).await?;
    db.initialize_schema().await?;
    Ok(db)
}

fn session_id(raw: String) -> anyhow::Result<SessionId> {
    let session_id = SessionId::new(raw);
    if !session_id.is_well_formed() {
        return Err(SessionError::Validation(format!("malformed session id `{session_id}`")).into());
    }
    Ok(session_id)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config).await?;

    match cli.command {
        Commands::Serve => serve(config).await,

        Commands::InitDb => {
            let db = open_db(&config).await?;
            db.close().await;
            info!(database_url = %config.database_url, "Schema applied");
            print_success(json!({ "databaseUrl": config.database_url }));
            Ok(())
        }

        Commands::Export { session, out } => {
            let session_id = session_id(session)?;
            let db = open_db(&config).await?;
            let now = Utc::now();
            let state = db
                .load_state(&session_id)
                .await?
                .ok_or_else(|| SessionError::NotFound(format!("session {session_id}")))?
                .normalize(&session_id, now);
            let document = export_session(&db, &state, now).await;
            let body = serde_json::to_string_pretty(&document)?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, body)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(%session_id, path = %path.display(), records = document.record_count(), "Export written");
                }
                None => println!("{body}"),
            }
            db.close().await;
            Ok(())
        }

        Commands::Import {
            session,
            file,
            preserve_session_id,
            skip_messages,
            skip_scheduled_tasks,
        } => {
            let session_id = session_id(session)?;
            let content = tokio::fs::read_to_string(&file)
                .await
                .map_err(SessionError::from)?;
            let document: serde_json::Value =
                serde_json::from_str(&content).map_err(SessionError::from)?;
            let options = ImportOptions {
                preserve_session_id,
                include_messages: !skip_messages,
                include_scheduled_tasks: !skip_scheduled_tasks,
            };
            let db = open_db(&config).await?;
            let report =
                import_session(&db, &db, &session_id, document, options, Utc::now()).await?;
            db.close().await;
            print_success(serde_json::to_value(&report)?);
            Ok(())
        }

        Commands::CheckConfig => {
            print_success(json!({
                "databaseUrl": config.database_url,
                "bindAddr": config.bind_addr.to_string(),
                "modelEndpoint": config.model_endpoint.as_ref().map(ToString::to_string),
                "modelName": config.model_name,
                "identityEndpoint": config.identity_endpoint.as_ref().map(ToString::to_string),
                "maxSteps": config.max_steps,
                "commandQueueDepth": config.command_queue_depth,
                "eventBuffer": config.event_buffer,
            }));
            Ok(())
        }
    }
}

fn print_success(data: serde_json::Value) {
    let envelope = ProtocolEnvelope::success(data);
    match serde_json::to_string(&envelope) {
        Ok(line) => println!("{line}"),
        Err(err) => error!("Failed to render output: {err}"),
    }
}

async fn serve(config: RuntimeConfig) -> anyhow::Result<()> {
    let model_endpoint = config.model_endpoint.clone().ok_or_else(|| {
        SessionError::ConfigError("model_endpoint is required to serve".to_string())
    })?;
    let identity_endpoint = config.identity_endpoint.clone().ok_or_else(|| {
        SessionError::ConfigError("identity_endpoint is required to serve".to_string())
    })?;

    let db = open_db(&config).await?;
    let deps = SessionDeps {
        db: db.clone(),
        model: Arc::new(HttpModelService::new(model_endpoint, config.model_name.clone())?),
        identity: Arc::new(HttpIdentityVerifier::new(identity_endpoint)?),
        clock: Arc::new(SystemClock),
        settings: config.session_settings(),
    };
    let registry = Arc::new(SessionRegistry::new(deps));
    let app = http::app(Arc::clone(&registry));

    http::serve(config.bind_addr, app, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {err}");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    })
    .await?;

    registry.shutdown_all().await;
    db.close().await;
    Ok(())
}
