//! `pipeboard` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`:    start the API server.
//! - `migrate`:  run pending database migrations.
//! - `validate`: validate a pipe definition JSON file.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine::{EngineConfig, Orchestrator, PgStore, Pipe};
use transport::http::{HttpSmsTransport, WebhookNotifier};
use transport::smtp::{SmtpConfig, SmtpEmailTransport};
use transport::{DisabledTransport, EmailTransport, SmsTransport};

#[derive(Parser)]
#[command(
    name = "pipeboard",
    about = "Kanban board automation engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve(ServeArgs),
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a pipe definition JSON file (stages, forms, templates and
    /// automations).
    Validate {
        /// Path to the pipe JSON file.
        path: std::path::PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Public origin used in form links.
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:3000")]
    base_url: String,

    #[arg(long, env = "MAX_CASCADE_DEPTH", default_value_t = 10)]
    max_cascade_depth: u32,

    #[arg(long, env = "TRANSPORT_TIMEOUT_SECS", default_value_t = 5)]
    transport_timeout_secs: u64,

    #[command(flatten)]
    smtp: SmtpArgs,

    #[arg(long, env = "SMS_API_URL")]
    sms_api_url: Option<String>,

    #[arg(long, env = "SMS_API_TOKEN", hide_env_values = true)]
    sms_api_token: Option<String>,

    /// Receives a summary of every dispatch that executed automations.
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    notify_webhook_url: Option<String>,
}

#[derive(Args)]
struct SmtpArgs {
    #[arg(long, env = "SMTP_HOST")]
    smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    smtp_port: u16,

    #[arg(long, env = "SMTP_USERNAME", default_value = "")]
    smtp_username: String,

    #[arg(long, env = "SMTP_PASSWORD", default_value = "", hide_env_values = true)]
    smtp_password: String,

    #[arg(long, env = "SMTP_FROM_EMAIL", default_value = "noreply@localhost")]
    smtp_from_email: String,

    #[arg(long, env = "SMTP_FROM_NAME")]
    smtp_from_name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Migrate { database_url } => {
            info!("Running migrations");
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let pipe: Pipe = serde_json::from_str(&content).context("invalid pipe JSON")?;

            match engine::validate_pipe(&pipe) {
                Ok(()) => {
                    println!(
                        "✅ Pipe '{}' is valid: {} stages, {} automations.",
                        pipe.name,
                        pipe.stages.len(),
                        pipe.automations.len()
                    );
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(args.transport_timeout_secs);
    let config = EngineConfig {
        base_url: args.base_url.clone(),
        max_cascade_depth: args.max_cascade_depth,
        transport_timeout: timeout,
        default_from_email: args.smtp.smtp_from_email.clone(),
        default_from_name: args.smtp.smtp_from_name.clone(),
        ..EngineConfig::default()
    };

    let pool = db::pool::create_pool(&args.database_url, args.max_connections)
        .await
        .context("failed to connect to database")?;
    let store = Arc::new(PgStore::new(pool));

    let email: Arc<dyn EmailTransport> = match &args.smtp.smtp_host {
        Some(host) => {
            let smtp = SmtpEmailTransport::new(&SmtpConfig {
                host: host.clone(),
                port: args.smtp.smtp_port,
                username: args.smtp.smtp_username.clone(),
                password: args.smtp.smtp_password.clone(),
                timeout,
            })
            .context("invalid SMTP configuration")?;
            info!(host = %host, "SMTP email transport enabled");
            Arc::new(smtp)
        }
        None => {
            warn!("SMTP_HOST not set, email actions will fail");
            Arc::new(DisabledTransport)
        }
    };

    let sms: Arc<dyn SmsTransport> = match &args.sms_api_url {
        Some(url) => {
            info!(url = %url, "HTTP SMS transport enabled");
            Arc::new(HttpSmsTransport::new(url.clone(), args.sms_api_token.clone(), timeout))
        }
        None => {
            warn!("SMS_API_URL not set, SMS actions will fail");
            Arc::new(DisabledTransport)
        }
    };

    let mut engine = Orchestrator::new(store, email, sms, config);
    if let Some(url) = &args.notify_webhook_url {
        info!(url = %url, "dispatch notifications enabled");
        engine = engine.with_notifier(Arc::new(WebhookNotifier::new(url.clone(), timeout)));
    }

    info!("Starting API server on {}", args.bind);
    api::serve(&args.bind, api::AppState::new(engine))
        .await
        .context("API server failed")?;
    Ok(())
}
