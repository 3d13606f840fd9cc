//! studio-sessions - session booking and cancellation service
//!
//! `serve` (default) runs the HTTP API; `create-user` bootstraps accounts
//! (typically the first admin); `migrate --rollback-to N` reverts schema
//! migrations.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use studio_common::api::load_shared_secret;
use studio_common::config::{
    load_service_config, prepare_database_path, resolve_root_folder, Environment, ROOT_ENV_VAR,
};
use studio_common::db::{get_schema_version, init_database, rollback_migrations};
use studio_sessions::db::users::{insert_user, NewUser};
use studio_sessions::notify::{LogNotifier, Notifier, WebhookNotifier};
use studio_sessions::session::Role;
use studio_sessions::{build_router, AppState};

/// Command-line arguments for studio-sessions
#[derive(Parser, Debug)]
#[command(name = "studio-sessions")]
#[command(about = "Fitness studio session booking and cancellation service")]
#[command(version)]
struct Cli {
    /// Root folder holding studio.db
    #[arg(short, long, global = true)]
    root_folder: Option<String>,

    /// Address to bind (overrides config file)
    #[arg(long, global = true, env = "STUDIO_BIND")]
    bind: Option<String>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, global = true, env = "STUDIO_PORT")]
    port: Option<u16>,

    /// development | production (overrides config file)
    #[arg(long, global = true, env = "STUDIO_ENV")]
    environment: Option<Environment>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Create a user account
    CreateUser {
        /// admin | trainer | client
        #[arg(long)]
        role: Role,
        #[arg(long)]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },

    /// Schema maintenance
    Migrate {
        /// Revert migrations down to this schema version
        #[arg(long)]
        rollback_to: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Build identification first, before any database delays
    info!(
        "Starting studio-sessions v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();

    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), ROOT_ENV_VAR);
    let db_path = prepare_database_path(&root_folder)
        .with_context(|| format!("Failed to prepare root folder {}", root_folder.display()))?;
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, cli.bind, cli.port, cli.environment).await,
        Command::CreateUser {
            role,
            first_name,
            last_name,
            email,
            phone,
        } => {
            let id = insert_user(
                &pool,
                &NewUser {
                    role,
                    first_name,
                    last_name,
                    email,
                    phone,
                    specialties: None,
                },
            )
            .await
            .context("Failed to create user")?;
            info!("Created {} user with id {}", role, id);
            println!("{}", id);
            Ok(())
        }
        Command::Migrate { rollback_to } => {
            if let Some(target) = rollback_to {
                rollback_migrations(&pool, target)
                    .await
                    .with_context(|| format!("Rollback to version {} failed", target))?;
            }
            let version = get_schema_version(&pool).await?;
            info!("Schema version: {}", version);
            Ok(())
        }
    }
}

async fn serve(
    pool: sqlx::SqlitePool,
    bind: Option<String>,
    port: Option<u16>,
    environment: Option<Environment>,
) -> Result<()> {
    let config = load_service_config().context("Failed to load config file")?;
    let bind = bind.unwrap_or(config.bind_address);
    let port = port.unwrap_or(config.port);
    let environment = environment.unwrap_or(config.environment);

    let shared_secret = load_shared_secret(&pool)
        .await
        .context("Failed to load API shared secret")?;
    if shared_secret == 0 {
        warn!("API authentication disabled (shared_secret = 0)");
    } else {
        info!("✓ Loaded shared secret for API authentication");
    }

    let notifier: Arc<dyn Notifier> = match config.notification_webhook_url {
        Some(url) => {
            info!("Notifications: webhook {}", url);
            Arc::new(WebhookNotifier::new(url)?)
        }
        None => {
            info!("Notifications: log only");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState::new(pool, shared_secret, notifier)
        .with_masked_errors(environment.is_production());
    let app = build_router(state);

    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("studio-sessions listening on http://{} ({:?})", addr, environment);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
