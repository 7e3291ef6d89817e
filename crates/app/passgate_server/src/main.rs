//! Passgate API server binary.
//!
//! Connects to PostgreSQL, runs migrations and serves the auth API.

use std::sync::Arc;

use clap::Parser;
use passgate_core::auth::AuthService;
use passgate_core::auth::matcher::BcryptMatcher;
use passgate_core::crypto::AesGcmEncrypter;
use passgate_core::notify::LogNotifier;
use passgate_core::store::PgCredentialStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "passgate_server", about = "Passgate API server")]
struct Args {
    /// Port to listen on. Overrides the port in `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/passgate"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,passgate_api=debug,passgate_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = passgate_api::config::ApiConfig::from_env()?;
    config.pg_connection_url = args.database_url;
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map_or("127.0.0.1", |(host, _)| host);
        config.bind_addr = format!("{host}:{port}");
    }

    info!(
        app_env = ?config.auth.app_env,
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        "starting passgate_server"
    );
    if config.auth.debug_passcode.is_some() {
        if config.auth.app_env.is_production() {
            warn!("AUTH_DEBUG_PASSCODE is set but ignored in production");
        } else {
            warn!("AUTH_DEBUG_PASSCODE is set; passcode mail is disabled");
        }
    }

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    passgate_core::migrate::migrate(&pool).await?;

    let auth = AuthService::new(
        Arc::new(PgCredentialStore::new(pool)),
        Arc::new(LogNotifier::new(!config.auth.app_env.is_production())),
        Arc::new(BcryptMatcher::default()),
        Arc::new(AesGcmEncrypter::new(&config.app_key)?),
        config.auth.clone(),
    );

    let app = passgate_api::router(passgate_api::AppState { auth });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
        })
        .await?;

    Ok(())
}
