//! Tether server entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tether::auth::users::CredentialStore;
use tether::auth::TokenSigner;
use tether::audit::default_policy;
use tether::server::{self, AppState};
use tether::storage::{MemoryStorage, PostgresConfig, PostgresStorage, Storage};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tether", about = "Authenticated gateway over a shared key/value store")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "TETHER_BIND", default_value = "127.0.0.1:8800")]
    bind: SocketAddr,

    /// Secret used to sign bearer tokens
    #[arg(long, env = "TETHER_SECRET")]
    secret: String,

    /// Token lifetime in seconds
    #[arg(long, env = "TETHER_TOKEN_TTL", default_value_t = 600)]
    token_ttl: u64,

    /// Postgres connection URL; falls back to PG* variables, then to
    /// in-memory storage
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Accounts that receive the admin role at registration (repeatable)
    #[arg(long = "admin-account")]
    admin_accounts: Vec<String>,
}

async fn open_storage(
    config: Option<PostgresConfig>,
    namespace: &str,
) -> Result<Arc<dyn Storage>> {
    match config {
        Some(config) => {
            let store = PostgresStorage::open(config, namespace)
                .await
                .with_context(|| format!("failed to open postgres storage '{}'", namespace))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStorage::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Explicit URL first, then the PG* environment, then in-memory.
    let db_config = match cli.database_url.as_deref() {
        Some(url) => Some(PostgresConfig::from_url(url).context("invalid DATABASE_URL")?),
        None => PostgresConfig::from_env(),
    };

    if db_config.is_none() {
        info!("no database configured, using in-memory storage");
    }

    // Separate namespaces keep credentials out of the data keyspace.
    let auth_store = open_storage(db_config.clone(), "auth").await?;
    let data_store = open_storage(db_config, "data").await?;

    let state = AppState {
        users: CredentialStore::new(auth_store),
        tokens: Arc::new(TokenSigner::new(
            cli.secret.into_bytes(),
            Duration::from_secs(cli.token_ttl),
        )),
        policy: Arc::new(default_policy()),
        data: data_store,
        admin_accounts: Arc::new(cli.admin_accounts),
    };

    server::run(cli.bind, state).await
}
