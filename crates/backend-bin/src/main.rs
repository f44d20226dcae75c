// ============================
// crates/backend-bin/src/main.rs
// ============================
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use backend_lib::{
    accounts::{Account, MemoryAccounts},
    auth::MemoryAuth,
    config::{Settings, DEFAULT_CONFIG_FILE},
    logging,
    privileges::Privileges,
    router::create_router,
    storage::{MemoryLockManager, MemoryStorage},
    AppState,
};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

/// Bancho server for the osu! client
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML configuration file. Missing files fall back to defaults.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override `server.port`
    #[arg(short, long)]
    port: Option<u16>,

    /// Register an account for local play, as `id:username:password_md5`.
    /// May be repeated.
    #[arg(long = "account", value_parser = parse_account)]
    accounts: Vec<DevAccount>,
}

#[derive(Debug, Clone)]
struct DevAccount {
    account_id: i32,
    username: String,
    password_md5: String,
}

fn parse_account(raw: &str) -> Result<DevAccount, String> {
    let mut parts = raw.splitn(3, ':');
    let (Some(id), Some(username), Some(password_md5)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err("expected id:username:password_md5".to_string());
    };
    let account_id = id
        .parse()
        .map_err(|e| format!("invalid account id '{id}': {e}"))?;
    Ok(DevAccount {
        account_id,
        username: username.to_string(),
        password_md5: password_md5.to_string(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    logging::init(&settings.logging)?;

    let addr = settings.bind_addr()?;

    // Accounts live elsewhere in production; this binary serves from memory
    let accounts = Arc::new(MemoryAccounts::new());
    let auth = Arc::new(MemoryAuth::new());
    for dev in &args.accounts {
        accounts.insert(Account {
            account_id: dev.account_id,
            username: dev.username.clone(),
            privileges: Privileges::UNRESTRICTED | Privileges::VERIFIED,
            country: "xx".to_string(),
            country_code: 0,
        });
        auth.set_password(dev.account_id, &dev.password_md5);
        info!(account_id = dev.account_id, username = %dev.username, "registered local account");
    }
    let state = AppState::new(
        settings,
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryLockManager::default()),
        accounts.clone(),
        accounts,
        auth,
    );
    state.seed_channels().await?;

    let app = create_router(Arc::new(state));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "bancho listening");

    axum::serve(listener, app).await?;
    Ok(())
}
