use std::{fs, path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use uuid::Uuid;

use repositories::{memory::MemoryStore, postgres::PostgresStore, stripe::StripeApi, Store};
use settings::{DatabaseBackend, Settings};

mod models;
mod repositories;
mod services;
mod settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Insert a user and print its id.
    CreateUser {
        #[arg(long, default_value = "user")]
        role: models::users::Role,
        #[arg(long, default_value_t = Decimal::ZERO)]
        balance: Decimal,
    },
    /// Print a bearer token for an existing user id.
    IssueToken {
        #[arg(long)]
        user_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let settings = Settings::new(&args.config).expect("Failed to load settings.");

    init_logging(&args.log4rs).expect("Failed to initialize logging.");

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            log::info!("Starting wager ledger.");
            let store = open_store(&settings).await?;
            let provider = Arc::new(StripeApi::new(
                settings.stripe.secret_key.clone(),
                settings.stripe.api_url.clone(),
                settings.stripe.currency.clone(),
                Duration::from_secs(settings.stripe.timeout_secs),
            )?);

            services::start_services(store, provider, settings).await?;
        }
        Command::CreateUser { role, balance } => {
            let store = open_store(&settings).await?;
            let user = store
                .insert_user(models::users::NewUser { role, balance })
                .await?;

            log::info!("Created {} {} with balance {}.", role, user.id, user.balance);
            println!("{}", user.id);
        }
        Command::IssueToken { user_id } => {
            let keys = services::http::auth::TokenKeys::new(
                &settings.auth.jwt_secret,
                settings.auth.token_ttl_secs,
            );

            println!("{}", keys.issue(user_id)?);
        }
    }

    Ok(())
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn Store>> {
    match settings.database.backend {
        DatabaseBackend::Postgres => {
            let store =
                PostgresStore::connect(&settings.database.url, settings.database.max_connections)
                    .await?;
            store.migrate().await?;
            log::info!("Connected to Postgres.");

            Ok(Arc::new(store))
        }
        DatabaseBackend::Memory => {
            log::warn!("Using the in-memory store, balances will not survive a restart.");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn init_logging(path: &str) -> Result<()> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
