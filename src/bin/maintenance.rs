use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;

use marketplace::{auth::jwt::JwtService, config::AppConfig, db, models::User, schema::users};

const USAGE: &str = "Usage: maintenance migrate | maintenance issue-token <wallet-address>";

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("migrate") => migrate()?,
        Some("issue-token") => {
            let Some(wallet) = args.next() else {
                eprintln!("{USAGE}");
                std::process::exit(1);
            };
            issue_token(&wallet)?
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_config() -> Result<AppConfig> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded marketplace configuration"
    );
    Ok(config)
}

fn migrate() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let applied = db::run_migrations(&pool)?;
    println!("Applied {applied} migration(s).");
    Ok(())
}

fn issue_token(wallet: &str) -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let wallet = wallet.trim().to_lowercase();
    let user: Option<User> = users::table
        .filter(users::wallet_address.eq(&wallet))
        .first(&mut conn)
        .optional()
        .context("failed to look up user")?;
    let Some(user) = user else {
        bail!("no user registered with wallet address {wallet}");
    };

    let jwt = JwtService::from_config(&config)?;
    let token = jwt.generate_token(user.id, &user.wallet_address, &user.role)?;
    println!("{token}");
    eprintln!(
        "Token for {} expires in {} seconds.",
        user.username,
        jwt.expiry_seconds()
    );
    Ok(())
}
