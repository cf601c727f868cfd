//! Kiosco - backend gateway, receipt and session tooling
//!
//! Tooling for the Kiosco retail app: a configured handle to the hosted
//! auth/data backend, Argentine peso receipt formatting, and the session
//! bootstrap that primes browser end-to-end checks.
//!
//! ## Usage
//!
//! ```bash
//! # Sign the test user in and persist the browser session
//! TEST_USER_EMAIL=... TEST_USER_PASSWORD=... kiosco bootstrap
//!
//! # Format amounts
//! kiosco format 1500 1000000
//!
//! # Render a receipt
//! kiosco receipt venta.json --format csv
//!
//! # Read a table
//! kiosco query productos --filter stock=gt.0 --limit 20
//!
//! # Record a sale as the signed-in user
//! kiosco insert ventas --data '{"total":1500}' --authenticated
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

mod bootstrap;
mod cli;
mod config;
mod gateway;
mod receipt;
mod utils;

use bootstrap::{BootstrapConfig, BootstrapOutcome, SessionBootstrap, SessionStore, UrlPattern};
use cli::Args;
use config::{AppConfig, EnvConfig};
use gateway::{BackendGateway, SelectQuery};
use receipt::{OutputFormat, Receipt, ReceiptRenderer};
use utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    init_logger(LogLevel::resolve(args.verbose, env.log_level.as_deref()));

    // A bootstrap without credentials is skipped before any config is loaded.
    if skips_bootstrap(&args.command, &env) {
        report_bootstrap(BootstrapOutcome::Skipped);
        return Ok(());
    }

    let config = AppConfig::resolve(&env)?;

    // Built once, handed to every command that talks to the backend.
    let gateway = BackendGateway::with_timeout(
        env.backend_url.as_deref(),
        env.backend_key.as_deref(),
        args.command.runtime_context(),
        config.request_timeout_secs,
    );

    match args.command {
        cli::Command::Bootstrap(bootstrap_args) => {
            run_bootstrap(bootstrap_args, config, &env, gateway).await?;
        }
        cli::Command::Session(session_args) => {
            manage_session(session_args, config, gateway).await?;
        }
        cli::Command::Format(format_args) => {
            format_amounts(format_args)?;
        }
        cli::Command::Receipt(receipt_args) => {
            render_receipt(receipt_args)?;
        }
        cli::Command::Query(query_args) => {
            run_query(query_args, config, gateway).await?;
        }
        cli::Command::Insert(insert_args) => {
            run_insert(insert_args, config, gateway).await?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, config, &env, gateway)?;
        }
    }

    Ok(())
}

async fn run_bootstrap(
    args: cli::BootstrapArgs,
    mut config: AppConfig,
    env: &EnvConfig,
    gateway: BackendGateway,
) -> Result<()> {
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(state_path) = args.state_path {
        config.state_path = PathBuf::from(state_path);
    }
    config.validate()?;

    let mut bootstrap_config = BootstrapConfig::from_app(&config)?;
    if let Some(timeout) = args.timeout {
        bootstrap_config = bootstrap_config.timeout(Duration::from_secs(timeout));
    }
    if let Some(interval) = args.poll_interval {
        bootstrap_config = bootstrap_config.poll_interval(Duration::from_millis(interval));
    }
    if let Some(pattern) = &args.pattern {
        bootstrap_config.pattern = UrlPattern::glob(pattern)
            .with_context(|| format!("Invalid post-login pattern: {pattern}"))?;
    }

    let store = SessionStore::new(&config.state_path);
    let bootstrap = SessionBootstrap::new(gateway, bootstrap_config, store)?;
    let credentials = env.test_credentials();

    let outcome = bootstrap.run(credentials.as_ref()).await?;
    report_bootstrap(outcome);

    Ok(())
}

/// Whether this is a bootstrap run without test credentials
fn skips_bootstrap(command: &cli::Command, env: &EnvConfig) -> bool {
    matches!(command, cli::Command::Bootstrap(_)) && env.test_credentials().is_none()
}

fn report_bootstrap(outcome: BootstrapOutcome) {
    info!("Bootstrap finished: {}", outcome.state());

    match outcome {
        BootstrapOutcome::Skipped => {
            println!("○ TEST_USER_EMAIL / TEST_USER_PASSWORD not set, skipping session bootstrap");
        }
        BootstrapOutcome::Persisted {
            path,
            user,
            landed_on,
        } => {
            println!("✓ Signed in as {user} (landed on {landed_on})");
            println!("✓ Session state saved to {}", path.display());
        }
    }
}

async fn manage_session(
    args: cli::SessionArgs,
    mut config: AppConfig,
    gateway: BackendGateway,
) -> Result<()> {
    if let Some(state_path) = args.state_path {
        config.state_path = PathBuf::from(state_path);
    }
    let store = SessionStore::new(&config.state_path);

    match args.action {
        cli::SessionAction::Show { verify } => {
            if !store.exists() {
                println!("No session state at {}", store.path().display());
                println!("Run `kiosco bootstrap` first.");
                return Ok(());
            }

            let (state, session) = store.load_session()?;
            println!("\nSession state: {}", store.path().display());
            println!("  User:      {}", session.user_label());
            println!("  Cookies:   {}", state.cookies.len());
            println!("  Origins:   {}", state.origins.len());

            match session.expires_at_time() {
                Some(expiry) if expiry > Utc::now() => {
                    let left = expiry - Utc::now();
                    println!("  Expires:   {expiry} (in {} min)", left.num_minutes());
                }
                Some(expiry) => println!("  Expires:   {expiry} (expired)"),
                None => println!("  Expires:   unknown"),
            }

            if verify {
                match gateway.get_user(&session.access_token).await {
                    Ok(user) => println!("  Backend:   ✓ token accepted for {}", user.id),
                    Err(e) => println!("  Backend:   ✗ {e}"),
                }
            }
            println!();
        }

        cli::SessionAction::Refresh { force } => {
            match bootstrap::refresh_persisted(&gateway, &store, force).await? {
                Some(session) => println!(
                    "✓ Session for {} refreshed and saved to {}",
                    session.user_label(),
                    store.path().display()
                ),
                None => println!("Session is still fresh, nothing to do"),
            }
        }
    }

    Ok(())
}

fn format_amounts(args: cli::FormatArgs) -> Result<()> {
    for raw in &args.amounts {
        let amount: f64 = raw
            .trim()
            .parse()
            .with_context(|| format!("Not a number: {raw}"))?;
        let formatted = receipt::format_ars(amount)?;
        println!("{formatted}");
    }
    Ok(())
}

fn render_receipt(args: cli::ReceiptArgs) -> Result<()> {
    let format = OutputFormat::from_str(&args.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown format: {}", args.format))?;

    let sale = Receipt::load(&args.file)?;
    let output = ReceiptRenderer::new(format).render(&sale.table()?)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write receipt to {path}"))?;
            info!("Receipt written to {}", path);
            println!("✓ Receipt saved to {path}");
        }
        None => println!("{output}"),
    }

    Ok(())
}

async fn run_query(args: cli::QueryArgs, config: AppConfig, gateway: BackendGateway) -> Result<()> {
    if !gateway.is_configured() {
        warn!("Backend credentials are not configured, the query will fail");
    }

    let mut query = SelectQuery::new().columns(&args.select);
    for filter in &args.filter {
        let (column, condition) = filter
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Filter must look like column=condition: {filter}"))?;
        query = query.filter(column, condition);
    }
    if let Some(order) = &args.order {
        query = query.order(order);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }

    let access_token = session_token(&config, &gateway, args.authenticated).await?;
    let rows = gateway
        .select(&args.table, &query, access_token.as_deref())
        .await?;

    info!("{} row(s) from {}", rows.len(), args.table);
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn run_insert(
    args: cli::InsertArgs,
    config: AppConfig,
    gateway: BackendGateway,
) -> Result<()> {
    let raw = match (&args.data, &args.file) {
        (Some(data), _) => data.clone(),
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read rows from {file}"))?,
        (None, None) => anyhow::bail!("Pass the rows with --data or --file"),
    };
    let rows: serde_json::Value =
        serde_json::from_str(&raw).context("Rows must be a JSON object or array")?;

    let access_token = session_token(&config, &gateway, args.authenticated).await?;
    let stored = gateway
        .insert(&args.table, &rows, access_token.as_deref())
        .await?;

    info!("{} row(s) stored in {}", stored.len(), args.table);
    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(())
}

/// Access token of the persisted session, refreshed if it is about to expire
async fn session_token(
    config: &AppConfig,
    gateway: &BackendGateway,
    authenticated: bool,
) -> Result<Option<String>> {
    if !authenticated {
        return Ok(None);
    }

    let store = SessionStore::new(&config.state_path);
    let (_, session) = store
        .load_session()
        .context("Authenticated requests need a persisted session, run `kiosco bootstrap`")?;
    let session = gateway.ensure_fresh(session).await?;
    Ok(Some(session.access_token))
}

fn manage_config(
    args: cli::ConfigArgs,
    config: AppConfig,
    env: &EnvConfig,
    gateway: BackendGateway,
) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show => {
            println!("Application:");
            print!("{}", serde_yaml::to_string(&config)?);
            println!("\nBackend gateway:");
            print!("{}", serde_yaml::to_string(gateway.config())?);
            println!("configured: {}", gateway.is_configured());
            println!("storage_key: {}", gateway.storage_key());
            println!("receipts: {} {}", receipt::LOCALE, receipt::CURRENCY_CODE);
        }

        cli::ConfigAction::Init { path, force } => {
            let path = PathBuf::from(path);
            if path.exists() && !force {
                anyhow::bail!("{} already exists, use --force to overwrite", path.display());
            }
            AppConfig::default().save(&path)?;
            println!("✓ Configuration written to {}", path.display());
        }

        cli::ConfigAction::Env => {
            config::print_env_help();
            println!();
            env.print_summary();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootstrap_command() -> cli::Command {
        Args::parse_from(["kiosco", "bootstrap"]).command
    }

    #[test]
    fn test_bootstrap_skips_before_config_is_checked() {
        let env = EnvConfig {
            base_url: Some("notaurl".to_string()),
            ..Default::default()
        };

        assert!(skips_bootstrap(&bootstrap_command(), &env));
    }

    #[test]
    fn test_bootstrap_with_credentials_is_not_skipped() {
        let env = EnvConfig {
            test_user_email: Some("cajero@kiosco.test".to_string()),
            test_user_password: Some("secreto".to_string()),
            ..Default::default()
        };
        assert!(!skips_bootstrap(&bootstrap_command(), &env));

        let format = Args::parse_from(["kiosco", "format", "1"]).command;
        assert!(!skips_bootstrap(&format, &EnvConfig::default()));
    }
}
