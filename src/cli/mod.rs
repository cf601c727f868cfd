//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

use crate::gateway::RuntimeContext;

/// Kiosco backend, receipt and session tooling
#[derive(Parser, Debug)]
#[command(name = "kiosco")]
#[command(version)]
#[command(about = "Backend gateway, receipt formatting and session bootstrap for Kiosco")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign the test user in and persist the browser session
    Bootstrap(BootstrapArgs),

    /// Inspect or refresh the persisted session
    Session(SessionArgs),

    /// Format amounts as Argentine pesos
    Format(FormatArgs),

    /// Render a receipt table from a sale file
    Receipt(ReceiptArgs),

    /// Read rows from a backend table
    Query(QueryArgs),

    /// Insert rows into a backend table
    Insert(InsertArgs),

    /// Show or create configuration
    Config(ConfigArgs),
}

impl Command {
    /// Context the backend gateway is built for
    pub fn runtime_context(&self) -> RuntimeContext {
        match self {
            Command::Bootstrap(_) | Command::Session(_) => RuntimeContext::Browser,
            Command::Query(args) if args.authenticated => RuntimeContext::Browser,
            Command::Insert(args) if args.authenticated => RuntimeContext::Browser,
            _ => RuntimeContext::Server,
        }
    }
}

/// Arguments for bootstrap command
#[derive(Parser, Debug)]
pub struct BootstrapArgs {
    /// Application URL (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Where to write the session state (overrides config)
    #[arg(long)]
    pub state_path: Option<String>,

    /// Seconds to wait for the post-login redirect
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// URL glob expected after login
    #[arg(long)]
    pub pattern: Option<String>,

    /// Milliseconds between redirect probes
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

/// Arguments for session command
#[derive(Parser, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub action: SessionAction,

    /// Session state file (overrides config)
    #[arg(long, global = true)]
    pub state_path: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Show who the stored session belongs to and when it expires
    Show {
        /// Ask the backend to confirm the token
        #[arg(long)]
        verify: bool,
    },

    /// Refresh the stored session if it is about to expire
    Refresh {
        /// Refresh even if the session is still valid
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments for format command
#[derive(Parser, Debug)]
pub struct FormatArgs {
    /// Amounts to format
    #[arg(required = true, allow_negative_numbers = true)]
    pub amounts: Vec<String>,
}

/// Arguments for receipt command
#[derive(Parser, Debug)]
pub struct ReceiptArgs {
    /// Sale file (JSON)
    pub file: String,

    /// Output format (table, json, json-pretty, csv)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Save output to file
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for query command
#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Table name
    pub table: String,

    /// Columns to select
    #[arg(short, long, default_value = "*")]
    pub select: String,

    /// Filters as column=condition, e.g. stock=gt.0
    #[arg(short, long)]
    pub filter: Vec<String>,

    /// Order, e.g. nombre.asc
    #[arg(short, long)]
    pub order: Option<String>,

    /// Maximum rows
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Use the persisted session instead of the anon key
    #[arg(short, long)]
    pub authenticated: bool,
}

/// Arguments for insert command
#[derive(Parser, Debug)]
pub struct InsertArgs {
    /// Table name
    pub table: String,

    /// Row or array of rows as JSON
    #[arg(short, long, conflicts_with = "file")]
    pub data: Option<String>,

    /// Read the rows from a JSON file
    #[arg(long)]
    pub file: Option<String>,

    /// Use the persisted session instead of the anon key
    #[arg(short, long)]
    pub authenticated: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Target path
        #[arg(default_value = "kiosco.yaml")]
        path: String,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// List the environment variables the tool reads
    Env,
}
