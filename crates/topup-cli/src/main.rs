//! Top-up CLI - sign in, browse the catalogue and follow transactions live.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use topup_cli::ClientContext;
use topup_config::{init_logging, Config, Paths};
use tracing::debug;

/// Top-up CLI - storefront session and live notifications.
#[derive(Parser)]
#[command(name = "topup")]
#[command(about = "Top-up storefront client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and session files. Defaults to ~/.topup
    #[arg(long, global = true, env = "TOPUP_HOME")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email; prompted when omitted
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        phone: String,
        /// Full name
        #[arg(short, long)]
        name: String,
    },

    /// Logout and clear session
    Logout,

    /// Validate the stored session and show the signed-in user
    Whoami,

    /// List games
    Games {
        /// Only games in this category
        #[arg(short, long)]
        category: Option<String>,
        /// Only popular games
        #[arg(long, conflicts_with = "category")]
        popular: bool,
    },

    /// List your transactions, or show one
    Transactions {
        /// Transaction ID
        id: Option<String>,
    },

    /// Show stored notifications
    Notifications {
        /// Mark every notification as read
        #[arg(long)]
        mark_read: bool,
        /// Delete all notifications
        #[arg(long, conflicts_with = "mark_read")]
        clear: bool,
    },

    /// Keep the session alive and print live notifications
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level);
    debug!(base_dir = %paths.base_dir().display(), "Configuration loaded");

    let context = ClientContext::open(&paths, config)?;
    let format = &cli.format;

    match cli.command {
        Commands::Login { email } => commands::login(&context, email, format).await?,
        Commands::Register { email, phone, name } => {
            commands::register(&context, email, phone, name, format).await?
        }
        Commands::Logout => commands::logout(&context, format).await?,
        Commands::Whoami => commands::whoami(&context, format).await?,
        Commands::Games { category, popular } => {
            commands::games(&context, category, popular, format).await?
        }
        Commands::Transactions { id } => commands::transactions(&context, id, format).await?,
        Commands::Notifications { mark_read, clear } => {
            commands::notifications(&context, mark_read, clear, format)?
        }
        Commands::Watch => commands::watch(&context, format).await?,
    }

    Ok(())
}
