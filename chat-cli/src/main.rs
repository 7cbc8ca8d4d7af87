//! # flowchat
//!
//! Terminal client for a FlowChat server.
//!
//! ## Commands
//!
//! - `register`: Create an account
//! - `login`: Log in and remember the session
//! - `logout`: End the session
//! - `whoami`: Show the logged-in user
//! - `send`: Post a message
//! - `edit`: Rewrite one of your messages
//! - `delete`: Delete one of your messages
//! - `history`: Print the conversation
//! - `users`: List users online
//! - `watch`: Follow the conversation live
//! - `theme`: Show or change the display theme
//!
//! ## Example
//!
//! ```bash
//! flowchat --server http://localhost:8000 register alice --email alice@example.com
//! flowchat send "Hello, everyone!"
//! flowchat history --search hello
//! flowchat watch
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{auth, delete, edit, history, send, theme, users, watch};
use config::Settings;
use flowchat_client::{ChatClient, ClientError, FileStore, HttpApi, HttpApiConfig};

/// Terminal client for FlowChat.
#[derive(Parser, Debug)]
#[command(name = "flowchat")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the saved session and config.toml
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Server origin (overrides config.toml)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account and log in
    Register {
        /// Username (3-50 characters)
        username: String,

        /// Optional email address
        #[arg(long, short)]
        email: Option<String>,

        /// Password (will prompt if not provided)
        #[arg(long, short)]
        password: Option<String>,
    },

    /// Log in and remember the session
    Login {
        /// Username
        username: String,

        /// Password (will prompt if not provided)
        #[arg(long, short)]
        password: Option<String>,
    },

    /// End the session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Post a message
    Send {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Rewrite one of your messages
    Edit {
        /// Message id or unique id prefix
        id: String,

        /// New text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Delete one of your messages
    Delete {
        /// Message id or unique id prefix
        id: String,
    },

    /// Print the conversation
    History {
        /// Only show messages whose text or author contains this
        #[arg(long, short)]
        search: Option<String>,
    },

    /// List users online
    Users,

    /// Follow the conversation live
    Watch,

    /// Show or change the display theme
    Theme {
        /// light, dark or toggle
        choice: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(client_err) = err.downcast_ref::<ClientError>() {
                eprintln!("{}", commands::hint(client_err.class()));
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists and is private
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir)
        .await
        .context("Failed to restrict data directory")?;

    let settings = Settings::load(&data_dir).await?;
    let server = cli.server.unwrap_or_else(|| settings.server.url.clone());
    let api = HttpApi::with_config(
        &server,
        HttpApiConfig {
            request_timeout: settings.request_timeout(),
        },
    )
    .context("Failed to build HTTP client")?;
    let storage = FileStore::new(data_dir.join(config::STATE_FILE));
    let client = ChatClient::new(settings.client_config(), api, storage);
    tracing::debug!(%server, data_dir = %data_dir.display(), "client ready");

    let mut out = std::io::stdout();
    match cli.command {
        Commands::Register {
            username,
            email,
            password,
        } => {
            let password = commands::password_or_prompt(password, "Choose a password: ")?;
            auth::register(&client, &mut out, &username, email.as_deref(), &password).await?;
        }
        Commands::Login { username, password } => {
            let password = commands::password_or_prompt(password, "Password: ")?;
            auth::login(&client, &mut out, &username, &password).await?;
        }
        Commands::Logout => auth::logout(&client, &mut out).await?,
        Commands::Whoami => auth::whoami(&client, &mut out).await?,
        Commands::Send { text } => send::run(&client, &mut out, &text.join(" ")).await?,
        Commands::Edit { id, text } => {
            edit::run(&client, &mut out, &id, &text.join(" ")).await?;
        }
        Commands::Delete { id } => delete::run(&client, &mut out, &id).await?,
        Commands::History { search } => {
            history::run(&client, &mut out, search.as_deref()).await?;
        }
        Commands::Users => users::run(&client, &mut out).await?,
        Commands::Watch => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            watch::run(Arc::new(client), &mut out, shutdown).await?;
        }
        Commands::Theme { choice } => theme::run(&client, &mut out, choice.as_deref()).await?,
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for flowchat.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "flowchat", "flowchat")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
