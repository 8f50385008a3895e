use anyhow::Result;
use clap::{Parser, Subcommand};
use prodent_client::SessionSignal;
use tokio::sync::broadcast::error::TryRecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod auth;
mod config;
mod dashboard;

use app::App;
use dashboard::{ClientAction, ProsthetistAction, StageAction};

#[derive(Parser)]
#[command(name = "prodent")]
#[command(about = "Dental prosthetics dashboard - clients, prosthetists and workflow stages")]
#[command(version)]
struct Cli {
    /// Service URL (overrides environment and config)
    #[arg(long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    #[command(flatten)]
    Session(SessionCommand),
}

/// Commands that need a connection and a restored session
#[derive(Subcommand)]
enum SessionCommand {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and its company
    Signup {
        #[arg(long)]
        email: String,
        /// Name of the clinic or laboratory
        #[arg(long)]
        company: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show current login status
    Whoami,
    /// Change the account password
    Password,
    /// Show dashboard counts
    Metrics,
    /// Manage clients
    Clients {
        #[command(subcommand)]
        action: ClientAction,
    },
    /// Manage prosthetists and laboratories
    Prosthetists {
        #[command(subcommand)]
        action: ProsthetistAction,
    },
    /// Manage workflow stages
    Stages {
        #[command(subcommand)]
        action: StageAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (url, anon_key, request_timeout_secs, bootstrap_timeout_ms, search_debounce_ms)
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Show all configuration
    Show,
    /// Get the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prodent=info,prodent_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => handle_config_command(action),
        Commands::Session(command) => {
            let config = config::Config::load()?;
            let app = App::start(&config, cli.url).await?;
            let mut signals = app.store.signals();

            let result = run(&app, command).await;

            loop {
                match signals.try_recv() {
                    Ok(SessionSignal::Expired { notice, redirect_to }) => {
                        eprintln!("\x1b[33m🔐 {}\x1b[0m", notice);
                        tracing::debug!("Session reset, login at {}", redirect_to);
                        eprintln!("   Run '\x1b[1mprodent login\x1b[0m' to authenticate.");
                    }
                    Err(TryRecvError::Lagged(skipped)) => {
                        tracing::debug!("Skipped {} session signals", skipped);
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }

            app.shutdown().await;
            result
        }
    }
}

async fn run(app: &App, command: SessionCommand) -> Result<()> {
    match command {
        SessionCommand::Login { email } => auth::login(app, email).await,
        SessionCommand::Signup { email, company } => auth::signup(app, email, company).await,
        SessionCommand::Logout => auth::logout(app).await,
        SessionCommand::Whoami => auth::whoami(app).await,
        SessionCommand::Password => auth::password(app).await,
        SessionCommand::Metrics => dashboard::metrics(app).await,
        SessionCommand::Clients { action } => dashboard::clients(app, action).await,
        SessionCommand::Prosthetists { action } => dashboard::prosthetists(app, action).await,
        SessionCommand::Stages { action } => dashboard::stages(app, action).await,
    }
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            let mut config = config::Config::load().unwrap_or_default();
            match key.as_str() {
                "url" => config.remote.url = Some(value),
                "anon_key" => config.remote.anon_key = Some(value),
                "request_timeout_secs" => config.remote.request_timeout_secs = Some(value.parse()?),
                "bootstrap_timeout_ms" => config.session.bootstrap_timeout_ms = value.parse()?,
                "search_debounce_ms" => config.session.search_debounce_ms = value.parse()?,
                _ => anyhow::bail!(
                    "Unknown config key: {}. Valid keys: url, anon_key, request_timeout_secs, bootstrap_timeout_ms, search_debounce_ms",
                    key
                ),
            }
            config.save()?;
            println!("Configuration saved");
        }
        ConfigAction::Get { key } => {
            let config = config::Config::load()?;
            let value = match key.as_str() {
                "url" => config.remote.url.unwrap_or_default(),
                "anon_key" => config.remote.anon_key.map(|_| "****").unwrap_or_default().to_string(),
                "request_timeout_secs" => config
                    .remote
                    .request_timeout_secs
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                "bootstrap_timeout_ms" => config.session.bootstrap_timeout_ms.to_string(),
                "search_debounce_ms" => config.session.search_debounce_ms.to_string(),
                _ => anyhow::bail!("Unknown config key: {}", key),
            };
            println!("{}", value);
        }
        ConfigAction::Show => {
            let config = config::Config::load()?;
            println!("url: {}", config.remote.url.unwrap_or_default());
            println!("anon_key: {}", config.remote.anon_key.map(|_| "****").unwrap_or_default());
            println!(
                "request_timeout_secs: {}",
                config.remote.request_timeout_secs.map(|s| s.to_string()).unwrap_or_default()
            );
            println!("bootstrap_timeout_ms: {}", config.session.bootstrap_timeout_ms);
            println!("search_debounce_ms: {}", config.session.search_debounce_ms);
        }
        ConfigAction::Path => {
            let path = config::Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
