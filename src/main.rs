//! `blogroll` command-line front end

use anyhow::Context;
use clap::{Parser, Subcommand};

use blogroll_lib::commands;
use blogroll_lib::config::AppConfig;
use blogroll_lib::App;

/// Log in to a blogging backend and keep the session between runs.
#[derive(Parser)]
#[command(name = "blogroll", version, about, long_about = None)]
struct Cli {
    /// Backend base URL (overrides the config file).
    #[arg(long, global = true, env = "BLOGROLL_API_URL")]
    api_url: Option<String>,

    /// Do not persist the login in the OS keychain.
    #[arg(long, global = true)]
    no_remember: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with email and password.
    Login {
        /// Account email.
        #[arg(long)]
        email: String,

        /// Password (prompted when omitted).
        #[arg(long, env = "BLOGROLL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log out and forget the persisted login.
    Logout,

    /// Show the logged-in user, restoring the previous login if needed.
    Whoami,

    /// Print the session status as JSON.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    blogroll_lib::init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    if cli.no_remember {
        config.remember_login = false;
    }

    let app = App::new(config).context("Failed to create API client")?;

    let result = run(&app, cli.command).await;
    app.shutdown();
    result
}

async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = match password {
                Some(password) => password,
                None => dialoguer::Password::new()
                    .with_prompt("Password")
                    .interact()
                    .context("Failed to read password")?,
            };
            let profile = commands::login(app, &email, &password)
                .await
                .map_err(anyhow::Error::msg)?;
            println!("Logged in as {}", profile.display_name());
        }
        Command::Logout => {
            commands::logout(app).await.map_err(anyhow::Error::msg)?;
            println!("Logged out");
        }
        Command::Whoami => match commands::whoami(app).await.map_err(anyhow::Error::msg)? {
            Some(profile) => {
                println!("{} <{}>", profile.display_name(), profile.email.unwrap_or_default())
            }
            None => println!("Not logged in"),
        },
        Command::Status => {
            let status = commands::status(app).await.map_err(anyhow::Error::msg)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
