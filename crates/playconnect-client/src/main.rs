use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use playconnect_client::bell::badge_label;
use playconnect_client::session::PasswordResetOutcome;
use playconnect_client::{load_config, AppContext, LoginOutcome, SessionEvent};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "playconnect", version, about = "PlayConnect notifications client")]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, env = "PLAYCONNECT_CONFIG")]
    config: Option<String>,

    /// Session file used when the config does not set `storage_path`
    #[arg(long, env = "PLAYCONNECT_STORAGE", default_value = ".playconnect-session.json")]
    storage: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PLAYCONNECT_PASSWORD")]
        password: String,
    },
    /// End the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Print the unread notification count
    Unread,
    /// Poll for notifications and print them as toasts until Ctrl-C
    Watch,
    /// Request a password reset email
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).context("Failed to load config")?;
    if config.storage_path.is_none() {
        config.storage_path = Some(cli.storage.clone());
    }
    tracing::debug!("Using API at {}", config.api_base_url);

    let ctx = AppContext::from_config(config);

    match cli.command {
        Commands::Login { email, password } => cmd_login(&ctx, &email, &password).await?,
        Commands::Logout => cmd_logout(&ctx).await?,
        Commands::Whoami => cmd_whoami(&ctx).await?,
        Commands::Unread => cmd_unread(&ctx).await?,
        Commands::Watch => cmd_watch(&ctx).await?,
        Commands::ForgotPassword { email } => cmd_forgot_password(&ctx, &email).await?,
    }

    Ok(())
}

async fn cmd_login(ctx: &AppContext, email: &str, password: &str) -> Result<()> {
    match ctx.session.login(email, password).await? {
        LoginOutcome::Success(session) => {
            println!("Logged in as {} ({})", session.display_name(), session.role);
            Ok(())
        }
        outcome => {
            if outcome.needs_verification() {
                eprintln!("Check your inbox for the verification email before logging in.");
            }
            bail!("{}", outcome.error_message().unwrap_or("Login failed"))
        }
    }
}

async fn cmd_logout(ctx: &AppContext) -> Result<()> {
    ctx.session.restore().await?;
    if ctx.session.logout() {
        println!("Logged out");
    } else {
        println!("Not logged in");
    }
    Ok(())
}

async fn cmd_whoami(ctx: &AppContext) -> Result<()> {
    match ctx.session.restore().await? {
        Some(session) => {
            println!("{} <{}>", session.display_name(), session.email);
            println!("User ID: {}", session.user_id);
            println!("Role:    {}", session.role);
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

async fn cmd_unread(ctx: &AppContext) -> Result<()> {
    let Some(session) = ctx.session.restore().await? else {
        bail!("Not logged in; run `playconnect login` first");
    };
    let count = ctx
        .api
        .unread_count(session.user_id)
        .await
        .context("Failed to fetch unread count")?;
    println!("{}", badge_label(count).unwrap_or_else(|| "0".to_string()));
    Ok(())
}

async fn cmd_watch(ctx: &AppContext) -> Result<()> {
    let Some(session) = ctx.session.restore().await? else {
        bail!("Not logged in; run `playconnect login` first");
    };

    let mut events = ctx.session.subscribe();
    let mut toasts = ctx.toasts.subscribe();
    let poller = ctx.spawn_poller(session.user_id);
    let bell = ctx.mount_bell(session.user_id).await;

    tracing::info!(
        "Watching notifications for {} ({} unread)",
        session.display_name(),
        bell.unread_count()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::LoggedOut { reason }) => {
                    tracing::warn!("Session ended ({:?}); log in again", reason);
                    break;
                }
                Ok(SessionEvent::LoggedIn(_)) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            toast = toasts.recv() => match toast {
                Ok(toast) => {
                    bell.refresh().await;
                    let badge = badge_label(bell.unread_count()).unwrap_or_else(|| "0".to_string());
                    match toast.body {
                        Some(body) => println!("[{}] {}: {}", badge, toast.title, body),
                        None => println!("[{}] {}", badge, toast.title),
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::debug!("Skipped {} toasts", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    poller.shutdown().await;
    Ok(())
}

async fn cmd_forgot_password(ctx: &AppContext, email: &str) -> Result<()> {
    match ctx.session.request_password_reset(email).await {
        PasswordResetOutcome::Sent => {
            println!("If an account exists for {}, a reset email is on its way.", email);
            Ok(())
        }
        PasswordResetOutcome::Rejected(message) => bail!("{}", message),
        PasswordResetOutcome::NetworkError => bail!("Network error"),
    }
}
