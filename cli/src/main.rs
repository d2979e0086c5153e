use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dashboard::config::{API_URL_VAR, ConfigError, DashboardConfig, TOKEN_PATH_VAR};
use dashboard::net::error::ApiError;
use dashboard::net::http::HttpClient;
use dashboard::net::transport::{ReqwestTransport, Transport, TransportError};
use dashboard::net::types::{LoginCredentials, RegisterData};
use dashboard::state::auth::AuthSession;
use dashboard::state::token::{FileTokenStore, TokenStore, TokenStoreError};
use dashboard::util::auth::{NavigationGuard, RouteMeta, RouteRequirement};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("token storage failed: {0}")]
    TokenStore(#[from] TokenStoreError),
    #[error("http client setup failed: {0}")]
    Transport(#[from] TransportError),
    #[error("{action} failed ({code}): {source}", code = .source.code())]
    Failed { action: &'static str, source: ApiError },
    #[error("{0} was interrupted by a concurrent sign-out")]
    Interrupted(&'static str),
    #[error("not signed in; run `dashboard-cli login` first")]
    NotSignedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "dashboard-cli", about = "Admin dashboard auth client")]
struct Cli {
    #[arg(long, env = "DASHBOARD_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "DASHBOARD_TOKEN_PATH")]
    token_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and persist the token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "DASHBOARD_PASSWORD")]
        password: String,
    },
    /// Create an account (and sign in, unless DASHBOARD_REGISTER_MODE=account_only).
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "DASHBOARD_PASSWORD")]
        password: String,
    },
    Logout,
    /// Restore the session from the persisted token and print the profile.
    Whoami,
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long, env = "DASHBOARD_PASSWORD")]
        password: String,
    },
    /// Run the navigation guard for a route and print the decision.
    Navigate {
        path: String,
        #[arg(long, conflicts_with = "hide_for_auth")]
        requires_auth: bool,
        #[arg(long)]
        hide_for_auth: bool,
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    init_tracing();
    let cli = Cli::parse();

    let api_url = cli.api_url.clone();
    let token_path = cli.token_path.clone();
    let config = DashboardConfig::from_lookup(|key| match key {
        API_URL_VAR => api_url.clone(),
        TOKEN_PATH_VAR => token_path.as_ref().map(|p| p.display().to_string()),
        _ => std::env::var(key).ok(),
    })?;
    tracing::debug!(api_url = %config.api_url, token_path = %config.token_path.display(), "config loaded");

    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(&config.token_path)?);
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
    let http = Arc::new(HttpClient::new(config.api_url.clone(), transport, tokens));
    let session = AuthSession::new(http, config.register_mode);

    match cli.command {
        Command::Login { email, password } => {
            let ok = session.login(&LoginCredentials::new(email, password)).await;
            finish(&session, "login", ok)?;
            print_profile(&session)
        }
        Command::Register { email, password } => {
            let ok = session.register(&RegisterData::new(email, password)).await;
            finish(&session, "register", ok)?;
            if session.is_authenticated() {
                print_profile(&session)
            } else {
                println!("account created; sign in with `dashboard-cli login`");
                Ok(())
            }
        }
        Command::Logout => {
            session.logout().await;
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            session.initialize().await;
            if !session.is_authenticated() {
                return Err(CliError::NotSignedIn);
            }
            print_profile(&session)
        }
        Command::ForgotPassword { email } => {
            let ok = session.request_password_reset(&email).await;
            finish(&session, "password reset request", ok)?;
            println!("reset instructions sent to {email}");
            Ok(())
        }
        Command::ResetPassword { token, password } => {
            let ok = session.reset_password(&token, &password).await;
            finish(&session, "password reset", ok)?;
            println!("password updated");
            Ok(())
        }
        Command::Navigate { path, requires_auth, hide_for_auth, title } => {
            let requirement = if requires_auth {
                RouteRequirement::RequiresAuth
            } else if hide_for_auth {
                RouteRequirement::HideForAuth
            } else {
                RouteRequirement::Public
            };
            let meta = RouteMeta { title, requirement };
            let guard = NavigationGuard::new(session, config.routes);
            let decision = guard.check(&path, &meta).await;
            match (decision.location(guard.paths()), &meta.title) {
                (Some(location), _) => println!("redirect {location}"),
                (None, Some(title)) => println!("allow {path} ({title})"),
                (None, None) => println!("allow {path}"),
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn finish(session: &AuthSession, action: &'static str, ok: bool) -> Result<(), CliError> {
    if ok {
        return Ok(());
    }
    match session.last_error() {
        Some(source) => Err(CliError::Failed { action, source }),
        None => Err(CliError::Interrupted(action)),
    }
}

fn print_profile(session: &AuthSession) -> Result<(), CliError> {
    let user = session.user().ok_or(CliError::NotSignedIn)?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}
