use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetdesk::config::Config;
use fleetdesk::crypto::token;
use fleetdesk::maps;
use fleetdesk::middleware_layer::guard::{GuardView, RenderEnv};
use fleetdesk::services::session::Portal;
use fleetdesk::state::{AppState, PortalContext};
use fleetdesk::validation::auth::LoginCredentials;

/// Command-line front end for the fleet dashboard and client portal.
#[derive(Debug, Parser)]
#[command(name = "fleetdesk", version, about)]
struct Cli {
    /// Which session to act on.
    #[arg(long, value_enum, default_value_t = PortalArg::Admin, global = true)]
    portal: PortalArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PortalArg {
    Admin,
    Client,
}

impl From<PortalArg> for Portal {
    fn from(arg: PortalArg) -> Self {
        match arg {
            PortalArg::Admin => Portal::Admin,
            PortalArg::Client => Portal::Client,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and persist the session.
    Login {
        /// Account email.
        #[arg(long)]
        email: String,
        /// Account password.
        #[arg(long, env = "FLEETDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the session.
    Logout,
    /// Show the current session.
    Status,
    /// Open a view and print the JSON behind it.
    Fetch {
        /// The view route, e.g. `/trips` or `/client/invoices`.
        route: String,
        /// The API path to read; defaults to the route.
        #[arg(long)]
        api: Option<String>,
    },
    /// Resolve a maps link to coordinates.
    Locate {
        /// A Google Maps link or a `lat,lng` pair.
        link: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    tracing::debug!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).context("Failed to initialize sessions")?;
    let portal = state.portal(cli.portal.into());

    match cli.command {
        Command::Login { email, password } => login(portal, email, password).await,
        Command::Logout => {
            portal.auth.logout().await;
            println!("Signed out of the {} portal", portal.store.profile().portal);
            Ok(())
        }
        Command::Status => {
            status(portal);
            Ok(())
        }
        Command::Fetch { route, api } => fetch(portal, &route, api.as_deref()).await,
        Command::Locate { link } => {
            let coordinates = maps::resolve_maps_link(&state.http, &link)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", coordinates);
            Ok(())
        }
    }
}

async fn login(portal: &PortalContext, email: String, password: String) -> anyhow::Result<()> {
    let credentials = LoginCredentials::new(email, password);
    match portal.auth.login(&credentials).await {
        Ok(session) => {
            let who = session
                .user
                .and_then(|user| user.email.or(user.name))
                .unwrap_or_else(|| credentials.email.clone());
            println!("Signed in to the {} portal as {}", portal.store.profile().portal, who);
            Ok(())
        }
        Err(e) => bail!(e.user_message()),
    }
}

fn status(portal: &PortalContext) {
    let store = &portal.store;
    let session = store.session();
    println!("portal:        {}", store.profile().portal);
    println!("authenticated: {}", store.is_authenticated());

    if let Some(user) = session.user {
        println!("user:          {}", user.email.or(user.name).unwrap_or_else(|| "-".into()));
        println!("role:          {}", user.role.unwrap_or_else(|| "-".into()));
    }
    if let Some(exp) = session
        .token
        .as_deref()
        .and_then(token::decode)
        .and_then(|claims| claims.exp)
        .and_then(|exp| chrono::DateTime::from_timestamp(exp as i64, 0))
    {
        println!("expires:       {}", exp.to_rfc3339());
    }
}

async fn fetch(portal: &PortalContext, route: &str, api: Option<&str>) -> anyhow::Result<()> {
    if portal.store.profile().is_protected(route) {
        let mut guard = portal.guard();
        match guard.render(RenderEnv::Interactive) {
            GuardView::Content => {}
            GuardView::Redirect(login_route) => {
                bail!("Sign in required: open {} (fleetdesk --portal {} login)", login_route, portal.store.profile().portal)
            }
            GuardView::Placeholder => bail!("Session state is not available yet"),
        }
    }

    let path = api.unwrap_or(route);
    let value: sonic_rs::Value = portal
        .api
        .get(path)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("{}", sonic_rs::to_string_pretty(&value)?);
    Ok(())
}
