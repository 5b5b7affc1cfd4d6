//! CookMaster CLI - browse, buy and manage recipes from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the session is kept under COOKMASTER_STATE_DIR)
//! cookmaster login -e koki@cookmaster.id
//!
//! # Browse and buy
//! cookmaster recipes list --search rendang
//! cookmaster cart add 6f1c1d2e-8f6a-4a55-9a57-0e5f3c1b2a90
//! cookmaster cart checkout
//!
//! # Publish a recipe with a cover image and a PDF
//! cookmaster recipes add -t "Rendang" -p "Rp 25.000" --image cover.jpg --document rendang.pdf
//! ```
//!
//! # Commands
//!
//! - `login`, `register`, `logout`, `whoami` - Account
//! - `recipes` - List, show, add, edit and delete recipes
//! - `cart` - List, add, remove and check out
//! - `buy` - Buy one recipe directly
//! - `purchases` - Purchase history
//! - `home` - Catalog statistics

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cookmaster_client::{AppState, ClientConfig};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "cookmaster")]
#[command(author, version, about = "CookMaster recipe marketplace")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "COOKMASTER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    Register {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password (at least 6 characters)
        #[arg(short, long, env = "COOKMASTER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget local state
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Browse and manage recipes
    Recipes {
        #[command(subcommand)]
        action: RecipeAction,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Buy a single recipe right away
    Buy {
        /// Recipe ID
        id: String,
    },
    /// Show purchase history
    Purchases {
        /// Include recipe title and description
        #[arg(long)]
        details: bool,
    },
    /// Show catalog statistics and the newest recipes
    Home,
}

#[derive(Subcommand)]
enum RecipeAction {
    /// List recipes, newest first
    List {
        /// Only recipes whose title or description contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show one recipe
    Show {
        /// Recipe ID
        id: String,
    },
    /// Publish a new recipe
    Add {
        /// Title
        #[arg(short, long)]
        title: String,

        /// Price, e.g. `25000` or `Rp 25.000`
        #[arg(short, long)]
        price: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Ingredient line (repeatable)
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,

        /// Preparation step (repeatable)
        #[arg(short, long = "step")]
        steps: Vec<String>,

        /// Cover image (JPEG)
        #[arg(long)]
        image: Option<PathBuf>,

        /// Recipe document (PDF)
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// Change fields of a recipe
    Edit {
        /// Recipe ID
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New price
        #[arg(short, long)]
        price: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// Replace ingredients (repeatable)
        #[arg(short, long = "ingredient")]
        ingredients: Option<Vec<String>>,

        /// Replace steps (repeatable)
        #[arg(short, long = "step")]
        steps: Option<Vec<String>>,

        /// Replace the cover image
        #[arg(long)]
        image: Option<PathBuf>,

        /// Replace the recipe document
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// Delete a recipe and its attachments
    Delete {
        /// Recipe ID
        id: String,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart lines and the total
    List,
    /// Add a recipe to the cart
    Add {
        /// Recipe ID
        id: String,
    },
    /// Remove a cart line
    Remove {
        /// Cart line ID (see `cart list`)
        line: String,
    },
    /// Buy everything in the cart
    Checkout,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cookmaster_client=info,cookmaster_cli=info".into());

    // Logs go to stderr so command output stays pipeable
    let json = std::env::var("COOKMASTER_LOG_JSON").is_ok();
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer =
        (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let sentry_guard = init_sentry(&config);
    init_tracing();

    let state = AppState::new(config);
    let printer = commands::spawn_notice_printer(state.notifier());

    let result = run(cli, &state).await;

    // Dropping the last state handle closes the notice channel
    drop(state);
    let _ = printer.await;

    if let Err(e) = result {
        eprintln!("error: {}", e.user_message());
        tracing::debug!("Command failed: {e}");
        // process::exit skips destructors, so flush Sentry first
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, state: &AppState) -> Result<(), CliError> {
    state.restore().await?;

    match cli.command {
        Commands::Login { email, password } => commands::auth::login(state, &email, &password).await,
        Commands::Register { email, password } => {
            commands::auth::register(state, &email, &password).await
        }
        Commands::Logout => commands::auth::logout(state).await,
        Commands::Whoami => commands::auth::whoami(state).await,
        Commands::Recipes { action } => match action {
            RecipeAction::List { search } => commands::recipes::list(state, search.as_deref()).await,
            RecipeAction::Show { id } => commands::recipes::show(state, &id).await,
            RecipeAction::Add {
                title,
                price,
                description,
                ingredients,
                steps,
                image,
                document,
            } => {
                let form = commands::recipes::RecipeForm {
                    title: Some(title),
                    price: Some(price),
                    description: Some(description),
                    ingredients: Some(ingredients),
                    steps: Some(steps),
                    image,
                    document,
                };
                commands::recipes::add(state, form).await
            }
            RecipeAction::Edit {
                id,
                title,
                price,
                description,
                ingredients,
                steps,
                image,
                document,
            } => {
                let form = commands::recipes::RecipeForm {
                    title,
                    price,
                    description,
                    ingredients,
                    steps,
                    image,
                    document,
                };
                commands::recipes::edit(state, &id, form).await
            }
            RecipeAction::Delete { id } => commands::recipes::delete(state, &id).await,
        },
        Commands::Cart { action } => match action {
            CartAction::List => commands::cart::list(state).await,
            CartAction::Add { id } => commands::cart::add(state, &id).await,
            CartAction::Remove { line } => commands::cart::remove(state, &line).await,
            CartAction::Checkout => commands::cart::checkout(state).await,
        },
        Commands::Buy { id } => commands::purchases::buy(state, &id).await,
        Commands::Purchases { details } => commands::purchases::history(state, details).await,
        Commands::Home => commands::home::show(state).await,
    }
}
