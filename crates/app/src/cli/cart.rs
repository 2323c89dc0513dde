use carthorse::cart::{CartUuid, Owner, SessionKey, UserUuid};
use carthorse_app::{config::AppConfig, context::AppContext, domain::carts::ValidationMode};
use clap::{ArgGroup, Args, Subcommand};
use serde::Serialize;

#[derive(Debug, Args)]
pub(crate) struct CartCommand {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: CartSubcommand,
}

#[derive(Debug, Subcommand)]
enum CartSubcommand {
    /// Print a cart as JSON
    Show(ShowArgs),

    /// Merge a session's cart into a user's cart
    Merge(MergeArgs),
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("owner").required(true).args(["user", "session"])))]
struct ShowArgs {
    /// Cart to show
    #[arg(long)]
    cart: CartUuid,

    /// Owning user
    #[arg(long)]
    user: Option<UserUuid>,

    /// Owning anonymous session
    #[arg(long)]
    session: Option<String>,
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// User logging in
    #[arg(long)]
    user: UserUuid,

    /// Session whose cart is merged
    #[arg(long)]
    session: String,

    /// Skip the user existence check
    #[arg(long)]
    trusted: bool,
}

pub(crate) async fn run(command: CartCommand) -> Result<(), String> {
    let context = AppContext::from_config(&command.config)
        .await
        .map_err(|error| format!("failed to initialise: {error}"))?;

    match command.command {
        CartSubcommand::Show(args) => show(&context, args).await,
        CartSubcommand::Merge(args) => merge(&context, args).await,
    }
}

async fn show(context: &AppContext, args: ShowArgs) -> Result<(), String> {
    let owner = match (args.user, args.session) {
        (Some(user), _) => Owner::User(user),
        (None, Some(session)) => Owner::Session(session_key(session)?),
        (None, None) => return Err("either --user or --session is required".to_string()),
    };

    let view = context
        .carts
        .get_cart(args.cart, &owner)
        .await
        .map_err(|error| format!("failed to load cart: {error}"))?;

    print_json(&view)
}

async fn merge(context: &AppContext, args: MergeArgs) -> Result<(), String> {
    let mode = if args.trusted {
        ValidationMode::Trusted
    } else {
        ValidationMode::Strict
    };

    let merged = context
        .carts
        .merge_on_login(args.user, &session_key(args.session)?, mode)
        .await
        .map_err(|error| format!("failed to merge carts: {error}"))?;

    print_json(&merged)
}

fn session_key(key: String) -> Result<SessionKey, String> {
    SessionKey::new(key).map_err(|error| format!("invalid session key: {error}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|error| format!("failed to render JSON: {error}"))?;

    println!("{json}");

    Ok(())
}
