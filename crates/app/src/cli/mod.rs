use carthorse_app::{config::LoggingConfig, telemetry};
use clap::{Parser, Subcommand};

mod cart;
mod db;

#[derive(Debug, Parser)]
#[command(name = "carthorse-app", about = "Carthorse cart service CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    logging: LoggingConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate(db::MigrateArgs),

    /// Inspect and merge carts
    Cart(cart::CartCommand),
}

impl Cli {
    pub(crate) async fn run(self) -> Result<(), String> {
        telemetry::init(&self.logging).map_err(|error| error.to_string())?;

        match self.command {
            Commands::Migrate(args) => db::migrate(args).await,
            Commands::Cart(command) => cart::run(command).await,
        }
    }
}
