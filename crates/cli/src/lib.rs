pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use storefront_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "storefront",
    about = "Storefront operator CLI",
    long_about = "Apply migrations, seed the demo catalog, manage products, \
                  and check runtime readiness.",
    after_help = "Examples:\n  storefront migrate\n  \
                  storefront product add --name Чехол --price 1500 --quantity 3\n  \
                  storefront --config shop.toml doctor --json"
)]
pub struct Cli {
    /// Configuration file; defaults to `storefront.toml` or `config/storefront.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Insert the demo catalog, skipping products that already exist")]
    Seed,
    #[command(about = "Inspect and edit the product catalog")]
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },
    #[command(about = "Validate config and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ProductAction {
    #[command(about = "Print every product as one JSON line, followed by the outcome")]
    List,
    #[command(about = "Create a product")]
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, help = "Price in whole roubles")]
        price: i64,
        #[arg(long, default_value_t = 0)]
        quantity: i64,
    },
    #[command(about = "Delete a product together with its purchases")]
    Remove {
        #[arg(long)]
        id: i64,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions::from_path(cli.config);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Product { action } => match action {
            ProductAction::List => commands::product::list(&options),
            ProductAction::Add { name, price, quantity } => {
                commands::product::add(&options, &name, price, quantity)
            }
            ProductAction::Remove { id } => commands::product::remove(&options, id),
        },
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json, &options) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
