use std::process::ExitCode;

use clap::Parser;
use nbstore::cli::{Cli, Commands};
use nbstore::commands;
use nbstore::config::Config;
use nbstore::manager::StorageManager;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("NBSTORE_LOG").unwrap_or_else(|_| EnvFilter::new("nbstore=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::parse_from(["nbstore", "--help"]);
        return Ok(ExitCode::SUCCESS);
    };

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let store_config = &config.store;

    if matches!(command, Commands::Init) {
        let dir = commands::init(store_config)?;
        println!("Bucket ready: {}", dir.display());
        return Ok(ExitCode::SUCCESS);
    }

    let manager = commands::open(store_config)?;

    match command {
        Commands::List => {
            let models = manager.list_notebooks("")?;
            if models.is_empty() {
                eprintln!("No notebooks found.");
            }
            print!("{}", commands::format_listing(&models));
        }
        Commands::Names => {
            print!("{}", commands::format_names(&manager.notebook_names()));
        }
        Commands::Show { id, content } => {
            let model = manager.get_notebook(&id, "", content)?;
            println!("{}", serde_json::to_string_pretty(&model)?);
        }
        Commands::Save { id, file } => {
            let raw = commands::read_input(file.as_deref())?;
            let model = commands::save(&manager, &id, &raw)?;
            println!("Saved {}", model.id);
        }
        Commands::Import { id, file } => {
            let raw = commands::read_input(file.as_deref())?;
            println!("{}", commands::import(&manager, id.as_deref(), &raw)?);
        }
        Commands::Export { id } => {
            let (_, notebook) = commands::export(&manager, &id)?;
            println!("{}", serde_json::to_string_pretty(&notebook)?);
        }
        Commands::Rename { from, to } => {
            let model = commands::rename(&manager, &from, &to)?;
            println!("Renamed {from} -> {}", model.id);
        }
        Commands::Delete { id } => {
            manager.delete_notebook(&id, "")?;
            println!("Deleted {id}");
        }
        Commands::Exists { id } => {
            if manager.exists(&id)? {
                println!("yes");
            } else {
                println!("no");
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Info => println!("{}", manager.info_string()),
        Commands::Init => unreachable!("handled before opening the store"),
    }

    Ok(ExitCode::SUCCESS)
}
