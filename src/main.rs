use std::path::PathBuf;
use std::sync::Arc;

use agent_core::{FavoritesStore, JsonFileStore, KeyValueStore, SettingsStore};
use ai_agent::{is_client_side_js_task, SettingsPatch};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding persisted settings and favorites
    #[arg(short, long, env = "BROWSER_AGENT_DATA_DIR", default_value = ".browser-agent")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether a task would take the JavaScript fast path
    Classify {
        task: String,
    },
    /// Inspect or change agent settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Manage saved code favorites
    Favorites {
        #[command(subcommand)]
        command: FavoritesCommand,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        allow_code_generation: Option<bool>,
        #[arg(long)]
        fast_js_mode: Option<bool>,
        #[arg(long)]
        max_steps: Option<usize>,
        #[arg(long)]
        planning_interval: Option<usize>,
        #[arg(long)]
        max_actions_per_step: Option<usize>,
    },
}

#[derive(Subcommand)]
enum FavoritesCommand {
    /// List favorites, newest first
    List {
        /// Only favorites whose pattern applies to this URL
        #[arg(long)]
        url: Option<String>,
    },
    Show {
        id: u64,
    },
    Add {
        name: String,
        code: String,
        url_pattern: String,
    },
    Update {
        id: u64,
        name: String,
        code: String,
        url_pattern: String,
    },
    Remove {
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ai_agent=debug,agent_core=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&cli.data_dir)?);

    match cli.command {
        Commands::Classify { task } => {
            let settings = SettingsStore::new(store).get_settings().await?;
            let js_only = is_client_side_js_task(&task);
            println!("client-side JavaScript task: {js_only}");
            println!(
                "fast path taken: {}",
                js_only && settings.fast_js_mode_enabled()
            );
        }
        Commands::Settings { command } => {
            let settings = SettingsStore::new(store);
            let current = match command {
                SettingsCommand::Show => settings.get_settings().await?,
                SettingsCommand::Set {
                    allow_code_generation,
                    fast_js_mode,
                    max_steps,
                    planning_interval,
                    max_actions_per_step,
                } => {
                    settings
                        .update_settings(&SettingsPatch {
                            allow_code_generation,
                            fast_js_mode,
                            max_steps,
                            planning_interval,
                            max_actions_per_step,
                        })
                        .await?
                }
            };
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        Commands::Favorites { command } => run_favorites(FavoritesStore::new(store), command).await?,
    }

    Ok(())
}

async fn run_favorites(favorites: FavoritesStore, command: FavoritesCommand) -> Result<()> {
    match command {
        FavoritesCommand::List { url } => {
            let list = match url {
                Some(url) => favorites.get_favorites_by_url(&url).await?,
                None => favorites.get_all_favorites().await?,
            };
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        FavoritesCommand::Show { id } => match favorites.get_favorite_by_id(id).await? {
            Some(favorite) => println!("{}", serde_json::to_string_pretty(&favorite)?),
            None => bail!("no favorite with id {id}"),
        },
        FavoritesCommand::Add {
            name,
            code,
            url_pattern,
        } => {
            let favorite = favorites.add_favorite(&name, &code, &url_pattern).await?;
            println!("Saved favorite {}", favorite.id);
        }
        FavoritesCommand::Update {
            id,
            name,
            code,
            url_pattern,
        } => match favorites
            .update_favorite(id, &name, &code, &url_pattern)
            .await?
        {
            Some(favorite) => println!("Updated favorite {}", favorite.id),
            None => bail!("no favorite with id {id}"),
        },
        FavoritesCommand::Remove { id } => {
            favorites.remove_favorite(id).await?;
            println!("Removed favorite {id}");
        }
    }
    Ok(())
}
