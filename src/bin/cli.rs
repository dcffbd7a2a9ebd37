//! CLI binary for mica: manage models, saved chats and memory.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use mica::session::export_as_text;
use mica::{App, MicaConfig, MicaError, ProgressEvent};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Mica: on-device chat client core.
#[derive(Parser)]
#[command(name = "mica", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Model catalog and downloads.
    #[command(subcommand)]
    Models(ModelsCommand),

    /// Saved chat sessions.
    #[command(subcommand)]
    Sessions(SessionsCommand),

    /// Memory folders and blocks.
    #[command(subcommand)]
    Memory(MemoryCommand),

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List catalog models with their download state.
    List,
    /// Download (or resume) a model. Ctrl-C cancels and keeps partial data.
    Download { id: String },
    /// Delete a downloaded model.
    Delete { id: String },
    /// Select the active model.
    Use { id: String },
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// List sessions, most recent first.
    List,
    /// Print a session transcript.
    Show { id: String },
    /// Export a session as plain text.
    Export {
        id: String,
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a session.
    Delete { id: String },
    /// Search titles and message text.
    Search { query: String },
    /// Rename a session.
    Rename { id: String, title: String },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// List folders and blocks.
    List,
    /// Create a folder.
    AddFolder {
        name: String,
        #[arg(long, default_value = "folder")]
        icon: String,
        #[arg(long, default_value = "blue")]
        color: String,
    },
    /// Add a block to a folder.
    AddBlock {
        folder: String,
        title: String,
        content: String,
    },
    /// Toggle a folder, or one of its blocks with `--block`.
    Toggle {
        folder: String,
        #[arg(long)]
        block: Option<String>,
    },
    /// Delete a folder, or one of its blocks with `--block`.
    Delete {
        folder: String,
        #[arg(long)]
        block: Option<String>,
    },
    /// Print the context injected into prompts.
    Context,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mica=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(MicaConfig::default_config_path);

    let mut config = if config_path.exists() {
        MicaConfig::from_file(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        MicaConfig::default()
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    if let Command::InitConfig { force } = cli.command {
        return init_config(&config, &config_path, force);
    }

    let app = App::open(config)?;
    match cli.command {
        Command::Models(cmd) => run_models(&app, cmd).await,
        Command::Sessions(cmd) => run_sessions(&app, cmd),
        Command::Memory(cmd) => run_memory(&app, cmd),
        Command::InitConfig { .. } => Ok(()),
    }
}

fn init_config(config: &MicaConfig, path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config.save_to_file(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn run_models(app: &App, cmd: ModelsCommand) -> anyhow::Result<()> {
    let downloads = app.downloads();
    match cmd {
        ModelsCommand::List => {
            let active = app.active_model().get();
            for model in app.catalog().iter() {
                let marker = if active.as_deref() == Some(model.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {:<22} {:<9} {:>6} MB  ctx {:>6}  {}",
                    model.id,
                    model.category.to_string(),
                    model.size_mb,
                    model.context_length,
                    downloads.state(&model.id)
                );
            }
        }
        ModelsCommand::Download { id } => {
            downloads.set_progress_callback(Box::new(print_progress));

            let canceller = downloads.clone();
            let cancel_id = id.clone();
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!(model = %cancel_id, "interrupt received, cancelling download");
                    let _ = canceller.cancel_download(&cancel_id);
                }
            });

            let result = downloads.start_download(&id).await;
            ctrl_c.abort();
            eprintln!();
            match result {
                Ok(path) => println!("{id} ready at {}", path.display()),
                Err(MicaError::Cancelled(_)) => {
                    println!("{id} cancelled; run the same command again to resume");
                }
                Err(e) => return Err(e.into()),
            }
        }
        ModelsCommand::Delete { id } => {
            downloads.delete_model(&id)?;
            println!("Deleted {id}");
        }
        ModelsCommand::Use { id } => {
            if !downloads.is_downloaded(&id) {
                anyhow::bail!("model '{id}' is not downloaded");
            }
            app.active_model().set(Some(id.clone()))?;
            println!("Active model: {id}");
        }
    }
    Ok(())
}

fn print_progress(event: ProgressEvent) {
    match event {
        ProgressEvent::DownloadStarted {
            model_id,
            resumed_from,
            ..
        } if resumed_from > 0 => {
            eprintln!("Resuming {model_id} from {} MB", resumed_from / 1_000_000);
        }
        ProgressEvent::DownloadProgress {
            model_id,
            bytes_downloaded,
            fraction,
            ..
        } => {
            eprint!(
                "\r{model_id}: {:5.1}% ({} MB)",
                fraction * 100.0,
                bytes_downloaded / 1_000_000
            );
            let _ = std::io::stderr().flush();
        }
        ProgressEvent::DownloadFailed { model_id, message } => {
            eprintln!("\n{model_id} failed: {message}");
        }
        _ => {}
    }
}

fn run_sessions(app: &App, cmd: SessionsCommand) -> anyhow::Result<()> {
    let sessions = app.sessions();
    match cmd {
        SessionsCommand::List => print_summaries(&sessions.list()),
        SessionsCommand::Search { query } => print_summaries(&sessions.search(&query)),
        SessionsCommand::Show { id } | SessionsCommand::Export { id, output: None } => {
            let session = sessions
                .load(&id)
                .with_context(|| format!("session '{id}' not found"))?;
            print!("{}", export_as_text(&session));
        }
        SessionsCommand::Export {
            id,
            output: Some(path),
        } => {
            let session = sessions
                .load(&id)
                .with_context(|| format!("session '{id}' not found"))?;
            std::fs::write(&path, export_as_text(&session))
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
        SessionsCommand::Delete { id } => {
            sessions.delete(&id)?;
            println!("Deleted {id}");
        }
        SessionsCommand::Rename { id, title } => {
            let session = sessions.rename(&id, &title)?;
            println!("{} -> {}", session.id, session.title.unwrap_or_default());
        }
    }
    Ok(())
}

fn print_summaries(summaries: &[mica::SessionSummary]) {
    if summaries.is_empty() {
        println!("No sessions.");
        return;
    }
    for s in summaries {
        println!(
            "{}  {}  {:>3} msgs  {}",
            s.id,
            s.updated_at.format("%Y-%m-%d %H:%M"),
            s.message_count,
            s.title.as_deref().unwrap_or(mica::session::PLACEHOLDER_TITLE)
        );
    }
}

fn run_memory(app: &App, cmd: MemoryCommand) -> anyhow::Result<()> {
    let memory = app.memory();
    match cmd {
        MemoryCommand::List => {
            for folder in memory.folders() {
                let state = if folder.enabled { "on " } else { "off" };
                println!("[{state}] {} {} ({})", folder.id, folder.name, folder.icon);
                for block in &folder.blocks {
                    let state = if block.enabled { "on " } else { "off" };
                    println!("    [{state}] {} {}: {}", block.id, block.title, block.content);
                }
            }
            println!(
                "{} enabled blocks, ~{} tokens",
                memory.enabled_block_count(),
                memory.total_enabled_tokens()
            );
        }
        MemoryCommand::AddFolder { name, icon, color } => {
            let folder = memory.create_folder(&name, &icon, &color)?;
            println!("{}", folder.id);
        }
        MemoryCommand::AddBlock {
            folder,
            title,
            content,
        } => {
            let block = memory
                .add_block(&folder, &title, &content)?
                .with_context(|| format!("folder '{folder}' not found"))?;
            println!("{}", block.id);
        }
        MemoryCommand::Toggle { folder, block } => {
            let changed = match &block {
                Some(block) => memory.toggle_block_enabled(&folder, block)?,
                None => memory.toggle_folder_enabled(&folder)?,
            };
            if !changed {
                anyhow::bail!("nothing to toggle");
            }
        }
        MemoryCommand::Delete { folder, block } => {
            let changed = match &block {
                Some(block) => memory.delete_block(&folder, block)?,
                None => memory.delete_folder(&folder)?,
            };
            if !changed {
                anyhow::bail!("nothing to delete");
            }
        }
        MemoryCommand::Context => println!("{}", memory.formatted_context()),
    }
    Ok(())
}
