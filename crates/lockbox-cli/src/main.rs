//! Lockbox CLI - entry point
//!
//! A thin shell over `lockbox-core`: every command opens the vault at the
//! configured directory, prompts for the master passphrase where needed,
//! and prints human-readable output. Secret values are prompted with
//! hidden input and never echoed.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rpassword::prompt_password;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lockbox_core::{
    config, BackupEnvelope, ImportRow, RecordDraft, RecordKind, Vault, VaultError, VaultRecord,
};

/// Default vault directory name under the home directory
const VAULT_DIR: &str = ".lockbox";

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(version)]
#[command(about = "Lockbox - a local-first personal vault")]
struct Cli {
    /// Vault directory (defaults to ~/.lockbox)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new vault
    Init,

    /// Add a record
    Add {
        #[command(subcommand)]
        kind: AddCommands,
    },

    /// List records (titles only, never secret values)
    List {
        /// Restrict to one kind: site, credential, document
        #[arg(long)]
        kind: Option<String>,
    },

    /// Show a credential's decrypted fields
    Show {
        /// Record title
        title: String,
    },

    /// Fuzzy-search the vault
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Remove a record by title
    Rm {
        title: String,
    },

    /// Duplicate a record by title
    Duplicate {
        title: String,
    },

    /// Import records from a JSON file of rows
    Import {
        file: PathBuf,
        /// Validate and report without persisting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Write an encrypted backup envelope
    Backup {
        out: PathBuf,
    },

    /// Restore the vault from a backup envelope
    Restore {
        file: PathBuf,
    },

    /// Change the master passphrase
    ChangePassphrase,
}

#[derive(Subcommand)]
enum AddCommands {
    /// A bookmarked site
    Site {
        title: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// A login credential (secret fields prompted, hidden)
    Credential {
        title: String,
        #[arg(long)]
        url: Option<String>,
    },
    /// A document record (attachment metadata is supplied by the note store)
    Document {
        title: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
}

/// Initialize logging to stderr
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .with(filter)
        .init();
}

fn vault_dir(cli: &Cli) -> PathBuf {
    cli.dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(VAULT_DIR)
    })
}

async fn open_vault(dir: &PathBuf) -> Result<Vault, Box<dyn std::error::Error>> {
    let config = config::load_config(dir).await?;
    Ok(Vault::open_at(config, dir).await?)
}

/// Prompt and unlock, or exit with a retry-friendly message
async fn unlock_or_fail(vault: &Vault) -> Result<(), Box<dyn std::error::Error>> {
    let passphrase = prompt_password("Enter master passphrase: ")?;
    if vault.unlock(&passphrase).await? {
        return Ok(());
    }
    if vault.is_locked_out().await {
        return Err("Too many failed attempts - try again later".into());
    }
    Err("Wrong passphrase".into())
}

async fn find_by_title(vault: &Vault, title: &str) -> Result<VaultRecord, Box<dyn std::error::Error>> {
    let records = vault.list(None).await?;
    records
        .into_iter()
        .find(|r| r.title == title)
        .ok_or_else(|| format!("No record titled {title:?}").into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();
    let dir = vault_dir(&cli);
    tracing::debug!("using vault directory {}", dir.display());

    match cli.command {
        Commands::Init => handle_init(&dir).await,
        Commands::Add { kind } => handle_add(&dir, kind).await,
        Commands::List { kind } => handle_list(&dir, kind).await,
        Commands::Show { title } => handle_show(&dir, &title).await,
        Commands::Search { query, limit } => handle_search(&dir, &query, limit).await,
        Commands::Rm { title } => handle_rm(&dir, &title).await,
        Commands::Duplicate { title } => handle_duplicate(&dir, &title).await,
        Commands::Import { file, dry_run } => handle_import(&dir, &file, dry_run).await,
        Commands::Backup { out } => handle_backup(&dir, &out).await,
        Commands::Restore { file } => handle_restore(&dir, &file).await,
        Commands::ChangePassphrase => handle_change_passphrase(&dir).await,
    }
}

async fn handle_init(dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config(dir).await?;
    config::save_config(dir, &config).await?;

    let vault = open_vault(dir).await?;

    let passphrase = prompt_password("Enter master passphrase: ")?;
    let confirm = prompt_password("Confirm master passphrase: ")?;
    if passphrase != confirm {
        return Err("Passphrases do not match".into());
    }
    if passphrase.len() < 8 {
        return Err("Passphrase must be at least 8 characters".into());
    }

    vault.initialize(&passphrase).await?;

    println!("Vault created at {}", dir.display());
    println!();
    println!("Next steps:");
    println!("  lockbox add credential <title>    Add a login");
    println!("  lockbox search <query>            Find records");
    Ok(())
}

async fn handle_add(dir: &PathBuf, kind: AddCommands) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_vault(dir).await?;
    unlock_or_fail(&vault).await?;

    let draft = match kind {
        AddCommands::Site { title, url, notes } => RecordDraft::Site {
            title,
            url,
            notes,
            tags: Default::default(),
        },
        AddCommands::Credential { title, url } => {
            let username = prompt_line(&format!("Username for '{title}': "))?;
            let password = prompt_password(&format!("Password for '{title}': "))?;
            RecordDraft::Credential {
                title,
                username,
                password,
                url,
                tags: Default::default(),
            }
        }
        AddCommands::Document { title, notes } => RecordDraft::Document {
            title,
            attachment: None,
            notes,
            tags: Default::default(),
        },
    };

    let record = vault.add(draft).await?;
    println!("Added {} ({})", record.title, record.kind());
    Ok(())
}

async fn handle_list(dir: &PathBuf, kind: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let kind = match kind.as_deref() {
        Some(raw) => Some(
            RecordKind::parse(raw).ok_or_else(|| format!("Unknown kind {raw:?}"))?,
        ),
        None => None,
    };

    let vault = open_vault(dir).await?;
    unlock_or_fail(&vault).await?;

    let records = vault.list(kind).await?;
    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }
    for record in records {
        println!("{:<12} {}", record.kind().to_string(), record.title);
    }
    Ok(())
}

async fn handle_show(dir: &PathBuf, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_vault(dir).await?;
    unlock_or_fail(&vault).await?;

    let record = find_by_title(&vault, title).await?;
    match vault.read_credential(record.id).await {
        Ok(secrets) => {
            println!("Title:    {}", record.title);
            println!("Username: {}", secrets.username);
            println!("Password: {}", secrets.password);
            if let Some(url) = secrets.url {
                println!("URL:      {url}");
            }
            Ok(())
        }
        Err(VaultError::Patch(_)) => Err(format!("{title:?} is not a credential").into()),
        Err(e) => Err(e.into()),
    }
}

async fn handle_search(
    dir: &PathBuf,
    query: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_vault(dir).await?;
    unlock_or_fail(&vault).await?;

    let results = vault.search(query, limit).await;
    if results.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for entry in results {
        match &entry.subtitle {
            Some(subtitle) => println!("{:<12} {:<24} {}", entry.kind.to_string(), entry.title, subtitle),
            None => println!("{:<12} {}", entry.kind.to_string(), entry.title),
        }
    }
    Ok(())
}

async fn handle_rm(dir: &PathBuf, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_vault(dir).await?;
    unlock_or_fail(&vault).await?;

    let record = find_by_title(&vault, title).await?;
    vault.remove(record.id).await?;
    println!("Removed {}", record.title);
    Ok(())
}

async fn handle_duplicate(dir: &PathBuf, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_vault(dir).await?;
    unlock_or_fail(&vault).await?;

    let record = find_by_title(&vault, title).await?;
    let copy = vault.duplicate(record.id).await?;
    println!("Created {}", copy.title);
    Ok(())
}

async fn handle_import(
    dir: &PathBuf,
    file: &PathBuf,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(file).await?;
    let rows: Vec<ImportRow> = serde_json::from_str(&raw)?;

    let vault = open_vault(dir).await?;
    unlock_or_fail(&vault).await?;

    let report = vault.bulk_import(&rows, dry_run).await?;
    let verb = if dry_run { "Would import" } else { "Imported" };
    println!("{verb} {} record(s)", report.imported.len());
    for error in &report.errors {
        println!("  row {}: {}", error.row, error.message);
    }
    Ok(())
}

async fn handle_backup(dir: &PathBuf, out: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_vault(dir).await?;
    unlock_or_fail(&vault).await?;

    let passphrase = prompt_password("Backup passphrase: ")?;
    let confirm = prompt_password("Confirm backup passphrase: ")?;
    if passphrase != confirm {
        return Err("Passphrases do not match".into());
    }

    let envelope = vault.create_backup(&passphrase).await?;
    tokio::fs::write(out, serde_json::to_vec_pretty(&envelope)?).await?;
    println!("Backup written to {}", out.display());
    Ok(())
}

async fn handle_restore(dir: &PathBuf, file: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(file).await?;
    let envelope: BackupEnvelope = serde_json::from_str(&raw)
        .map_err(|_| "Not a backup file (malformed envelope)")?;

    let mut vault = open_vault(dir).await?;
    unlock_or_fail(&vault).await?;

    let passphrase = prompt_password("Backup passphrase: ")?;
    match vault.restore_backup(&passphrase, &envelope).await {
        Ok(()) => {
            println!("Vault restored from {}", file.display());
            Ok(())
        }
        Err(VaultError::UnsupportedBackupVersion(version)) => {
            Err(format!("Backup version {version} is not supported by this build").into())
        }
        Err(VaultError::InvalidBackupPassphrase) => {
            Err("Wrong backup passphrase, or the file is corrupted".into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_change_passphrase(dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut vault = open_vault(dir).await?;

    let old = prompt_password("Current master passphrase: ")?;
    if !vault.unlock(&old).await? {
        return Err("Wrong passphrase".into());
    }

    let new = prompt_password("New master passphrase: ")?;
    let confirm = prompt_password("Confirm new master passphrase: ")?;
    if new != confirm {
        return Err("Passphrases do not match".into());
    }
    if new.len() < 8 {
        return Err("Passphrase must be at least 8 characters".into());
    }

    vault.change_passphrase(&old, &new).await?;
    println!("Master passphrase changed.");
    Ok(())
}

/// Visible-input prompt (usernames are not secret)
fn prompt_line(message: &str) -> io::Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end().to_string())
}
