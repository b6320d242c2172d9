use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use archivist::config::SubjectConfig;
use archivist::db::messages::MessageTable;
use archivist::db::ArchiveDb;
use archivist::ingest::Ingestor;

#[derive(Parser)]
#[command(name = "archivist", version, about = "Mine a personal email archive into SQLite")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest an mbox export into the message store.
    Ingest {
        /// Path to the mbox file.
        mbox: PathBuf,
        /// Config file (defaults to ~/.archivist/config.json).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Database file (defaults to ~/.archivist/archivist.db).
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Rewrite stored display names from the configured address map.
    FixNames {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print row counts for the message and address tables.
    Stats {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn open_db(path: Option<PathBuf>) -> anyhow::Result<ArchiveDb> {
    let db = match path {
        Some(path) => ArchiveDb::open_at(path)?,
        None => ArchiveDb::open()?,
    };
    Ok(db)
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<SubjectConfig> {
    let path = match path {
        Some(path) => path,
        None => SubjectConfig::default_path()?,
    };
    SubjectConfig::load(&path).with_context(|| format!("loading config {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ingest { mbox, config, db } => {
            let config = load_config(config)?;
            let db = open_db(db)?;
            let stats = Ingestor::new(&db, &config)
                .run(&mbox)
                .with_context(|| format!("ingesting {}", mbox.display()))?;
            println!(
                "{} processed, {} skipped, {} raw, {} subject-authored, {} promoted",
                stats.processed,
                stats.skipped,
                stats.raw_inserted,
                stats.subject_inserted,
                stats.promoted
            );
        }
        Command::FixNames { config, db } => {
            let config = load_config(config)?;
            let db = open_db(db)?;
            let rewritten = db.apply_name_corrections(&config.addresses)?;
            println!("{rewritten} message fields rewritten");
        }
        Command::Stats { db } => {
            let db = open_db(db)?;
            println!("raw_msgs:     {}", db.message_count(MessageTable::Raw)?);
            println!("msgs:         {}", db.message_count(MessageTable::Subject)?);
            println!("address_book: {}", db.address_count()?);
        }
    }

    Ok(())
}
