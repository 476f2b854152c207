//! AtlasBlock CLI
//!
//! Inspect and edit a persistent list of strings by hand.

use std::path::PathBuf;
use std::process;

use atlasblock::{BlockBuffer, BufferKind, Config, PersistentLinkedList, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasBlock CLI
#[derive(Parser, Debug)]
#[command(name = "atlasblock-cli")]
#[command(about = "Inspect and edit AtlasBlock list files")]
#[command(version)]
struct Args {
    /// List file
    #[arg(short, long, default_value = "./atlasblock.dat")]
    file: PathBuf,

    /// Buffer strategy (auto, direct, mapped, chunked)
    #[arg(short, long, default_value = "auto")]
    kind: BufferKind,

    /// Open the file read-only
    #[arg(short, long)]
    read_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append a value
    Push {
        /// The value to append
        value: String,
    },

    /// Prepend a value
    PushFront {
        /// The value to prepend
        value: String,
    },

    /// Remove and print the last value
    Pop,

    /// Remove and print the first value
    PopFront,

    /// Print the value at an index
    Get {
        /// Zero-based index
        index: u64,
    },

    /// Print the number of values
    Len,

    /// Print every value, one per line
    Dump,

    /// Print list and storage statistics
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,atlasblock=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .path(&args.file)
        .buffer_kind(args.kind)
        .read_only(args.read_only)
        .build();

    tracing::debug!("Opening {} ({})", args.file.display(), args.kind);

    let mut list = match PersistentLinkedList::<String, _>::open(&config) {
        Ok(list) => list,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.file.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&mut list, args.command) {
        tracing::error!("Command failed: {}", e);
        process::exit(1);
    }

    if let Err(e) = list.close() {
        tracing::error!("Failed to close {}: {}", args.file.display(), e);
        process::exit(1);
    }
}

type StringList = PersistentLinkedList<String, atlasblock::serializer::StringSerializer>;

fn run(list: &mut StringList, command: Commands) -> Result<()> {
    match command {
        Commands::Push { value } => list.add_last(&value)?,
        Commands::PushFront { value } => list.add_first(&value)?,
        Commands::Pop => print_value(list.remove_last()?),
        Commands::PopFront => print_value(list.remove_first()?),
        Commands::Get { index } => print_value(list.get(index)?),
        Commands::Len => println!("{}", list.len()),
        Commands::Dump => {
            for value in list.iter() {
                print_value(value?);
            }
        }
        Commands::Stats => {
            let blocks = list.block_buffer();
            println!("elements:  {}", list.len());
            println!("blocks:    {}", blocks.block_count()?);
            println!("capacity:  {} bytes", blocks.capacity());
            println!("meta:      block {}", list.meta_block());
        }
    }
    Ok(())
}

fn print_value(value: Option<String>) {
    match value {
        Some(value) => println!("{}", value),
        None => println!("(null)"),
    }
}
