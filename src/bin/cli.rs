//! flashrec CLI
//!
//! Inspect and edit a flash image file from the command line.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use flashrec::{Config, FileFlash, FlashError, FlashStorage, Geometry, Result, Snapshot, Status};
use tracing_subscriber::{fmt, EnvFilter};

/// flashrec CLI
#[derive(Parser, Debug)]
#[command(name = "flashrec")]
#[command(about = "Record store on a flash image file")]
#[command(version)]
struct Args {
    /// Flash image file
    #[arg(short, long, default_value = "./flash.img")]
    image: PathBuf,

    /// Erase page size in bytes
    #[arg(long, default_value = "4096")]
    page_size: usize,

    /// Number of pages in the image
    #[arg(long, default_value = "16")]
    pages: u32,

    /// Program word size in bytes
    #[arg(long, default_value = "4")]
    word_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a fully erased image, replacing any existing one
    Format,

    /// Write a record
    Set {
        /// Page id (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u16)]
        page: u16,

        /// Record key (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u16)]
        key: u16,

        /// Record payload
        value: String,
    },

    /// Read a record
    Get {
        #[arg(value_parser = parse_u16)]
        page: u16,

        #[arg(value_parser = parse_u16)]
        key: u16,

        /// Print the payload as hex
        #[arg(long)]
        hex: bool,
    },

    /// Delete a record
    Delete {
        #[arg(value_parser = parse_u16)]
        page: u16,

        #[arg(value_parser = parse_u16)]
        key: u16,
    },

    /// Run a garbage collection pass and wait for it
    Gc,

    /// Show page and space accounting
    Stat,

    /// List live records
    List,

    /// Write all live records to a snapshot file
    Export {
        /// Output file
        output: PathBuf,
    },

    /// Write every record of a snapshot file into the image
    Import {
        /// Input file
        input: PathBuf,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,flashrec=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        let status: Status = e.status();
        tracing::error!("{} ({:?})", e, status);
        std::process::exit(status as i32);
    }
}

fn run(args: Args) -> Result<()> {
    let geometry = Geometry::new(args.page_size, args.pages, args.word_size);

    if let Commands::Format = args.command {
        FileFlash::create(&args.image, geometry)?;
        println!(
            "Formatted {} ({} pages x {} bytes)",
            args.image.display(),
            args.pages,
            args.page_size
        );
        return Ok(());
    }

    let storage = open(&args.image, geometry)?;

    match args.command {
        Commands::Format => unreachable!("handled above"),

        Commands::Set { page, key, value } => {
            set_waiting(&storage, page, key, value.as_bytes())?;
            println!("OK");
        }

        Commands::Get { page, key, hex } => {
            let data = storage.record_read(page, key)?;
            if hex {
                let text: Vec<String> = data.iter().map(|b| format!("{:02x}", b)).collect();
                println!("{}", text.join(""));
            } else {
                println!("{}", String::from_utf8_lossy(&data));
            }
        }

        Commands::Delete { page, key } => {
            storage.record_delete(page, key)?;
            println!("OK");
        }

        Commands::Gc => {
            storage.gc_run()?;
            match storage.wait_idle()? {
                Some(report) => println!(
                    "Erased {} pages, relocated {} records, reclaimed {} bytes in {:?}",
                    report.pages_erased,
                    report.records_relocated,
                    report.bytes_reclaimed,
                    report.duration
                ),
                None => println!("Nothing to do"),
            }
            println!("Free: {} bytes", storage.free_size_get()?);
        }

        Commands::Stat => {
            let stats = storage.stats()?;
            println!("Pages:        {}", stats.page_count);
            println!("Data pages:   {}", stats.data_pages);
            println!("Free pages:   {}", stats.free_pages);
            println!("Swap page:    {}", optional(stats.swap_page));
            println!("Active page:  {}", optional(stats.active_page));
            println!("Live records: {}", stats.live_records);
            println!("Live bytes:   {}", stats.live_bytes);
            println!("Garbage:      {}", stats.garbage_bytes);
            println!("Free:         {}", stats.free_bytes);
        }

        Commands::List => {
            for key in storage.records()? {
                let len = storage.record_len(key.page, key.record)?;
                println!("{}  {} bytes", key, len);
            }
        }

        Commands::Export { output } => {
            let snapshot = storage.export_snapshot()?;
            fs::write(&output, snapshot.encode()?)
                .map_err(|e| FlashError::Serialization(format!("{}: {}", output.display(), e)))?;
            println!("Exported {} records to {}", snapshot.len(), output.display());
        }

        Commands::Import { input } => {
            let bytes = fs::read(&input)
                .map_err(|e| FlashError::Serialization(format!("{}: {}", input.display(), e)))?;
            let snapshot = Snapshot::decode(&bytes)?;
            let count = storage.import_snapshot(&snapshot)?;
            println!("Imported {} records from {}", count, input.display());
        }
    }

    storage.uninit()
}

/// Open and mount an existing image
fn open(path: &Path, geometry: Geometry) -> Result<FlashStorage<FileFlash>> {
    let flash = FileFlash::open(path, geometry)?.with_sync_writes(true);
    let storage = FlashStorage::new(flash, Config::default());
    storage.init()?;
    Ok(storage)
}

/// Write a record, waiting out a GC pass the write itself started
fn set_waiting(storage: &FlashStorage<FileFlash>, page: u16, key: u16, data: &[u8]) -> Result<()> {
    match storage.record_set(page, key, data) {
        Err(FlashError::Busy) => {
            tracing::info!("Store is full, waiting for garbage collection");
            storage.wait_idle()?;
            storage.record_set(page, key, data)
        }
        other => other,
    }
}

fn optional(page: Option<u32>) -> String {
    page.map_or_else(|| "-".to_string(), |page| page.to_string())
}

fn parse_u16(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid id '{}': {}", s, e))
}
