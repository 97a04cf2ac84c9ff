//! fileroot - sandboxed file manager engine on the command line.
//!
//! Usage:
//!   fileroot ls [PATH]                      List a directory under the root
//!   fileroot mkdir PATH                     Create a directory
//!   fileroot rm PATH                        Delete a file or directory
//!   fileroot mv --to DIR SRC...             Move entries into a directory
//!   fileroot rename FROM TO                 Rename an entry
//!   fileroot archive --out DEST SRC...      Pack entries into a zip or tar.gz
//!   fileroot upload LOCAL TARGET            Upload a local file into the root
//!   fileroot filters                        Show the configured upload filters
//!
//! Every PATH is relative to the root given by `--directory`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use fileroot_core::{DEFAULT_FILE_FILTER, DEFAULT_MIME_FILTER, ManagerConfig};
use fileroot_ops::{MutationBody, OperationExecutor, OptionResponse, Resource};

#[derive(Parser)]
#[command(
    name = "fileroot",
    version,
    about = "Browse, upload, move, rename, delete and archive files under a fixed root",
    long_about = "fileroot manages the files below one root directory.\n\n\
                  No path given to a subcommand can reach outside that root."
)]
struct Cli {
    /// Root directory every path is resolved against
    #[arg(short = 'd', long, env = "FM_DIRECTORY", default_value = ".", global = true)]
    directory: PathBuf,

    /// Maximum upload size in MiB
    #[arg(short = 'm', long, env = "FM_MAXSIZE", default_value = "300", global = true)]
    maxsize: u64,

    /// Pipe-delimited extension filter handed to clients
    #[arg(short = 'f', long, env = "FM_FILTER", default_value = DEFAULT_FILE_FILTER, global = true)]
    filter: String,

    /// Pipe-delimited mime filter handed to clients
    #[arg(long, env = "FM_MIMEFILTER", default_value = DEFAULT_MIME_FILTER, global = true)]
    mimefilter: String,

    /// Log filter, e.g. `info` or `fileroot_upload=debug,security=error`
    #[arg(short = 'l', long, env = "FM_LOGGING", default_value = "warn", global = true)]
    logging: String,

    /// Include dot-files in listings
    #[arg(long, global = true)]
    show_hidden: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory, or show a file's size
    Ls {
        /// Path relative to the root
        #[arg(default_value = "")]
        path: String,

        /// Output format
        #[arg(short = 'o', long, default_value = "text")]
        format: OutputFormat,
    },

    /// Create a directory and any missing parents
    Mkdir {
        path: String,
    },

    /// Delete a file or a directory tree
    Rm {
        path: String,
    },

    /// Move entries into a directory
    Mv {
        /// Destination directory
        #[arg(long)]
        to: String,

        /// Entries to move
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Rename an entry
    Rename {
        from: String,
        to: String,
    },

    /// Pack entries into an archive (.zip, .tar.gz or .tgz)
    Archive {
        /// Archive to create
        #[arg(long)]
        out: String,

        /// Keep parent directories in entry names
        #[arg(long)]
        embed_dirs: bool,

        /// Entries to pack
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Upload a local file into the root, printing progress events
    Upload {
        /// Local file to read
        local: PathBuf,

        /// Destination path relative to the root
        target: String,
    },

    /// Show the configured upload filters
    Filters,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.logging).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = ManagerConfig::builder()
        .root(cli.directory.clone())
        .max_upload_size(cli.maxsize.saturating_mul(1024 * 1024))
        .file_filter(cli.filter.clone())
        .mime_filter(cli.mimefilter.clone())
        .show_hidden(cli.show_hidden)
        .build()
        .context("Invalid configuration")?;
    let executor = OperationExecutor::new(config)
        .with_context(|| format!("Cannot use {} as root", cli.directory.display()))?;

    match cli.command {
        Command::Ls { path, format } => run_ls(&executor, &path, format).await?,
        Command::Mkdir { path } => {
            executor
                .create(&path, Some("CREATE_FOLDER"), &MutationBody::default())
                .await
                .with_context(|| format!("Failed to create {path}"))?;
            println!("Create Folder Succeed!");
        }
        Command::Rm { path } => {
            executor
                .delete(&path)
                .await
                .with_context(|| format!("Failed to delete {path}"))?;
            println!("Delete Succeeded!");
        }
        Command::Mv { to, sources } => {
            let moved = executor
                .update(&to, Some("MOVE"), &MutationBody::sources(sources))
                .await
                .context("Move failed")?;
            for path in moved {
                println!("{path}");
            }
        }
        Command::Rename { from, to } => {
            executor
                .update(&from, Some("RENAME"), &MutationBody::target(to))
                .await
                .with_context(|| format!("Failed to rename {from}"))?;
            println!("Rename Succeed!");
        }
        Command::Archive {
            out,
            embed_dirs,
            sources,
        } => {
            let mut body = MutationBody::sources(sources);
            body.embed_dirs = embed_dirs;
            let summary = executor
                .create(&out, Some("CREATE_ARCHIVE"), &body)
                .await
                .with_context(|| format!("Failed to create archive {out}"))?;
            if let Some(summary) = summary {
                println!(
                    "{out}: {} entries, {} ({})",
                    summary.entries,
                    format_size(summary.bytes),
                    summary.format
                );
            }
        }
        Command::Upload { local, target } => run_upload(&executor, &local, &target).await?,
        Command::Filters => match executor.options(Some("GET_FILE_FILTER"))? {
            OptionResponse::FileFilter(filter) => {
                println!("{}", serde_json::to_string_pretty(&filter)?);
            }
            other => bail!("unexpected options response: {other:?}"),
        },
    }

    Ok(())
}

/// List a directory or describe a file.
async fn run_ls(executor: &OperationExecutor, path: &str, format: OutputFormat) -> Result<()> {
    let resource = executor
        .get(path)
        .await
        .with_context(|| format!("Cannot read /{}", path.trim_start_matches('/')))?;

    match (resource, format) {
        (Resource::Directory(entries), OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        (Resource::Directory(entries), OutputFormat::Text) => {
            for entry in &entries {
                let marker = if entry.is_dir() { 'd' } else { '-' };
                println!(
                    "{} {:>10}  {}  {}",
                    marker,
                    format_size(entry.size),
                    entry.modified.format("%Y-%m-%d %H:%M"),
                    entry.name
                );
            }
            eprintln!("{} entries", entries.len());
        }
        (Resource::File { path, size }, OutputFormat::Json) => {
            let value = serde_json::json!({ "path": path.to_string(), "size": size });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        (Resource::File { path, size }, OutputFormat::Text) => {
            println!("{path}  {}", format_size(size));
        }
    }

    Ok(())
}

/// Stream a local file through the upload pipeline while echoing feed events.
async fn run_upload(executor: &OperationExecutor, local: &PathBuf, target: &str) -> Result<()> {
    let file = tokio::fs::File::open(local)
        .await
        .with_context(|| format!("Cannot open {}", local.display()))?;
    let size = file
        .metadata()
        .await
        .with_context(|| format!("Cannot stat {}", local.display()))?
        .len();

    let mut feed = executor.subscribe_feed();
    let printer = tokio::spawn(async move {
        while let Some(event) = feed.next().await {
            match event.to_sse() {
                Ok(frame) => eprint!("{frame}"),
                Err(e) => tracing::warn!(error = %e, "could not render feed event"),
            }
        }
    });

    let result = executor
        .upload(target, Some(size), ReaderStream::new(file))
        .await;
    // Give the feed one more tick to report the final state.
    tokio::time::sleep(executor.config().feed_tick()).await;
    printer.abort();

    let receipt = result.with_context(|| format!("Upload to {target} failed"))?;
    println!("Uploaded {} ({})", receipt.path, format_size(receipt.bytes));
    Ok(())
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
