mod logging;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tcgp_sync::{merge_blocking, GroupSelection, SyncConfig, SyncPipeline};

#[derive(Debug, Parser)]
#[command(name = "tcgp-cli")]
#[command(about = "Download and merge TCG price lists")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download price files for the selected groups, merge them, and clean up.
    Sync {
        /// Only process the configured auto-process group list.
        #[arg(long, conflicts_with = "group")]
        auto: bool,
        /// Only process these group ids, in this order.
        #[arg(long = "group", value_name = "ID")]
        group: Vec<u32>,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the groups available in the catalog.
    List,
    /// Pick one group interactively and download its price file.
    Select,
    /// Download a single group's price file without merging.
    Download {
        #[arg(long = "group", value_name = "ID")]
        group: u32,
    },
    /// Merge local CSV files; later inputs override earlier ones.
    Merge {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync {
        auto: false,
        group: Vec::new(),
        json: false,
    }) {
        Commands::Sync { auto, group, json } => {
            let selection = if auto {
                GroupSelection::Auto
            } else if !group.is_empty() {
                GroupSelection::Only(group)
            } else {
                GroupSelection::All
            };
            let summary = tcgp_sync::run_sync_once_from_env(&selection).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "sync complete: run_id={} groups={} downloaded={} failed={} merged={}",
                    summary.run_id,
                    summary.selected_groups,
                    summary.downloaded.len(),
                    summary.failures.len(),
                    summary
                        .merged
                        .as_ref()
                        .map(|m| format!("{} ({} rows)", m.path.display(), m.output_rows))
                        .unwrap_or_else(|| "none".to_string()),
                );
            }
        }
        Commands::List => {
            let pipeline = SyncPipeline::new(SyncConfig::from_env())?;
            let catalog = pipeline.fetch_groups().await?;
            for (index, group) in catalog.results.iter().enumerate() {
                println!("{}. {}", index + 1, group.display_label());
            }
        }
        Commands::Select => {
            let pipeline = SyncPipeline::new(SyncConfig::from_env())?;
            let catalog = pipeline.fetch_groups().await?;
            if catalog.is_empty() {
                println!("No results found.");
                return Ok(());
            }

            println!("\nAvailable Options:");
            for (index, group) in catalog.results.iter().enumerate() {
                println!("{}. {}", index + 1, group.display_label());
            }
            print!("\nSelect an option by number: ");
            std::io::stdout().flush()?;

            let mut answer = String::new();
            std::io::stdin().lock().read_line(&mut answer)?;
            let picked = answer
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| catalog.results.get(i));

            match picked {
                Some(group) => {
                    println!("\nYou selected: {}", group.display_label());
                    let file = pipeline.download_group(group).await?;
                    println!("saved {}", file.path.display());
                }
                None => println!("\nInvalid selection."),
            }
        }
        Commands::Download { group } => {
            let pipeline = SyncPipeline::new(SyncConfig::from_env())?;
            let file = pipeline.download_one(group).await?;
            println!(
                "saved {} ({} bytes, sha256={})",
                file.path.display(),
                file.byte_size,
                file.content_hash
            );
        }
        Commands::Merge { output, inputs } => {
            let stats = merge_blocking(inputs, output.clone()).await?;
            println!(
                "merged {} files into {} ({} rows, {} columns)",
                stats.files,
                output.display(),
                stats.output_rows,
                stats.columns
            );
        }
    }

    Ok(())
}
