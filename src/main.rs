use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use photosweep::models::format_byte_size;
use photosweep::{
    CategoryKind, CleanupService, DiagnosticsService, FsMediaStore, JsonSnapshotStore,
    LibraryState, PipelineConfig,
};

const SNAPSHOT_FILE: &str = ".photosweep-snapshot.json";

#[derive(Parser, Debug)]
#[command(name = "photosweep", version, about = "CLI for sweeping photo libraries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a library and summarize its cleanup categories
    Scan {
        /// Library root to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// List timestamp-duplicate groups
    Duplicates {
        /// Library root to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// List large videos, biggest first
    Large {
        /// Library root to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Delete duplicate copies, keeping the newest of each group
    Clean {
        /// Library root to clean
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Count asset classes and estimate local vs. cloud storage
    Diagnose {
        /// Library root to inspect
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { path } => {
            let svc = open_library(&path);
            let state = scan_with_spinner(&svc, &path).await?;

            println!("📦 Cleanup categories:");
            for category in &state.categories {
                let groups = category
                    .groups
                    .as_ref()
                    .map(|g| format!(", {} group(s)", g.len()))
                    .unwrap_or_default();
                println!(
                    "   ▶ {}: {} item(s){} ({})",
                    category.kind.title(),
                    category.len(),
                    groups,
                    format_byte_size(category.total_bytes())
                );
            }
            println!(
                "\n✅ {} item(s) to review, {} reclaimable",
                state.total_items(),
                format_byte_size(state.cleanable_bytes())
            );
        }

        Commands::Duplicates { path } => {
            let svc = open_library(&path);
            let state = scan_with_spinner(&svc, &path).await?;

            let mut found = false;
            for kind in [
                CategoryKind::SimilarPhotos,
                CategoryKind::SimilarVideos,
                CategoryKind::SimilarScreenshots,
            ] {
                let Some(category) = state.category(kind) else {
                    continue;
                };
                let Some(groups) = &category.groups else {
                    continue;
                };
                if groups.is_empty() {
                    continue;
                }
                found = true;
                println!("\n✨ {}: {} group(s)", kind.title(), groups.len());
                for group in groups {
                    println!(" Group {}:", group.date_key);
                    for (i, item) in group.items.iter().enumerate() {
                        if i == 0 {
                            println!("   🏆 Newest → {} ({})", item.id, item.formatted_size());
                        } else {
                            println!("   ▶ {} ({})", item.id, item.formatted_size());
                        }
                    }
                }
            }
            if !found {
                println!("No duplicates found.");
            }
        }

        Commands::Large { path } => {
            let svc = open_library(&path);
            let state = scan_with_spinner(&svc, &path).await?;

            let large = state
                .category(CategoryKind::LargeVideos)
                .map(|c| c.items.as_slice())
                .unwrap_or_default();
            if large.is_empty() {
                println!("No large videos found.");
            } else {
                println!("📦 {} large video(s):", large.len());
                for item in large {
                    println!("   ▶ {} ({})", item.id, item.formatted_size());
                }
            }
        }

        Commands::Clean { path, dry_run, yes } => {
            let svc = open_library(&path);
            let state = scan_with_spinner(&svc, &path).await?;

            let doomed = duplicate_copies(&state);
            if doomed.is_empty() {
                println!("No duplicates found.");
                return Ok(());
            }

            let mut total_bytes = 0;
            for kind in [
                CategoryKind::SimilarPhotos,
                CategoryKind::SimilarVideos,
                CategoryKind::SimilarScreenshots,
            ] {
                let Some(groups) = state.category(kind).and_then(|c| c.groups.as_ref()) else {
                    continue;
                };
                for (i, group) in groups.iter().enumerate() {
                    println!("\n✨ {} group {}:", kind.title(), i + 1);
                    println!("   🏆 Keeping → {}", group.items[0].id);
                    for item in &group.items[1..] {
                        total_bytes += item.byte_size;
                        if dry_run {
                            println!("   📦 [dry-run] DELETE {} ({})", item.id, item.formatted_size());
                        } else {
                            println!("   🗑️  {} ({})", item.id, item.formatted_size());
                        }
                    }
                }
            }

            if dry_run {
                println!(
                    "\n⚠️  Dry-run only; {} item(s) ({}) were left in place.",
                    doomed.len(),
                    format_byte_size(total_bytes)
                );
                return Ok(());
            }

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Delete {} item(s), freeing {}?",
                        doomed.len(),
                        format_byte_size(total_bytes)
                    ))
                    .default(false)
                    .interact()
                    .context("Confirmation prompt failed")?;
                if !confirmed {
                    println!("Aborted; nothing was deleted.");
                    return Ok(());
                }
            }

            let outcome = svc
                .delete_assets(&doomed)
                .await
                .context("Bulk delete failed; the library was left untouched")?;
            println!(
                "\n✅ Deleted {} item(s), freed {}",
                outcome.deleted,
                format_byte_size(outcome.freed_bytes)
            );
        }

        Commands::Diagnose { path } => {
            let store = Arc::new(FsMediaStore::new(&path));
            let diagnostics = DiagnosticsService::new(store, &PipelineConfig::default());

            let spinner = spinner("Counting assets…")?;
            let report = diagnostics
                .run()
                .await
                .with_context(|| format!("Failed to inspect {}", path.display()))?;
            spinner.finish_with_message("Diagnostics complete");

            println!("🗂️  Library diagnostics:");
            println!("   total assets:     {}", report.total_assets);
            println!("   images:           {}", report.images);
            println!("   videos:           {}", report.videos);
            println!("   audio:            {}", report.audio);
            println!("   hidden:           {}", report.hidden);
            println!("   burst extras:     {}", report.burst_extras);
            println!("   all-photos album: {}", report.all_photos_album);
            println!(
                "   storage:          ~{} local / ~{} cloud (sampled {})",
                report.local_estimate, report.cloud_estimate, report.sampled
            );
        }
    }

    Ok(())
}

fn open_library(path: &Path) -> CleanupService {
    let store = Arc::new(FsMediaStore::new(path));
    CleanupService::new(store, PipelineConfig::default())
        .with_snapshot(Arc::new(JsonSnapshotStore::new(path.join(SNAPSHOT_FILE))))
}

async fn scan_with_spinner(svc: &CleanupService, path: &Path) -> Result<LibraryState> {
    println!("▶ Scanning library: {}", path.display());
    let spinner = spinner("Fetching and grouping assets…")?;
    let state = svc
        .scan()
        .await
        .with_context(|| format!("Failed to scan {}", path.display()))?;
    spinner.finish_with_message("Scan complete");
    Ok(state)
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// Ids of every non-newest group member across the similar categories,
/// deduplicated in first-seen order.
fn duplicate_copies(state: &LibraryState) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for kind in [
        CategoryKind::SimilarPhotos,
        CategoryKind::SimilarVideos,
        CategoryKind::SimilarScreenshots,
    ] {
        let Some(groups) = state.category(kind).and_then(|c| c.groups.as_ref()) else {
            continue;
        };
        for group in groups {
            for item in &group.items[1..] {
                if seen.insert(item.id.clone()) {
                    ids.push(item.id.clone());
                }
            }
        }
    }
    ids
}
