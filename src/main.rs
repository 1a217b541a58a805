mod browser;
mod classify;
mod config;
mod content;
mod extract;
mod harvest;
mod run;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::browser::webdriver::WebDriver;
use crate::config::Settings;

#[derive(Parser)]
#[command(name = "epicea_harvest", about = "Incremental EPICEA accident-report harvester")]
struct Cli {
    /// Directory holding the reference list and datasets
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// WebDriver server (chromedriver, geckodriver, selenium)
    #[arg(long, global = true)]
    webdriver_url: Option<String>,
    /// Browser requested from the WebDriver server (chrome, firefox)
    #[arg(long, global = true)]
    browser: Option<String>,
    /// Pause between two records, in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,
    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the paginated listing and save every record reference
    Harvest,
    /// Extract detail pages for references not in the results dataset
    Extract {
        /// Max records to extract (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Abort a record when one of its labels is missing
        #[arg(long)]
        strict: bool,
    },
    /// Harvest references, then extract the new ones
    Run {
        /// Max records to extract
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Classify extracted summaries into the structured dataset
    Classify {
        /// Max summaries to classify
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show dataset statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    if let Some(url) = cli.webdriver_url {
        settings.webdriver_url = url;
    }
    if let Some(name) = cli.browser {
        settings.browser = name;
    }
    if let Some(ms) = cli.delay_ms {
        settings.record_delay_ms = ms;
    }
    if cli.headed {
        settings.headless = false;
    }

    let result = match cli.command {
        Commands::Harvest => harvest(&settings).await.map(|_| ()),
        Commands::Extract { limit, strict } => extract(&settings, limit, strict).await,
        Commands::Run { limit } => {
            let found = harvest(&settings).await?;
            println!("Harvest phase: {} references", found);
            extract(&settings, limit, false).await
        }
        Commands::Classify { limit } => {
            let results = store::load_results(&settings.results_path())?;
            if results.is_empty() {
                println!("No extracted records. Run 'extract' first.");
                return Ok(());
            }
            let classifier = classify::ChatClassifier::new(&settings)?;
            let stats = classify::classify_pending(
                &classifier,
                &results,
                &settings.classified_path(),
                limit,
                settings.classifier_delay(),
            )
            .await?;
            println!(
                "Done: {} classified ({} rejected payloads, {} failed calls) of {} pending.",
                stats.classified, stats.rejected, stats.failed, stats.pending
            );
            Ok(())
        }
        Commands::Stats => stats(&settings),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn harvest(settings: &Settings) -> anyhow::Result<usize> {
    let mut driver = WebDriver::connect(&settings.webdriver_url, &settings.browser, settings.headless).await?;
    let outcome = harvest::harvest_references(&mut driver, &settings.wait()).await;
    let references = browser::release(&mut driver, outcome).await?;

    let path = settings.references_path();
    store::save_references(&path, &references)?;
    println!("Saved {} references to {}", references.len(), path.display());
    Ok(references.len())
}

async fn extract(settings: &Settings, limit: Option<usize>, strict: bool) -> anyhow::Result<()> {
    let references = store::load_references(&settings.references_path())?;
    let results_path = settings.results_path();
    let plan = run::plan(&references, &results_path)?;
    if plan.pending.is_empty() {
        println!("No unvisited references. Run 'harvest' first or all records are extracted.");
        return Ok(());
    }

    println!("Extracting {} records (saving after each)...", plan.pending.len());
    let opts = run::RunOptions {
        limit,
        strict,
        delay: settings.record_delay(),
        wait: settings.wait(),
    };
    let mut driver = WebDriver::connect(&settings.webdriver_url, &settings.browser, settings.headless).await?;
    let stats = run::execute(&mut driver, plan, &results_path, &opts).await?;
    println!(
        "Done: {} extracted of {} pending ({} already in dataset, {} fields missing).",
        stats.processed, stats.pending, stats.already_done, stats.fields_missing
    );
    Ok(())
}

fn stats(settings: &Settings) -> anyhow::Result<()> {
    let references_path = settings.references_path();
    let references = if references_path.exists() {
        store::load_references(&references_path)?
    } else {
        Vec::new()
    };
    let results = run::dedup_rows(store::load_results(&settings.results_path())?);
    let pending = run::pending_references(&references, &results).len();
    let with_documents = results.iter().filter(|r| !r.documents.is_empty()).count();
    let classified = store::load_classified(&settings.classified_path())?.len();

    println!("References: {}", references.len());
    println!("Extracted:  {}", results.len());
    println!("Pending:    {}", pending);
    println!("With PDFs:  {}", with_documents);
    println!("Classified: {}", classified);
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
