use anyhow::{Context, Result};
use clap::Parser;
use shared::{
    get_default_snapshot_dir, load_sources, run_timestamp, AirtableStore, Classifier, Config,
    FixedDelay, HttpRenderer, ListingExtractor, OpenAiJudge, Pipeline, RuleFilter, RunScope,
    Settings, Stage, SyncManager,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "job-sync")]
#[command(about = "Scrape job listings, filter them by keyword and LLM, and append new ones to Airtable")]
struct Args {
    /// JSON array of company page URLs to scrape
    #[arg(long, default_value = "company_urls.json")]
    sources: PathBuf,

    /// JSON file with keyword lists, the CV profile and tuning options
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Stage to run (all, extract, filter, classify, sync)
    #[arg(short, long, default_value = "all")]
    stage: String,

    /// Directory for stage snapshots (defaults to the local data directory)
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

fn parse_scope(stage: &str) -> Result<RunScope> {
    if stage == "all" {
        return Ok(RunScope::All);
    }
    Stage::from_name(stage).map(RunScope::Only).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid stage: {}. Use 'all', 'extract', 'filter', 'classify', or 'sync'",
            stage
        )
    })
}

fn needs(scope: RunScope, stage: Stage) -> bool {
    scope == RunScope::All || scope == RunScope::Only(stage)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let scope = parse_scope(&args.stage)?;
    let settings = Settings::load(&args.settings)?;

    let snapshot_dir = match args.snapshot_dir {
        Some(dir) => dir,
        None => get_default_snapshot_dir()?,
    };
    println!("📁 Snapshots: {}", snapshot_dir.display());

    let mut pipeline = Pipeline::new()
        .with_filter(RuleFilter::new(settings.rules()))
        .with_snapshot_dir(snapshot_dir);

    let sources = if needs(scope, Stage::Extract) {
        let sources = load_sources(&args.sources)?;
        println!("🌐 Scraping {} company pages...", sources.len());
        let renderer = HttpRenderer::new(settings.page_timeout())?;
        pipeline = pipeline.with_extractor(ListingExtractor::new(
            Box::new(renderer),
            settings.page_timeout(),
        )?);
        sources
    } else {
        Vec::new()
    };

    if needs(scope, Stage::Classify) || needs(scope, Stage::Sync) {
        let config = Config::from_env()?;

        if needs(scope, Stage::Classify) {
            let judge = OpenAiJudge::new(config.openai_api_key.clone(), settings.model.clone())?;
            pipeline = pipeline.with_classifier(Classifier::new(
                Box::new(judge),
                settings.profile.clone(),
            ));
        }

        if needs(scope, Stage::Sync) {
            let store = AirtableStore::new(
                config.airtable_token.clone(),
                &config.airtable_base_id,
                &config.airtable_table_id,
            )?;
            pipeline = pipeline.with_sync(SyncManager::new(
                Box::new(store),
                Box::new(FixedDelay(settings.request_delay())),
                settings.batch_size,
            ));
        }
    }

    let run_date = run_timestamp();
    println!("🚀 Starting run at {}", run_date);

    let summary = pipeline.run(scope, &sources, &run_date).await;

    println!("\n{}", summary);

    if let Some(abort) = summary.abort {
        return Err(abort).context("Run did not complete");
    }

    println!("✅ Run complete");
    Ok(())
}
