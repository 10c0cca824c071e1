use reviewscope::cli::{Cli, Commands, ConfigAction, HistoryAction, RunArgs};
use reviewscope::config::{expand_tilde, Config};
use reviewscope::enrichment::OpenAiAnalyzer;
use reviewscope::error::{Result, ScopeError};
use reviewscope::history::HistoryStore;
use reviewscope::jobs::{ApifyProvider, DiscoveryMode, DiscoveryRequest, TokioSleeper};
use reviewscope::model::RunArtifact;
use reviewscope::pipeline::{
    Pipeline, PipelineSettings, ProgressBus, ProgressEvent, RunContext, ScrapeOptions,
    SearchQuery, Selection,
};
use reviewscope::progress::forward_events;
use reviewscope::stats::compute_place_stats;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Brand {
            name,
            location,
            max_places,
            mode,
            skip_closed,
            run,
        } => {
            let config = load_run_config(cli.config, &run)?;
            let request = discovery_request(&config, name, location, max_places, mode, skip_closed)?;
            cmd_run(config, SearchQuery::Brand(request), run)?;
        }
        Commands::Urls { urls, file, run } => {
            let config = load_run_config(cli.config, &run)?;
            let lines = collect_url_lines(urls, file.as_deref())?;
            cmd_run(config, SearchQuery::Urls(lines), run)?;
        }
        Commands::History { action } => {
            cmd_history(cli.config, action)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose {
        "reviewscope=debug"
    } else {
        "reviewscope=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load_run_config(config_path: Option<PathBuf>, run: &RunArgs) -> Result<Config> {
    let mut config = load_config(config_path, run.profile.clone())?;
    if run.no_sampling {
        config.enrichment.sampling = false;
    }
    Ok(config)
}

fn discovery_request(
    config: &Config,
    name: String,
    location: Option<String>,
    max_places: Option<u32>,
    mode: Option<String>,
    skip_closed: bool,
) -> Result<DiscoveryRequest> {
    let mode_str = mode.unwrap_or_else(|| config.search.mode.clone());
    let mode = DiscoveryMode::parse(&mode_str).ok_or_else(|| {
        ScopeError::Validation(format!(
            "Unknown discovery mode '{}' (expected balanced or aggressive)",
            mode_str
        ))
    })?;

    Ok(DiscoveryRequest {
        query: name,
        location_hint: location.unwrap_or_else(|| config.search.location.clone()),
        max_results: max_places.unwrap_or(config.search.max_places),
        mode,
        skip_closed: skip_closed || config.search.skip_closed,
    })
}

fn collect_url_lines(mut urls: Vec<String>, file: Option<&Path>) -> Result<Vec<String>> {
    if let Some(path) = file {
        let content = std::fs::read_to_string(path).map_err(|e| ScopeError::Io {
            source: e,
            context: format!("Failed to read URL file: {:?}", path),
        })?;
        urls.extend(content.lines().map(str::to_string));
    }
    Ok(urls)
}

fn cmd_run(config: Config, query: SearchQuery, run: RunArgs) -> Result<()> {
    let provider = Arc::new(ApifyProvider::from_config(&config.apify)?);
    let settings = PipelineSettings::from_config(&config);
    let mut pipeline = Pipeline::new(provider, settings, Arc::new(TokioSleeper), ProgressBus::new());

    if run.ai {
        let analyzer = OpenAiAnalyzer::from_config(&config.openai)?;
        pipeline = pipeline.with_analyzer(Arc::new(analyzer));
    }

    let selection = match &run.select {
        Some(indices) => Selection::Indices(indices.clone()),
        None => Selection::All,
    };
    let options = ScrapeOptions {
        max_reviews: run.max_reviews.unwrap_or(config.search.max_reviews),
        ai_enabled: run.ai,
    };

    let rt = tokio::runtime::Runtime::new().map_err(|e| ScopeError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    let artifact = rt.block_on(async {
        let events = pipeline.progress().subscribe();
        let (stop_tx, stop_rx) = oneshot::channel();
        let printer = tokio::spawn(forward_events(events, stop_rx, print_event));

        let mut ctx = RunContext::new();
        let result = drive(&pipeline, &mut ctx, query, &selection, options).await;

        let _ = stop_tx.send(());
        if let Err(e) = printer.await {
            tracing::debug!("Progress printer stopped: {}", e);
        }
        result
    })?;

    let Some(artifact) = artifact else {
        println!("No places found");
        return Ok(());
    };

    print_summary(&artifact);

    if let Some(output) = &run.output {
        write_artifact(&artifact, output)?;
        println!("\n✓ Run written to {}", output.display());
    }

    if !run.no_history {
        let store = HistoryStore::from_config(&config)?;
        if store.save(&artifact)? {
            println!("✓ Saved to history ({})", artifact.run_id);
        } else {
            println!("Same query saved moments ago, history unchanged");
        }
    }

    Ok(())
}

fn print_event(event: ProgressEvent) {
    println!(
        "  [{:>3}%] {:<10} {}",
        event.percent,
        event.stage.as_str(),
        event.message
    );
}

/// Discover, list the candidates, then scrape the selection
async fn drive(
    pipeline: &Pipeline,
    ctx: &mut RunContext,
    query: SearchQuery,
    selection: &Selection,
    options: ScrapeOptions,
) -> Result<Option<RunArtifact>> {
    let discovered = pipeline.discover(ctx, query).await?;
    if discovered.is_empty() {
        return Ok(None);
    }

    println!("\nPlaces:");
    for (i, place) in discovered.iter().enumerate() {
        println!("  [{}] {} - {}", i, place.title, place.address);
    }
    println!();

    pipeline.scrape(ctx, selection, options).await.map(Some)
}

fn print_summary(artifact: &RunArtifact) {
    let stats = &artifact.aggregate_stats;

    println!("\nReviewscope Report");
    println!("==================");
    if let Some(query) = &artifact.query {
        println!("Brand: {}", query);
    }
    println!("Places: {}", stats.total_places);
    println!(
        "Reviews: {} ({} with text, {} with owner response)",
        stats.total_reviews, stats.reviews_with_text, stats.reviews_with_response
    );
    println!("Average rating: {:.1}", stats.avg_rating);

    println!("\nDistribution:");
    for stars in (1..=5u8).rev() {
        let count = stats.distribution.get(&stars).copied().unwrap_or(0);
        println!("  {}★ {}", stars, count);
    }

    println!(
        "\nSentiment: {}% positive, {}% neutral, {}% negative",
        stats.sentiment.positive_percent,
        stats.sentiment.neutral_percent,
        stats.sentiment.negative_percent
    );

    if !stats.top_keywords.is_empty() {
        let keywords: Vec<String> = stats
            .top_keywords
            .iter()
            .take(10)
            .map(|k| format!("{} ({})", k.word, k.count))
            .collect();
        println!("Top keywords: {}", keywords.join(", "));
    }

    println!("\nBy place:");
    for place in &artifact.places {
        let place_stats = compute_place_stats(place);
        println!(
            "  {} - {:.1} avg over {} reviews",
            place.title, place_stats.avg_rating, place_stats.total_reviews
        );
        if !place_stats.top_keywords.is_empty() {
            let words: Vec<&str> = place_stats
                .top_keywords
                .iter()
                .take(5)
                .map(|k| k.word.as_str())
                .collect();
            println!("    keywords: {}", words.join(", "));
        }
        if let Some(analysis) = &place.analysis {
            for strength in analysis.strengths.iter().take(3) {
                println!("    + {}", strength);
            }
            for weakness in analysis.weaknesses.iter().take(3) {
                println!("    - {}", weakness);
            }
        }
    }

    if let Some(ai) = &stats.ai_stats {
        println!("\nBrand priorities:");
        for (i, priority) in ai.analysis.priorities.iter().enumerate() {
            println!("  {}. {}", i + 1, priority);
        }
    }
}

fn write_artifact(artifact: &RunArtifact, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(artifact).map_err(|e| ScopeError::Json {
        source: e,
        context: "Failed to serialize run".to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| ScopeError::Io {
        source: e,
        context: format!("Failed to write run file: {:?}", path),
    })
}

fn parse_run_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id)
        .map_err(|e| ScopeError::Validation(format!("Invalid run id '{}': {}", id, e)))
}

fn cmd_history(config_path: Option<PathBuf>, action: HistoryAction) -> Result<()> {
    let config = load_config(config_path, None)?;
    let store = HistoryStore::from_config(&config)?;

    match action {
        HistoryAction::List => {
            let runs = store.list()?;
            println!("Runs: {} total", runs.len());
            for run in runs {
                println!(
                    "  {} {} {:<5} {:<30} {} places, {} reviews{}",
                    run.id,
                    run.saved_at.format("%Y-%m-%d %H:%M:%S"),
                    run.mode.as_str(),
                    run.query.as_deref().unwrap_or("-"),
                    run.places_count,
                    run.reviews_count,
                    if run.ai_enabled { ", AI" } else { "" }
                );
            }
        }
        HistoryAction::Show { id } => {
            let id = parse_run_id(&id)?;
            match store.get(&id)? {
                Some(artifact) => print_summary(&artifact),
                None => println!("No saved run with id {}", id),
            }
        }
        HistoryAction::Export { id, output } => {
            let id = parse_run_id(&id)?;
            match store.get(&id)? {
                Some(artifact) => {
                    write_artifact(&artifact, &output)?;
                    println!("✓ Run {} written to {}", id, output.display());
                }
                None => println!("No saved run with id {}", id),
            }
        }
        HistoryAction::Delete { id } => {
            let id = parse_run_id(&id)?;
            if store.delete(&id)? {
                println!("✓ Deleted run {}", id);
            } else {
                println!("No saved run with id {}", id);
            }
        }
        HistoryAction::Clear => {
            let removed = store.clear()?;
            println!("✓ Removed {} runs", removed);
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, None)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| ScopeError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ScopeError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            let data_dir = expand_tilde(&config.storage.data_dir)?;
            std::fs::create_dir_all(&data_dir).map_err(|e| ScopeError::Io {
                source: e,
                context: format!("Failed to create data directory: {:?}", data_dir),
            })?;

            println!("✓ Configuration initialized at: {}", path.display());
            println!("  Data directory: {}", data_dir.display());
            println!(
                "  Set {} and {} before running",
                config.apify.api_key_env, config.openai.api_key_env
            );
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'reviewscope config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
