use anyhow::Result;
use clap::{Arg, Command};
use std::sync::Arc;
use tracing::{info, warn};

use workout_importer::api::{start_http_server, AppState};
use workout_importer::collector::Collector;
use workout_importer::config::Config;
use workout_importer::inference::create_model;
use workout_importer::matcher::{BuiltinCatalog, ExerciseMatcher};
use workout_importer::request::ProcessRequest;
use workout_importer::service::ProcessService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workout_importer=info,warn".into()),
        )
        .init();

    let matches = Command::new("Workout Importer")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Imports workout templates from shared short-form video links")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port for the HTTP API"),
        )
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .value_name("URL")
                .help("Import a single video link and print the result instead of serving"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("verbose") {
        info!("Verbose logging enabled");
    }

    // Load configuration
    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });
    config.validate()?;

    if let Some(port) = matches.get_one::<String>("port") {
        config.server.port = port.parse()?;
    }

    info!("🚀 Workout Importer starting...");
    info!("{}", config.summary());

    let model = Arc::from(create_model(&config.inference)?);
    let service = Arc::new(ProcessService::new(config.clone(), model));
    let matcher = Arc::new(ExerciseMatcher::new(
        Arc::new(BuiltinCatalog::new()),
        config.matcher.clone(),
    ));

    if let Some(url) = matches.get_one::<String>("url") {
        return import_once(url, &config, &service, &matcher).await;
    }

    let state = AppState { service, matcher };
    start_http_server(state, config.server.port).await
}

/// One-shot import: collect on this machine, then run the full pipeline
/// and print the matched workout as JSON
async fn import_once(
    url: &str,
    config: &Config,
    service: &ProcessService,
    matcher: &ExerciseMatcher,
) -> Result<()> {
    let collector = Collector::new(config.collector.clone());
    let (collected, frames) = collector.collect_with_frames(url, &config.frames).await;

    let request = ProcessRequest::build(url, collected, &frames);
    let result = service.process(request).await;
    let matches = matcher.match_workout(&result.exercises);

    let output = serde_json::json!({
        "result": &result,
        "matches": &matches,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if result.success {
        info!("✅ Imported {} exercises", result.exercises.len());
    } else {
        warn!("⚠️ Import failed: {}", result.error.as_deref().unwrap_or("unknown"));
    }

    Ok(())
}
