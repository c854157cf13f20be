//! musicsim - local-library music similarity and recommendation engine.
//!
//! Analyzes a music collection with pluggable timbre/descriptor/attribute
//! adapters, builds a per-analyzer similarity index, and serves a small
//! HTTP query API (`similar`, `dump`, `attrmix`, plus introspection) over
//! it. The CLI is a single launcher covering both the analyzer and the
//! server, mirroring the source system's `music-similarity.py` dispatch.

mod analyze;
mod api;
mod catalog;
mod config;
mod core;
mod engine;
mod error;
mod index;
mod recommend;
mod utils;

use analyze::{
    discover_catalog_paths, AttributeAnalyzer, Analyzer, DescriptorAnalyzer, FfmpegCueSplitter,
    LoftyTagReader, Pipeline, PipelineConfig, TimbreAnalyzer,
};
use anyhow::Result;
use catalog::{Catalog, HEAVY_COMMIT_INTERVAL, LIGHT_COMMIT_INTERVAL};
use clap::Parser;
use config::{Paths, Settings};
use engine::Engine;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Music Similarity (analyzer + query server)
#[derive(Parser, Debug)]
#[command(name = "musicsim")]
#[command(version)]
#[command(about = "Local-library music similarity and recommendation engine")]
struct Args {
    /// Config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Analyse file/folder (use 'm' for the configured music folder)
    #[arg(short = 'a', long, value_name = "PATH")]
    analyse: Option<String>,

    /// Show number of files to be updated/removed but do nothing (used with --analyse)
    #[arg(short, long)]
    dry_run: bool,

    /// Set maximum number of tracks to analyse
    #[arg(short = 'M', long, value_name = "N")]
    max_tracks: Option<usize>,

    /// Update metadata database only (used with --analyse)
    #[arg(short, long)]
    meta_only: bool,

    /// Do not remove non-existent tracks from the DB (used with --analyse)
    #[arg(short, long)]
    keep_old: bool,

    /// Force rescan of specified data: 'm' musly, 'e' essentia, 'b' bliss, 'meb' all (used with --analyse)
    #[arg(short, long, default_value = "")]
    force: String,

    /// Sanity-check the timbre similarity index
    #[arg(short, long)]
    test: bool,

    /// Repeat the sanity check until it passes (used with --test)
    #[arg(short, long)]
    repeat: bool,

    /// Open the catalog and apply any pending schema migration, then exit
    #[arg(short, long = "update-db")]
    update_db: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let analyse_mode = args.analyse.is_some();
    let settings = Settings::load(&args.config, analyse_mode)?;
    Settings::install(settings.clone());

    let config_dir = args.config.parent().map(|p| p.to_path_buf());
    let paths = Paths::init(config_dir)?;

    if args.update_db {
        return run_update_db(&settings).await;
    }

    if let Some(target) = &args.analyse {
        return run_analyse(&settings, &paths, target, &args).await;
    }

    if args.test {
        return run_test(&settings, &paths, args.repeat).await;
    }

    run_server(settings, &paths).await
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Opening the catalog already applies the schema; nothing further to
/// migrate in this implementation, so `--update-db` is a readiness check.
async fn run_update_db(settings: &Settings) -> Result<()> {
    Catalog::open(&settings.paths.db).await?;
    info!("catalog schema up to date");
    Ok(())
}

async fn run_analyse(settings: &Settings, paths: &Paths, target: &str, args: &Args) -> Result<()> {
    let library_root = if target == "m" {
        settings
            .paths
            .local
            .clone()
            .ok_or_else(|| anyhow::anyhow!("paths.local not configured"))?
    } else {
        PathBuf::from(target)
    };

    let catalog = Catalog::open(&settings.paths.db).await?;

    let mut analyzers: Vec<Arc<dyn Analyzer>> = Vec::new();
    if settings.musly.enabled {
        if let Some(program) = &settings.musly.lib {
            analyzers.push(Arc::new(TimbreAnalyzer {
                program: program.clone(),
                extract_len: settings.musly.extractlen,
                extract_start: settings.musly.extractstart,
            }));
        }
    }
    if settings.essentia.enabled {
        if let Some(program) = &settings.essentia.extractor {
            analyzers.push(Arc::new(AttributeAnalyzer {
                program: program.clone(),
                highlevel: settings.essentia.highlevel,
                cache_dir: settings.paths.cache.clone(),
                gzip_cache: true,
            }));
        }
    }
    if settings.bliss.enabled {
        if let Some(program) = &settings.bliss.analyser {
            analyzers.push(Arc::new(DescriptorAnalyzer { program: program.clone() }));
        }
    }

    if analyzers.is_empty() && !args.meta_only {
        anyhow::bail!("no analyser enabled in configuration");
    }

    let force: HashSet<char> = args.force.chars().filter(|c| "meb".contains(*c)).collect();

    let pipeline = Pipeline::new(
        catalog.clone(),
        Arc::new(LoftyTagReader),
        analyzers,
        Arc::new(FfmpegCueSplitter),
    );

    let stop_flag = pipeline.cancellation_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop_flag.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let cfg = PipelineConfig {
        threads: settings.threads,
        force,
        min_duration: settings.minduration,
        max_duration: settings.maxduration,
        exclude_genres: settings.excludegenres.clone().unwrap_or_default(),
        dry_run: args.dry_run,
        max_tracks: args.max_tracks,
        commit_interval: if args.meta_only { LIGHT_COMMIT_INTERVAL } else { HEAVY_COMMIT_INTERVAL },
        show_progress: true,
        meta_only: args.meta_only,
    };

    let summary = pipeline.run(&library_root, &cfg).await?;
    info!(
        ok = summary.ok,
        filtered = summary.filtered,
        error = summary.error,
        "analysis pass complete"
    );

    // A forget-missing sweep never runs in --meta-only or --keep-old mode
    // (it would delete anything outside the subtree just scanned).
    if !args.dry_run && !args.meta_only && !args.keep_old {
        let present = discover_catalog_paths(&library_root)?;
        let removed = catalog.forget_missing(&present).await?;
        if removed {
            info!("removed stale tracks no longer present under {}", library_root.display());
        }
    }

    if settings.musly.enabled {
        // Rebuilding the engine re-derives the timbre jukebox whenever the
        // catalog's row count no longer matches the one on disk (§4.4).
        let jukebox_path = paths.jukebox_path();
        Engine::build(catalog, settings, settings.musly.lib.as_deref(), Some(&jukebox_path)).await?;
    }

    Ok(())
}

async fn run_test(settings: &Settings, paths: &Paths, repeat: bool) -> Result<()> {
    let jukebox_path = paths.jukebox_path();
    loop {
        let catalog = Catalog::open(&settings.paths.db).await?;
        let engine = Engine::build(catalog, settings, settings.musly.lib.as_deref(), Some(&jukebox_path)).await?;

        if engine.record_count() < 2 {
            anyhow::bail!("too few tracks in catalog to test similarity");
        }

        let neighbors = engine.knn(0, 51);
        let distinct: HashSet<_> = neighbors
            .iter()
            .filter(|n| !n.sim.is_nan())
            .map(|n| n.sim.to_bits())
            .collect();
        let nans = neighbors.iter().filter(|n| n.sim.is_nan()).count();

        if nans == 0 && distinct.len() > 1 {
            info!("similarity index looks sane ({} distinct similarities)", distinct.len());
            return Ok(());
        }

        if !repeat {
            anyhow::bail!(
                "similarity index returned {} NaN and {} distinct similarities; suggest removing {}",
                nans,
                distinct.len(),
                jukebox_path.display()
            );
        }
        tracing::warn!("similarity index looks degenerate, retrying...");
    }
}

async fn run_server(settings: Settings, paths: &Paths) -> Result<()> {
    let catalog = Catalog::open(&settings.paths.db).await?;
    let jukebox_path = paths.jukebox_path();
    let engine = Engine::build(catalog, &settings, settings.musly.lib.as_deref(), Some(&jukebox_path)).await?;
    Engine::install(engine);

    let addr = format!("{}:{}", settings.host, settings.port);
    info!("server listening on http://{}", addr);

    use actix_cors::Cors;
    use actix_web::{middleware, App, HttpServer};

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(api::configure)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
