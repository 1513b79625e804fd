//! Search command: find images, then download them.

use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::helpers::{
    download_progress, parse_filter_arg, print_reports, print_summary, track_progress, truncate,
};
use crate::cli::SearchArgs;
use crate::config::{Config, Settings};
use crate::error::FilterError;
use crate::models::{BatchSummary, FilterSet, SearchQuery};
use crate::search::filters::conflicting_keys;
use crate::services::Pipeline;

/// Merge filters: config defaults, then named flags, then `--filter` pairs.
///
/// A flag replaces any config default it conflicts with.
fn build_filters(config: &Config, args: &SearchArgs) -> anyhow::Result<FilterSet> {
    let mut filters = FilterSet::new();
    for (key, value) in &config.filters {
        filters.insert_named(key, value.as_str())?;
    }

    let mut overrides = FilterSet::new();
    for (key, value) in args.filters.named() {
        overrides.insert_named(key, value)?;
    }
    for raw in &args.filters.extra {
        let (key, value) = parse_filter_arg(raw).map_err(|_| FilterError::UnknownFilterKey(raw.clone()))?;
        overrides.insert_named(&key, value)?;
    }

    // A flag displaces config defaults it cannot be combined with.
    for (key, value) in overrides.iter() {
        for partner in conflicting_keys(key) {
            if !overrides.contains(partner) && filters.remove(partner).is_some() {
                debug!("--{} overrides config default for {}", key, partner);
            }
        }
        filters.insert(key, value);
    }
    Ok(filters)
}

/// Search for images and download the results.
pub async fn cmd_search(settings: &Settings, config: &Config, args: &SearchArgs) -> anyhow::Result<()> {
    let filters = build_filters(config, args)?;
    let mut query = SearchQuery::new(args.keywords.clone().unwrap_or_default(), args.limit)
        .with_filters(filters);
    if let Some(seed) = &args.similar_images {
        query = query.with_similar_to(seed.clone());
    }

    let (tx, rx) = mpsc::channel(256);
    let pipeline = Pipeline::new(settings)?.with_events(tx);
    let outcome = pipeline.search(query).await?;

    println!(
        "{} Found {} of {} requested images for {:?}",
        style("→").cyan(),
        outcome.candidates.len(),
        args.limit,
        outcome.query.term()
    );

    if args.no_download {
        if args.output.json {
            println!("{}", serde_json::to_string_pretty(&outcome.candidates)?);
        } else {
            for (i, candidate) in outcome.candidates.iter().enumerate() {
                let title = candidate.title.as_deref().unwrap_or("");
                println!("{:>4}. {}  {}", i + 1, truncate(&candidate.url, 80), style(truncate(title, 40)).dim());
            }
        }
        if let Some(shortfall) = &outcome.shortfall {
            println!("{} {}", style("!").yellow(), shortfall);
        }
        return Ok(());
    }

    settings.ensure_directories()?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing downloads in progress...");
            interrupt.cancel();
        }
    });

    let bar = download_progress(outcome.candidates.len());
    let progress = tokio::spawn(track_progress(rx, bar));

    let reports = pipeline
        .downloads()
        .download_all(&outcome.candidates, &cancel)
        .await;
    drop(pipeline);
    let _ = progress.await;

    if args.output.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_reports(&reports);
    }
    print_summary(
        &BatchSummary::from_reports(&reports),
        args.limit,
        outcome.shortfall.as_ref(),
    );

    Ok(())
}
