use std::sync::Arc;

use anyhow::{bail, Context, Result};
use harvest_engine::{
    descriptor_from_row, load_catalog, run_all, CatalogRow, Fetcher, GraphQlSource, HtmlSource,
    IndexHarvester, LogProgressSink, PageSource, ProgressSink, ReqwestFetcher, ResponseCache,
    SourceKind,
};
use harvest_logging::harvest_info;

use crate::checkpoint::{load_checkpoint, Checkpoint, CheckpointSink};
use crate::config::HarvestConfig;

fn build_fetcher(config: &HarvestConfig) -> Result<Arc<dyn Fetcher>> {
    let mut fetcher = ReqwestFetcher::new(config.fetch_settings())?;
    if config.cache_enabled {
        fetcher = fetcher.with_cache(ResponseCache::new(&config.cache_dir));
        if config.source == SourceKind::GraphQl {
            fetcher = fetcher.with_cache_filter(GraphQlSource::cache_filter());
        }
    }
    Ok(Arc::new(fetcher))
}

fn build_source(config: &HarvestConfig) -> Result<Arc<dyn PageSource>> {
    let source: Arc<dyn PageSource> = match config.source {
        SourceKind::Html => Arc::new(HtmlSource::new(config.html_options())?),
        SourceKind::GraphQl => Arc::new(
            GraphQlSource::new(config.graphql_options())
                .context("graphql source needs `graphql: (endpoint: ...)` in the config")?,
        ),
    };
    Ok(source)
}

fn build_harvester(config: &HarvestConfig, sink: Arc<dyn ProgressSink>) -> Result<IndexHarvester> {
    Ok(IndexHarvester::new(
        build_fetcher(config)?,
        build_source(config)?,
        config.harvest_settings(),
    )
    .with_sink(sink))
}

/// Start position for a catalog run: `--start`, the checkpoint, or 0.
fn start_index(config: &HarvestConfig, start: Option<usize>, resume: bool) -> Result<usize> {
    if let Some(start) = start {
        return Ok(start);
    }
    if !resume {
        return Ok(0);
    }
    match load_checkpoint(&config.output_dir) {
        Some(checkpoint) if checkpoint.source != config.source => bail!(
            "checkpoint in {} was written by a {} run, not {}",
            config.output_dir.display(),
            checkpoint.source,
            config.source
        ),
        Some(checkpoint) => Ok(checkpoint.next_index),
        None => Ok(0),
    }
}

pub async fn run(config: &HarvestConfig, start: Option<usize>, resume: bool) -> Result<()> {
    let Some(catalog_path) = config.catalog.as_deref() else {
        bail!("no catalog given: pass --catalog or set `catalog` in the config");
    };
    let catalog = load_catalog(catalog_path, config.source)?;
    let start_index = start_index(config, start, resume)?;
    harvest_info!(
        "{} index(es) in {}, starting at {} ({} source)",
        catalog.len(),
        catalog_path.display(),
        start_index,
        config.source
    );

    let checkpoint = if resume {
        load_checkpoint(&config.output_dir)
            .unwrap_or_else(|| Checkpoint::new(config.source, start_index))
    } else {
        Checkpoint::new(config.source, start_index)
    };
    let sink = Arc::new(CheckpointSink::new(config.output_dir.clone(), checkpoint));
    let harvester = build_harvester(config, sink.clone())?;

    let summary = run_all(&harvester, &catalog, start_index, &config.output_dir).await?;
    for report in &summary.reports {
        println!(
            "{}\t{} rows\t{}",
            report.title,
            report.rows_written,
            report.path.display()
        );
    }
    harvest_info!(
        "harvested {} index(es) this run, {} recorded in the checkpoint; next position {}",
        summary.reports.len(),
        sink.snapshot().completed.len(),
        summary.next_index
    );
    Ok(())
}

pub async fn index(config: &HarvestConfig, title: &str, url: &str) -> Result<()> {
    let row = CatalogRow {
        title: title.to_string(),
        url: url.to_string(),
        category: None,
        status: None,
    };
    let descriptor = match descriptor_from_row(&row, config.source) {
        Ok(descriptor) => descriptor,
        Err(message) => bail!("{message}"),
    };
    let harvester = build_harvester(config, Arc::new(LogProgressSink))?;
    let report = harvester.run(&descriptor, &config.output_dir).await?;
    println!(
        "{}\t{} rows\t{}",
        report.title,
        report.rows_written,
        report.path.display()
    );
    Ok(())
}

pub fn clear_cache(config: &HarvestConfig, namespace: Option<&str>) -> Result<()> {
    let cache = ResponseCache::new(&config.cache_dir);
    match namespace {
        Some(namespace) => {
            cache.clear_namespace(namespace)?;
            harvest_info!("cleared cache namespace {}", namespace);
        }
        None => {
            cache.clear_all()?;
            harvest_info!("cleared cache at {}", config.cache_dir.display());
        }
    }
    Ok(())
}
