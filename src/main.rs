use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{info, warn};

mod config;
mod db;
mod engine;
mod export;
mod ingest;

use config::{Command, Config};
use db::Database;
use engine::calibration::{calibration_curve, summarize};
use engine::{analyze_sources, annotate_sources, pooled_samples, HeuristicModel, PipelineOptions};
use ingest::{
    discover_tables, flatten_match, visit_documents, BestMatch, DeliverySource, DeliveryTable,
    MatchDocument, MatchFilter,
};

fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = match &config.database_path {
        Some(path) => {
            let db = Database::open(path)?;
            info!("Database opened: {}", path);
            Some(db)
        }
        None => None,
    };

    match &config.command {
        Command::Flatten {
            input,
            outdir,
            name,
            ..
        } => match config.match_filter() {
            Some(filter) => flatten_selected(input, outdir, filter, name.as_deref()),
            None => flatten(input, outdir),
        },
        Command::Features { indir, outdir } => features(indir, outdir, config.parallel),
        Command::Wp {
            indir,
            outdir,
            bins,
            hist_bins,
        } => {
            let opts = PipelineOptions {
                bins: *bins,
                hist_bins: *hist_bins,
            };
            win_probability(indir, outdir, opts, config.parallel, db.as_ref())
        }
        Command::Summary { bins, key } => match &db {
            Some(db) => summary(db, *bins, key.as_deref()),
            None => anyhow::bail!("summary needs a database"),
        },
    }
}

/// Flatten one document to `<name>_ball_by_ball.csv`. Returns false when the
/// document has no usable innings.
fn write_table(outdir: &Path, name: &str, doc: &MatchDocument) -> Result<bool> {
    let rows = match flatten_match(&doc.raw) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Skipping {}: {}", doc.name, e);
            return Ok(false);
        }
    };
    let out = outdir.join(format!("{}{}", name, ingest::TABLE_SUFFIX));
    export::to_file(&out, |f| export::deliveries_to(f, &rows))?;
    info!("Wrote {} deliveries to {}", rows.len(), out.display());
    Ok(true)
}

fn flatten(input: &Path, outdir: &Path) -> Result<()> {
    let mut written = 0usize;
    let visited = visit_documents(input, |doc| {
        written += usize::from(write_table(outdir, &doc.name, &doc)?);
        Ok(())
    })?;
    info!(
        "Flattened {} of {} match(es) from {} into {}",
        written,
        visited,
        input.display(),
        outdir.display()
    );
    Ok(())
}

fn flatten_selected(
    input: &Path,
    outdir: &Path,
    filter: MatchFilter,
    name: Option<&str>,
) -> Result<()> {
    let wanted = filter.criteria();
    let mut best = BestMatch::new(filter);
    let visited = visit_documents(input, |doc| {
        best.offer(doc);
        Ok(())
    })?;

    let complete = best.is_complete();
    let Some((score, doc)) = best.into_best() else {
        anyhow::bail!("none of {} match(es) in {} fits the selection", visited, input.display());
    };
    if complete {
        info!("Selected {} out of {} match(es)", doc.name, visited);
    } else {
        warn!(
            "No match fits every criterion; using best partial match {} ({}/{})",
            doc.name, score, wanted
        );
    }

    if !write_table(outdir, name.unwrap_or(doc.name.as_str()), &doc)? {
        anyhow::bail!("selected match {} has no deliveries", doc.name);
    }
    Ok(())
}

fn features(indir: &Path, outdir: &Path, parallel: bool) -> Result<()> {
    let tables = discover_tables(indir)
        .with_context(|| format!("Failed to list {}", indir.display()))?;
    if tables.is_empty() {
        warn!("No *{} tables in {}", ingest::TABLE_SUFFIX, indir.display());
    }
    let sources: Vec<Box<dyn DeliverySource>> = tables
        .into_iter()
        .map(|p| Box::new(DeliveryTable::new(p)) as Box<dyn DeliverySource>)
        .collect();

    for (name, annotated) in annotate_sources(&sources, parallel) {
        let out = outdir.join(format!("{}_features.csv", name));
        export::to_file(&out, |f| export::annotated_to(f, &annotated))?;
        info!("Wrote {} annotated rows to {}", annotated.len(), out.display());
    }
    Ok(())
}

fn win_probability(
    indir: &Path,
    outdir: &Path,
    opts: PipelineOptions,
    parallel: bool,
    db: Option<&Database>,
) -> Result<()> {
    let tables = discover_tables(indir)
        .with_context(|| format!("Failed to list {}", indir.display()))?;
    let sources: Vec<Box<dyn DeliverySource>> = tables
        .into_iter()
        .map(|p| Box::new(DeliveryTable::new(p)) as Box<dyn DeliverySource>)
        .collect();
    info!(
        "Processing {} match(es) from {} (parallel={})",
        sources.len(),
        indir.display(),
        parallel
    );

    let reports = analyze_sources(&sources, &HeuristicModel, &opts, parallel);

    for report in &reports {
        export::write_report(outdir, report)?;
        if let Some(db) = db {
            db.save_report(report)
                .with_context(|| format!("Failed to store {}", report.key))?;
        }
    }

    let pooled = pooled_samples(&reports);
    let overall = calibration_curve(&pooled, opts.bins);
    let out = outdir.join("calibration_all.csv");
    export::to_file(&out, |f| export::serialize_all(f, &overall))?;

    match summarize(&pooled) {
        Some(s) => info!(
            "{} match(es), {} WP rows: Brier {:.4}, log loss {:.4}",
            reports.len(),
            s.samples,
            s.brier,
            s.log_loss
        ),
        None => warn!("No chase rows scored; calibration_all.csv has empty bins only"),
    }
    Ok(())
}

fn summary(db: &Database, bins: usize, key: Option<&str>) -> Result<()> {
    let matches = db.list_matches()?;
    println!("{} stored match(es)", matches.len());
    for m in &matches {
        println!(
            "{:<32} {:>10} {} {:>3}/{:<3} {:<4} {:>4} deliveries  brier {}  ({}, {})",
            m.key,
            m.match_date.map(|d| d.to_string()).unwrap_or_default(),
            m.event.as_deref().unwrap_or("-"),
            m.first_innings_total,
            m.target_runs,
            if m.chase_won { "won" } else { "lost" },
            m.deliveries,
            m.brier.map(|b| format!("{:.4}", b)).unwrap_or_else(|| "-".into()),
            m.venue.as_deref().unwrap_or("-"),
            m.processed_at.format("%Y-%m-%d %H:%M"),
        );
    }

    let pooled = db.load_predictions()?;
    if let Some(s) = summarize(&pooled) {
        println!(
            "\nPooled: {} rows, Brier {:.4}, log loss {:.4}",
            s.samples, s.brier, s.log_loss
        );
    }
    print_calibration(&calibration_curve(&pooled, bins));

    if let Some(key) = key {
        let rows = db.load_calibration(key)?;
        if rows.is_empty() {
            warn!("No stored calibration for '{}'", key);
        } else {
            println!("\n{}:", key);
            print_calibration(&rows);
        }
    }
    Ok(())
}

fn print_calibration(rows: &[db::models::CalibrationRow]) {
    let fmt = |v: Option<f64>| v.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".into());
    for r in rows {
        println!(
            "  {:.3}  pred {:>6}  obs {:>6}  n={}",
            r.bin_mid,
            fmt(r.pred_mean),
            fmt(r.obs_rate),
            r.count
        );
    }
}
