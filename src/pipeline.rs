use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::category::CategoryClassifier;
use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{DatasetStats, SourceDatabase};
use crate::sources::{filter_source_a, filter_source_b, locate_latest, FilteredTable};
use crate::stats::summarize_file;
use crate::store::{write_alerts, ConsolidatedStore, MergeOutcome};
use crate::unify::unify;

/// Raw extracts to process; `None` means "look for the newest one in the scraps directory".
#[derive(Debug, Clone, Default)]
pub struct SourceInputs {
    pub source_a: Option<PathBuf>,
    pub source_b: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCounts {
    pub source: SourceDatabase,
    pub path: Option<PathBuf>,
    pub read: usize,
    pub kept: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub sources: Vec<SourceCounts>,
    pub unified: usize,
    pub processed_path: PathBuf,
    pub merge: MergeOutcome,
    pub stats: DatasetStats,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// No rows survived filtering; the consolidated dataset was not touched.
    NothingToProcess { sources: Vec<SourceCounts> },
    Completed(PipelineRun),
}

fn resolve(
    config: &Config,
    explicit: Option<&PathBuf>,
    source: SourceDatabase,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.clone());
    }
    let found = locate_latest(&config.paths.scraps_dir(), config.paths.source_pattern(source));
    match &found {
        Some(path) => info!(%source, path = %path.display(), "found extract"),
        None => warn!(
            %source,
            dir = %config.paths.scraps_dir().display(),
            "no extract found"
        ),
    }
    found
}

/// Filter, unify, persist the run table and merge it into the consolidated dataset.
pub fn run_pipeline(
    config: &Config,
    inputs: &SourceInputs,
    run_date: NaiveDate,
) -> Result<PipelineOutcome, PipelineError> {
    let classifier = CategoryClassifier::new(config);

    let path_a = resolve(config, inputs.source_a.as_ref(), SourceDatabase::SourceA);
    let path_b = resolve(config, inputs.source_b.as_ref(), SourceDatabase::SourceB);

    let table_a = path_a
        .as_deref()
        .map(|path| filter_source_a(path, &classifier))
        .unwrap_or_else(|| FilteredTable::empty(SourceDatabase::SourceA));
    let table_b = path_b
        .as_deref()
        .map(|path| filter_source_b(path, &classifier))
        .unwrap_or_else(|| FilteredTable::empty(SourceDatabase::SourceB));

    let sources = vec![
        SourceCounts {
            source: SourceDatabase::SourceA,
            path: path_a,
            read: table_a.read_rows(),
            kept: table_a.len(),
        },
        SourceCounts {
            source: SourceDatabase::SourceB,
            path: path_b,
            read: table_b.read_rows(),
            kept: table_b.len(),
        },
    ];

    let alerts = unify(&[table_a, table_b], &classifier);
    if alerts.is_empty() {
        warn!("no alerts matched the target categories");
        return Ok(PipelineOutcome::NothingToProcess { sources });
    }

    let processed_path = config.paths.processed_path(run_date);
    write_alerts(&processed_path, &alerts)?;
    info!(path = %processed_path.display(), rows = alerts.len(), "wrote processed run table");

    let store = ConsolidatedStore::new(config.paths.consolidated_path());
    let merge = store.merge(&alerts)?;
    let stats = summarize_file(store.path());

    Ok(PipelineOutcome::Completed(PipelineRun {
        sources,
        unified: alerts.len(),
        processed_path,
        merge,
        stats,
    }))
}
