use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::classifier::{ClassifyReport, Classifier};
use crate::extractor::ListingExtractor;
use crate::filter::{FilterReport, RuleFilter};
use crate::io::{load_snapshot, save_snapshot};
use crate::models::{ClassifiedListing, FilteredListing, RawListing};
use crate::sync::{SyncManager, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Filter,
    Classify,
    Sync,
}

impl Stage {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "extract" => Some(Stage::Extract),
            "filter" => Some(Stage::Filter),
            "classify" => Some(Stage::Classify),
            "sync" => Some(Stage::Sync),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Filter => "filter",
            Stage::Classify => "classify",
            Stage::Sync => "sync",
        }
    }

    /// File holding this stage's output
    pub fn snapshot_file(&self) -> Option<&'static str> {
        match self {
            Stage::Extract => Some("raw_listings.json"),
            Stage::Filter => Some("filtered_listings.json"),
            Stage::Classify => Some("classified_listings.json"),
            Stage::Sync => None,
        }
    }

    fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Extract => None,
            Stage::Filter => Some(Stage::Extract),
            Stage::Classify => Some(Stage::Filter),
            Stage::Sync => Some(Stage::Classify),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which stages a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunScope {
    All,
    Only(Stage),
}

impl RunScope {
    fn includes(&self, stage: Stage) -> bool {
        match self {
            RunScope::All => true,
            RunScope::Only(only) => *only == stage,
        }
    }
}

/// A stage could not contribute at all; later stages are not run
#[derive(Debug, Clone, Error)]
#[error("{stage} stage aborted: {reason}")]
pub struct StageAbort {
    pub stage: Stage,
    pub reason: String,
}

impl StageAbort {
    fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub sources: usize,
    pub failed_sources: usize,
    pub skipped_rows: usize,
    pub listings: usize,
}

/// Counts retained at each stage that ran, plus any abort reason
#[derive(Debug, Default)]
pub struct RunSummary {
    pub extract: Option<ExtractSummary>,
    pub filter: Option<FilterReport>,
    pub classify: Option<ClassifyReport>,
    pub sync: Option<SyncReport>,
    pub abort: Option<StageAbort>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run summary")?;

        match &self.extract {
            Some(e) => writeln!(
                f,
                "  Extracted:   {} listings from {} sources ({} failed, {} rows skipped)",
                e.listings, e.sources, e.failed_sources, e.skipped_rows
            )?,
            None => writeln!(f, "  Extracted:   -")?,
        }
        match &self.filter {
            Some(r) => writeln!(
                f,
                "  Rule filter: {} of {} retained ({} after exclusion)",
                r.retained, r.input, r.after_exclusion
            )?,
            None => writeln!(f, "  Rule filter: -")?,
        }
        match &self.classify {
            Some(c) => writeln!(
                f,
                "  Classifier:  {} of {} matched ({} calls failed)",
                c.matched, c.evaluated, c.failed_calls
            )?,
            None => writeln!(f, "  Classifier:  -")?,
        }
        match &self.sync {
            Some(s) => writeln!(
                f,
                "  Sync:        {} new of {} ({} already stored, {} not matched), \
                 {} written in {} batches ({} failed)",
                s.new_records,
                s.candidates,
                s.existing,
                s.rejected,
                s.written,
                s.batches,
                s.failures.len()
            )?,
            None => writeln!(f, "  Sync:        -")?,
        }
        if let Some(abort) = &self.abort {
            writeln!(f, "  Aborted:     {}", abort)?;
        }
        Ok(())
    }
}

/// Runs the stages in order. Each component is optional so single-stage runs
/// only need the collaborators that stage uses.
#[derive(Default)]
pub struct Pipeline {
    extractor: Option<ListingExtractor>,
    filter: Option<RuleFilter>,
    classifier: Option<Classifier>,
    sync: Option<SyncManager>,
    snapshot_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extractor(mut self, extractor: ListingExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_filter(mut self, filter: RuleFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_sync(mut self, sync: SyncManager) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_snapshot_dir(mut self, dir: PathBuf) -> Self {
        self.snapshot_dir = Some(dir);
        self
    }

    pub async fn run(&self, scope: RunScope, sources: &[String], run_date: &str) -> RunSummary {
        let mut summary = RunSummary::default();
        if let Err(abort) = self.run_stages(scope, sources, run_date, &mut summary).await {
            error!("{}", abort);
            summary.abort = Some(abort);
        }
        summary
    }

    async fn run_stages(
        &self,
        scope: RunScope,
        sources: &[String],
        run_date: &str,
        summary: &mut RunSummary,
    ) -> Result<(), StageAbort> {
        let mut raw: Option<Vec<RawListing>> = None;
        let mut filtered: Option<Vec<FilteredListing>> = None;
        let mut classified: Option<Vec<ClassifiedListing>> = None;

        if scope.includes(Stage::Extract) {
            raw = Some(self.extract(sources, summary).await?);
        }

        if scope.includes(Stage::Filter) {
            let input = self.input(Stage::Filter, raw.take())?;
            filtered = Some(self.filter(&input, summary)?);
        }

        if scope.includes(Stage::Classify) {
            let input = self.input(Stage::Classify, filtered.take())?;
            classified = Some(self.classify(input, summary).await?);
        }

        if scope.includes(Stage::Sync) {
            let input = self.input(Stage::Sync, classified.take())?;
            self.sync(&input, run_date, summary).await?;
        }

        Ok(())
    }

    async fn extract(
        &self,
        sources: &[String],
        summary: &mut RunSummary,
    ) -> Result<Vec<RawListing>, StageAbort> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| StageAbort::new(Stage::Extract, "no extractor configured"))?;

        let report = extractor.extract_all(sources).await;
        summary.extract = Some(ExtractSummary {
            sources: sources.len(),
            failed_sources: report.failed_sources.len(),
            skipped_rows: report.skipped_rows,
            listings: report.listings.len(),
        });
        info!("extracted {} listings", report.listings.len());

        self.persist(Stage::Extract, &report.listings);
        Ok(report.listings)
    }

    fn filter(
        &self,
        listings: &[RawListing],
        summary: &mut RunSummary,
    ) -> Result<Vec<FilteredListing>, StageAbort> {
        let filter = self
            .filter
            .as_ref()
            .ok_or_else(|| StageAbort::new(Stage::Filter, "no keyword rules configured"))?;

        let (retained, report) = filter.apply(listings);
        info!(
            "rule filter: {} -> {} after exclusion -> {} retained",
            report.input, report.after_exclusion, report.retained
        );
        summary.filter = Some(report);

        self.persist(Stage::Filter, &retained);
        Ok(retained)
    }

    async fn classify(
        &self,
        listings: Vec<FilteredListing>,
        summary: &mut RunSummary,
    ) -> Result<Vec<ClassifiedListing>, StageAbort> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| StageAbort::new(Stage::Classify, "no classifier configured"))?;

        let (matches, report) = classifier.classify(listings).await;
        info!("classifier: {} of {} matched", report.matched, report.evaluated);
        summary.classify = Some(report);

        self.persist(Stage::Classify, &matches);
        Ok(matches)
    }

    async fn sync(
        &self,
        listings: &[ClassifiedListing],
        run_date: &str,
        summary: &mut RunSummary,
    ) -> Result<(), StageAbort> {
        let sync = self
            .sync
            .as_ref()
            .ok_or_else(|| StageAbort::new(Stage::Sync, "no record store configured"))?;

        let report = sync
            .sync(listings, run_date)
            .await
            .map_err(|e| StageAbort::new(Stage::Sync, e.to_string()))?;
        summary.sync = Some(report);
        Ok(())
    }

    /// Input for `stage`: carried over from the previous stage in this run,
    /// or read back from that stage's snapshot
    fn input<T: DeserializeOwned>(
        &self,
        stage: Stage,
        carried: Option<Vec<T>>,
    ) -> Result<Vec<T>, StageAbort> {
        if let Some(items) = carried {
            return Ok(items);
        }

        let previous = stage
            .previous()
            .and_then(|p| p.snapshot_file())
            .ok_or_else(|| StageAbort::new(stage, "stage has no upstream snapshot"))?;
        let dir = self
            .snapshot_dir
            .as_ref()
            .ok_or_else(|| StageAbort::new(stage, "no snapshot directory configured"))?;

        let items = load_snapshot(dir, previous)
            .map_err(|e| StageAbort::new(stage, format!("cannot read input: {:#}", e)))?;
        info!("loaded {} records from {}", items.len(), previous);
        Ok(items)
    }

    fn persist<T: Serialize>(&self, stage: Stage, items: &[T]) {
        let (Some(dir), Some(file)) = (self.snapshot_dir.as_ref(), stage.snapshot_file()) else {
            return;
        };
        match save_snapshot(dir, file, items) {
            Ok(path) => info!("saved {} records to {}", items.len(), path.display()),
            Err(e) => warn!("could not save {} snapshot: {:#}", stage, e),
        }
    }
}
