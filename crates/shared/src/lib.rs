// Public modules
pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod io;
pub mod judge;
pub mod models;
pub mod pipeline;
pub mod renderer;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use classifier::{decode_verdict, Classifier, Verdict};
pub use config::{load_sources, Config, Settings};
pub use extractor::ListingExtractor;
pub use filter::{KeywordRules, RuleFilter};
pub use io::{get_default_snapshot_dir, load_snapshot, save_snapshot};
pub use judge::{OpenAiJudge, SemanticJudge};
pub use models::{ClassifiedListing, FilteredListing, RawListing, SyncedRecord};
pub use pipeline::{Pipeline, RunScope, RunSummary, Stage};
pub use renderer::{HttpRenderer, PageRenderer};
pub use store::{AirtableStore, RecordStore};
pub use sync::{run_timestamp, FixedDelay, SyncManager, Throttle};
