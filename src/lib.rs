pub mod browser;
pub mod core;
pub mod extract;
pub mod geo;
pub mod net;
pub mod reconcile;
pub mod retrieve;
pub mod seeds;
pub mod sink;
pub mod traverse;

// --- Primary exports ---
pub use self::core::config::{load_config, HarvestConfig};
pub use self::core::error::EngineError;
pub use self::core::types::{
    coordinate_key, CandidateRecord, CanonicalRecord, ClusterMarker, CoordinateKey, RunSummary,
    ValidatedRecord,
};
pub use extract::{PatternExtractor, Recognizer};
pub use geo::{Classification, RegionClassifier, RegionTables};
pub use reconcile::Reconciler;
pub use retrieve::{FetchOutcome, PageRetriever};
pub use sink::{FileSink, PersistenceSink, SinkPaths};
pub use traverse::{
    harvest_targets, run_target, BrowserPolicy, CancelHandle, HarvestTarget, Termination,
    TraversalController, TraversalReport,
};
