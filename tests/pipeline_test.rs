//! End-to-end pipeline tests: scripted retrievers through extraction,
//! classification, reconciliation, and the file sink. No network, no browser.

use async_trait::async_trait;
use facility_scout::retrieve::{FetchOutcome, PageRetriever};
use facility_scout::traverse::{TraversalController, Termination};
use facility_scout::{
    CanonicalRecord, FileSink, PersistenceSink, RegionClassifier, RunSummary,
};

struct SinglePageRetriever {
    payload: String,
    served: bool,
}

impl SinglePageRetriever {
    fn new(payload: &str) -> Self {
        Self {
            payload: payload.to_string(),
            served: false,
        }
    }
}

#[async_trait]
impl PageRetriever for SinglePageRetriever {
    fn mechanism(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&mut self, _page_index: u32) -> FetchOutcome {
        if self.served {
            return FetchOutcome::NoPage;
        }
        self.served = true;
        FetchOutcome::Page(self.payload.clone())
    }
}

fn run_pipeline(payload: &str, precision: u32) -> Vec<CanonicalRecord> {
    let controller = TraversalController::new(
        RegionClassifier::default(),
        precision,
        vec![Box::new(SinglePageRetriever::new(payload))],
    )
    .with_page_count_override(1);

    tokio_test::block_on(controller.run(None)).records
}

#[test]
fn mixed_encoding_duplicate_collapses_to_one_record() {
    // The same facility encoded as an embedded JSON object and again as a
    // coordinate-bearing DOM element, with sub-precision jitter.
    let payload = r#"
        <script>
            window.__DATA__ = {"latitude": 31.2304, "longitude": 121.4737, "name": "Example IDC"};
        </script>
        <div class="list-item" data-lat="31.23041" data-lng="121.47371">Example IDC</div>
    "#;

    let records = run_pipeline(payload, 4);
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.coordinate_key, (312304, 1214737));
    assert_eq!(record.name, "Example IDC");
    assert_eq!(record.sequence_index, 0);
    assert_eq!(record.duplicate_count, 1);
    assert_eq!(record.region, "Huangpu");
}

#[test]
fn out_of_region_coordinates_never_reach_the_canonical_set() {
    let payload = r#"
        {"latitude": 31.2304, "longitude": 121.4737, "name": "Kept IDC"}
        {"latitude": 39.9042, "longitude": 116.4074, "name": "Beijing IDC"}
        {"latitude": 31.55, "longitude": 121.0, "name": "Kunshan IDC"}
    "#;

    let records = run_pipeline(payload, 4);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "Kept IDC");
}

#[test]
fn traversal_stops_at_mechanism_exhaustion_despite_larger_total() {
    struct TwoPages {
        calls: u32,
    }

    #[async_trait]
    impl PageRetriever for TwoPages {
        fn mechanism(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(&mut self, page_index: u32) -> FetchOutcome {
            self.calls += 1;
            match page_index {
                1 => FetchOutcome::Page(
                    r#"{"latitude": 31.2304, "longitude": 121.4737}"#.to_string(),
                ),
                2 => FetchOutcome::Page(
                    r#"{"latitude": 31.2989, "longitude": 121.5015}"#.to_string(),
                ),
                _ => FetchOutcome::NoPage,
            }
        }
    }

    let controller = TraversalController::new(
        RegionClassifier::default(),
        4,
        vec![Box::new(TwoPages { calls: 0 })],
    )
    .with_page_count_override(50);

    let report = tokio_test::block_on(controller.run(None));
    assert_eq!(report.termination, Termination::Exhausted);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.records.len(), 2);
}

#[test]
fn pipeline_output_round_trips_through_the_sink() {
    let payload = r#"
        {"latitude": 31.2304, "longitude": 121.4737, "name": "Telecom Info Park IDC"}
        {"latitude": 31.1993, "longitude": 121.5951, "name": "East Cloud Campus IDC"}
    "#;
    let records = run_pipeline(payload, 4);
    assert_eq!(records.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let sink = FileSink::new(dir.path()).with_basename("pipeline");
    let paths = sink.write(&records).unwrap();

    let json: Vec<CanonicalRecord> =
        serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(json.len(), 2);
    assert_eq!(json[0].name, "Telecom Info Park IDC");
    assert_eq!(json[1].region, "Pudong");

    let summary = RunSummary::from_records(&json);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.per_region.get("Pudong"), Some(&1));
}
