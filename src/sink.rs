//! Persistence for finished runs: CSV + JSON + a plain-text summary report.
//!
//! The engine hands a finalized canonical set to a sink and is done; any
//! caching of intermediate payloads or alternative storage formats belongs
//! behind this trait, not in the traversal pipeline.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::core::types::{CanonicalRecord, RunSummary};

#[derive(Debug, Clone)]
pub struct SinkPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
    pub report: PathBuf,
}

pub trait PersistenceSink {
    fn write(&self, records: &[CanonicalRecord]) -> Result<SinkPaths>;
}

/// Writes `<dir>/<basename>.{csv,json,report.txt}`.
pub struct FileSink {
    dir: PathBuf,
    basename: Option<String>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            basename: None,
        }
    }

    /// Fixed basename instead of the default timestamped one.
    pub fn with_basename(mut self, basename: &str) -> Self {
        self.basename = Some(basename.to_string());
        self
    }

    fn resolve_basename(&self) -> String {
        self.basename
            .clone()
            .unwrap_or_else(|| format!("facilities_{}", Local::now().format("%Y%m%d_%H%M%S")))
    }
}

/// Quote a CSV field when it carries a delimiter, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_csv(path: &Path, records: &[CanonicalRecord]) -> Result<()> {
    let mut out = fs::File::create(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    // UTF-8 BOM so spreadsheet tools pick up CJK names correctly.
    out.write_all(b"\xEF\xBB\xBF")?;
    writeln!(
        out,
        "index,name,latitude,longitude,region,first_seen_source,duplicate_count"
    )?;
    for record in records {
        writeln!(
            out,
            "{},{},{:.6},{:.6},{},{},{}",
            record.sequence_index + 1,
            csv_escape(&record.name),
            record.latitude,
            record.longitude,
            csv_escape(&record.region),
            csv_escape(&record.first_seen_source),
            record.duplicate_count
        )?;
    }
    Ok(())
}

fn write_report(path: &Path, records: &[CanonicalRecord]) -> Result<()> {
    let summary = RunSummary::from_records(records);
    let mut out = String::new();

    out.push_str("Facility harvest report\n");
    out.push_str("=======================\n\n");
    out.push_str(&format!(
        "generated: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("{}\n", summary));

    let mut by_region: std::collections::BTreeMap<&str, Vec<&CanonicalRecord>> =
        std::collections::BTreeMap::new();
    for record in records {
        by_region.entry(record.region.as_str()).or_default().push(record);
    }

    for (region, group) in by_region {
        out.push_str(&format!("\n{} ({} facilities)\n", region, group.len()));
        for record in group {
            out.push_str(&format!(
                "  {:>3}. {} ({:.6}, {:.6}) via {}\n",
                record.sequence_index + 1,
                record.name,
                record.latitude,
                record.longitude,
                record.first_seen_source
            ));
        }
    }

    fs::write(path, out).with_context(|| format!("cannot write {}", path.display()))
}

impl PersistenceSink for FileSink {
    fn write(&self, records: &[CanonicalRecord]) -> Result<SinkPaths> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create {}", self.dir.display()))?;

        let basename = self.resolve_basename();
        let paths = SinkPaths {
            csv: self.dir.join(format!("{}.csv", basename)),
            json: self.dir.join(format!("{}.json", basename)),
            report: self.dir.join(format!("{}.report.txt", basename)),
        };

        write_csv(&paths.csv, records)?;

        let json = serde_json::to_string_pretty(records)?;
        fs::write(&paths.json, json)
            .with_context(|| format!("cannot write {}", paths.json.display()))?;

        write_report(&paths.report, records)?;

        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, name: &str, region: &str) -> CanonicalRecord {
        CanonicalRecord {
            coordinate_key: (312304 + index as i64, 1214737),
            latitude: 31.2304 + index as f64 * 0.01,
            longitude: 121.4737,
            name: name.to_string(),
            region: region.to_string(),
            first_seen_source: "parametric:page1".to_string(),
            sequence_index: index,
            duplicate_count: 0,
        }
    }

    #[test]
    fn csv_fields_with_delimiters_are_quoted() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn sink_writes_all_three_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).with_basename("test_run");
        let records = vec![
            record(0, "Telecom Info Park IDC", "Huangpu"),
            record(1, "Harbor, East", "Pudong"),
        ];

        let paths = sink.write(&records).unwrap();
        assert!(paths.csv.exists());
        assert!(paths.json.exists());
        assert!(paths.report.exists());

        let csv = std::fs::read_to_string(&paths.csv).unwrap();
        assert!(csv.contains("Telecom Info Park IDC"));
        assert!(csv.contains("\"Harbor, East\""));

        let json: Vec<CanonicalRecord> =
            serde_json::from_str(std::fs::read_to_string(&paths.json).unwrap().trim_start_matches('\u{feff}'))
                .unwrap();
        assert_eq!(json.len(), 2);

        let report = std::fs::read_to_string(&paths.report).unwrap();
        assert!(report.contains("Huangpu (1 facilities)"));
    }

    #[test]
    fn empty_record_set_still_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).with_basename("empty_run");
        let paths = sink.write(&[]).unwrap();
        let csv = std::fs::read_to_string(&paths.csv).unwrap();
        assert!(csv.contains("index,name"));
    }
}
