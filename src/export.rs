// JSON Lines export
//
// One JSON object per line, each with an added `local_datetime` field
// rendered at the configured UTC offset.

use chrono::{DateTime, FixedOffset, Utc};
use logsweep_core::{Collection, ExportError, ExportSink, FilterSet, Record};
use serde_json::Value;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

const FILE_PREFIX: &str = "Events";
const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes a collection to `<dir>/<name>.jsonl`.
pub struct JsonLinesSink {
    dir: PathBuf,
    offset: FixedOffset,
    filters: FilterSet,
}

impl JsonLinesSink {
    /// `filters` are the ones the run started with; they only shape the file name.
    pub fn new(dir: impl AsRef<Path>, offset: FixedOffset, filters: FilterSet) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            offset,
            filters,
        }
    }

    /// File name for an export created at `now`, e.g.
    /// `Events_example_com_Rule_6179ae15_Countries_CN_HK_20250620_120000.jsonl`.
    pub fn file_name(&self, now: DateTime<FixedOffset>) -> String {
        let mut parts = vec![FILE_PREFIX.to_string()];

        if let Some(host) = self.filters.host() {
            parts.push(sanitize(host));
        }
        if let Some(rule_id) = self.filters.rule_id() {
            let short: String = rule_id.chars().take(8).collect();
            parts.push(format!("Rule_{}", sanitize(&short)));
        }
        let countries = self.filters.countries();
        if !countries.is_empty() {
            let joined = countries.iter().map(String::as_str).collect::<Vec<_>>().join("_");
            parts.push(format!("Countries_{}", joined));
        }

        parts.push(now.format("%Y%m%d_%H%M%S").to_string());
        format!("{}.jsonl", parts.join("_"))
    }

    fn with_local_time(&self, record: &Record) -> Record {
        let mut record = record.clone();
        if let Value::Object(fields) = &mut record {
            let local = fields
                .get("datetime")
                .and_then(Value::as_str)
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&self.offset).format(LOCAL_FORMAT).to_string());
            if let Some(local) = local {
                fields.insert("local_datetime".to_string(), Value::String(local));
            }
        }
        record
    }

    fn write_records<W: Write>(&self, writer: W, records: &[Record]) -> Result<(), ExportError> {
        let mut writer = BufWriter::new(writer);
        for record in records {
            serde_json::to_writer(&mut writer, &self.with_local_time(record))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Records go to a temporary file in the target directory, renamed into
    /// place only once complete. On any error the temporary file is removed.
    fn export_at(
        &self,
        collection: &Collection,
        now: DateTime<FixedOffset>,
    ) -> Result<Option<PathBuf>, ExportError> {
        if collection.is_empty() {
            info!("No matching records; nothing to export");
            return Ok(None);
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(self.file_name(now));

        let mut staged = NamedTempFile::new_in(&self.dir)?;
        self.write_records(staged.as_file_mut(), &collection.records)?;
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|e| e.error)?;

        info!(
            path = %path.display(),
            records = collection.len(),
            "Export written"
        );
        Ok(Some(path))
    }
}

impl ExportSink for JsonLinesSink {
    fn export(&self, collection: &Collection) -> Result<Option<PathBuf>, ExportError> {
        self.export_at(collection, Utc::now().with_timezone(&self.offset))
    }
}

/// Keep file names portable: anything but ASCII alphanumerics and `-` becomes `_`.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logsweep_core::RunStatistics;
    use serde_json::json;
    use std::time::Duration;

    fn stats(records: usize) -> RunStatistics {
        RunStatistics {
            intervals: 1,
            windows: 1,
            total_requests: 1,
            total_records: records as u64,
            failed_intervals: 0,
            exhausted_queries: 0,
            truncated_windows: 0,
            plan_lookups: 1,
            cache_hits: 0,
            disabled_filters: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    fn utc8() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn test_file_name_reflects_filters() {
        let filters = FilterSet::new()
            .with_host("example.com")
            .with_rule_id("6179ae15870a4bb7b2d480d4843b323c")
            .with_countries(["HK", "CN"]);
        let sink = JsonLinesSink::new("out", utc8(), filters);
        let now = utc8().with_ymd_and_hms(2025, 6, 20, 12, 0, 0).unwrap();

        assert_eq!(
            sink.file_name(now),
            "Events_example_com_Rule_6179ae15_Countries_CN_HK_20250620_120000.jsonl"
        );

        let bare = JsonLinesSink::new("out", utc8(), FilterSet::new());
        assert_eq!(bare.file_name(now), "Events_20250620_120000.jsonl");
    }

    #[test]
    fn test_export_writes_one_line_per_record_with_local_time() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path().join("nested"), utc8(), FilterSet::new());
        let collection = Collection {
            records: vec![
                json!({ "rayName": "a1", "datetime": "2025-06-20T00:30:00Z" }),
                json!({ "rayName": "a2", "datetime": "not a timestamp" }),
            ],
            stats: stats(2),
        };

        let path = sink.export(&collection).unwrap().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["local_datetime"], "2025-06-20 08:30:00");
        assert!(lines[1].get("local_datetime").is_none());
        assert_eq!(lines[1]["rayName"], "a2");
    }

    #[test]
    fn test_empty_collection_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let sink = JsonLinesSink::new(&out, utc8(), FilterSet::new());
        let collection = Collection {
            records: Vec::new(),
            stats: stats(0),
        };

        assert!(sink.export(&collection).unwrap().is_none());
        assert!(!out.exists());
    }

    /// Accepts `limit` bytes, then fails like a full disk.
    struct FullDisk {
        limit: usize,
        written: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.written + buf.len() > self.limit {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left"));
            }
            self.written += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn three_records() -> Collection {
        Collection {
            records: (0..3)
                .map(|i| json!({ "rayName": format!("r{}", i), "datetime": "2025-06-20T00:30:00Z" }))
                .collect(),
            stats: stats(3),
        }
    }

    fn regular_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.is_file())
            .collect()
    }

    #[test]
    fn test_write_error_is_reported() {
        let sink = JsonLinesSink::new("out", utc8(), FilterSet::new());
        let disk = FullDisk {
            limit: 16,
            written: 0,
        };

        let err = sink.write_records(disk, &three_records().records).unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
    }

    #[test]
    fn test_failed_export_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path(), utc8(), FilterSet::new());
        let now = utc8().with_ymd_and_hms(2025, 6, 20, 12, 0, 0).unwrap();

        // A directory squatting on the export name makes the final rename fail.
        fs::create_dir(dir.path().join(sink.file_name(now))).unwrap();

        assert!(sink.export_at(&three_records(), now).is_err());
        assert!(regular_files(dir.path()).is_empty());
    }

    #[test]
    fn test_export_leaves_only_the_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path(), utc8(), FilterSet::new());
        let now = utc8().with_ymd_and_hms(2025, 6, 20, 12, 0, 0).unwrap();

        let path = sink.export_at(&three_records(), now).unwrap().unwrap();
        assert_eq!(regular_files(dir.path()), vec![path.clone()]);
        assert_eq!(fs::read_to_string(path).unwrap().lines().count(), 3);
    }
}
