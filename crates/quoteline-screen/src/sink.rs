//! Persistence sinks for snapshots.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::record::Snapshot;

/// Writes a snapshot somewhere durable; `label` distinguishes outputs of
/// the same run (full table vs. screened subset).
pub trait PersistenceSink {
    fn write(&self, snapshot: &Snapshot, label: &str) -> io::Result<PathBuf>;
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// CSV files named `YYYY_MM_DD_HH_MM_<label>.csv`, UTF-8 with BOM so
/// spreadsheet tools pick up CJK names. Written to `*.tmp` then renamed.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_name(label: &str) -> String {
        format!("{}_{label}.csv", chrono::Local::now().format("%Y_%m_%d_%H_%M"))
    }
}

impl PersistenceSink for CsvSink {
    fn write(&self, snapshot: &Snapshot, label: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let filename = Self::file_name(label);
        let final_path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!("{filename}.tmp"));

        let mut out = BufWriter::new(File::create(&tmp_path)?);
        out.write_all(UTF8_BOM)?;
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(snapshot.columns())?;
        for record in snapshot {
            writer.write_record(record.values().iter().map(ToString::to_string))?;
        }
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp_path, &final_path)?;
        log::info!("Wrote {} rows to {}", snapshot.len(), final_path.display());
        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldValue, NormalizedRecord};
    use std::sync::Arc;

    #[test]
    fn writes_bom_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let cols: Arc<[String]> = Arc::from(vec!["stockName".to_string(), "stockCode".to_string()]);
        let rec = NormalizedRecord::new(
            cols.clone(),
            1,
            vec![FieldValue::Text("浦发银行".into()), FieldValue::Text("sh600000".into())],
        );
        let snapshot = Snapshot::new(cols, 1, vec![rec]);

        let path = CsvSink::new(dir.path().join("out")).write(&snapshot, "stock").unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_stock.csv"), "{name}");
        assert_eq!(name.len(), "YYYY_MM_DD_HH_MM_stock.csv".len());

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(text, "stockName,stockCode\n浦发银行,sh600000\n");
        assert!(!path.with_extension("csv.tmp").exists());
    }
}
