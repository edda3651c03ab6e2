//! Append-only JSON-lines journal of result records.
//!
//! Each successful dataset appends one line. [`ResultJournal::sync`] flushes
//! and fsyncs, so a crash loses at most the records since the last
//! checkpoint. At the end of a run the journal is compacted into the results
//! table; records from earlier runs stay in the journal and are carried into
//! the table too.

use super::types::ResultRecord;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tsadbench_core::Result;

/// Open journal accepting appends.
pub struct ResultJournal {
    writer: BufWriter<File>,
    appended: usize,
}

impl ResultJournal {
    /// Open `path` for appending, creating it if needed.
    ///
    /// A trailing partial line left by an interrupted write is terminated so
    /// the next record starts on its own line.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let needs_newline = file.metadata()?.len() > 0 && !ends_with_newline(&mut file)?;
        let mut writer = BufWriter::new(file);
        if needs_newline {
            writer.write_all(b"\n")?;
        }
        Ok(Self {
            writer,
            appended: 0,
        })
    }

    /// Records appended through this handle.
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Buffer one record. Durable only after the next [`sync`](Self::sync).
    pub fn append(&mut self, record: &ResultRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.appended += 1;
        Ok(())
    }

    /// Flush buffered records and sync them to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Sync and close.
    pub fn finish(mut self) -> Result<()> {
        self.sync()
    }

    /// Read every parsable record in file order. A missing journal is empty.
    pub fn read_all(path: &Path) -> Result<Vec<ResultRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ResultRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    journal = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping unreadable journal line"
                ),
            }
        }
        Ok(records)
    }

    /// One record per file, the last written winning, in order of first
    /// appearance.
    pub fn compact(path: &Path) -> Result<Vec<ResultRecord>> {
        Ok(dedupe_last_wins(Self::read_all(path)?))
    }
}

fn ends_with_newline(file: &mut File) -> Result<bool> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn dedupe_last_wins(records: Vec<ResultRecord>) -> Vec<ResultRecord> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ResultRecord> = Vec::new();
    for record in records {
        match slots.get(&record.file) {
            Some(&idx) => out[idx] = record,
            None => {
                slots.insert(record.file.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tsadbench_core::MetricSet;

    fn record(file: &str, vus_pr: f64) -> ResultRecord {
        let mut metrics = MetricSet::new();
        metrics.insert("VUS-PR", vus_pr);
        ResultRecord {
            file: file.to_string(),
            time: 0.1,
            data_length: 10,
            num_features: 1,
            num_anomalies: 1,
            anomaly_ratio: 0.1,
            sliding_window: 5,
            metrics,
        }
    }

    #[test]
    fn test_append_sync_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("j.jsonl");
        let mut journal = ResultJournal::open(&path).unwrap();
        journal.append(&record("a.csv", 0.1)).unwrap();
        journal.append(&record("b.csv", 0.2)).unwrap();
        journal.sync().unwrap();
        assert_eq!(journal.appended(), 2);

        let records = ResultJournal::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].file, "b.csv");
        journal.finish().unwrap();
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("j.jsonl");
        let mut first = ResultJournal::open(&path).unwrap();
        first.append(&record("a.csv", 0.1)).unwrap();
        first.finish().unwrap();

        let mut second = ResultJournal::open(&path).unwrap();
        second.append(&record("b.csv", 0.2)).unwrap();
        second.finish().unwrap();

        let files: Vec<String> = ResultJournal::read_all(&path)
            .unwrap()
            .into_iter()
            .map(|r| r.file)
            .collect();
        assert_eq!(files, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_partial_line_is_terminated_and_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("j.jsonl");
        std::fs::write(&path, "{\"file\":\"trunc").unwrap();

        let mut journal = ResultJournal::open(&path).unwrap();
        journal.append(&record("a.csv", 0.1)).unwrap();
        journal.finish().unwrap();

        let records = ResultJournal::read_all(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file, "a.csv");
    }

    #[test]
    fn test_compact_last_record_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("j.jsonl");
        let mut journal = ResultJournal::open(&path).unwrap();
        journal.append(&record("a.csv", 0.1)).unwrap();
        journal.append(&record("b.csv", 0.2)).unwrap();
        journal.append(&record("a.csv", 0.9)).unwrap();
        journal.finish().unwrap();

        let compacted = ResultJournal::compact(&path).unwrap();
        assert_eq!(compacted.len(), 2);
        assert_eq!(compacted[0].file, "a.csv");
        assert_eq!(compacted[0].metric("VUS-PR"), 0.9);
        assert_eq!(compacted[1].file, "b.csv");
    }

    #[test]
    fn test_missing_journal_reads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(ResultJournal::read_all(&dir.path().join("none.jsonl"))
            .unwrap()
            .is_empty());
    }
}
