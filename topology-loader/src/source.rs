//! Row sources and batch formation.
//!
//! Rows are read and grouped into transaction-sized batches on a blocking
//! worker, which hands them to the async commit path through a bounded
//! channel. The worker never runs more than [`BATCH_CHANNEL_CAPACITY`] batches
//! ahead of the consumer.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::LoaderError;

/// One input record: column name to raw value.
pub type RawRow = HashMap<String, String>;

/// Batches buffered between the reader and the committer.
pub const BATCH_CHANNEL_CAPACITY: usize = 2;

/// Where rows come from.
pub enum RowSource {
    /// A CSV file with a header row.
    Csv(PathBuf),
    /// CSV data from any reader.
    Reader(Box<dyn Read + Send>),
    /// Rows already in memory.
    Rows(Vec<RawRow>),
}

impl RowSource {
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self::Csv(path.into())
    }

    /// CSV held in a string, mostly for tests.
    pub fn csv_text(text: impl Into<String>) -> Self {
        Self::Reader(Box::new(std::io::Cursor::new(text.into().into_bytes())))
    }

    /// Start the batch worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn into_batches(self, batch_size: usize) -> BatchStream {
        let batch_size = batch_size.max(1);
        let (sender, receiver) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let worker = tokio::task::spawn_blocking(move || produce(self, batch_size, sender));
        BatchStream {
            receiver,
            worker: Some(worker),
        }
    }
}

impl fmt::Debug for RowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv(path) => f.debug_tuple("Csv").field(path).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::Rows(rows) => write!(f, "Rows({} rows)", rows.len()),
        }
    }
}

/// A group of rows committed in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowBatch {
    /// Zero-based position of the batch in the source.
    pub index: usize,
    pub rows: Vec<RawRow>,
    /// CSV records in this stretch of input that could not be decoded.
    pub malformed: usize,
}

impl RowBatch {
    fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.malformed == 0
    }
}

/// Receiving end of a batch worker.
pub struct BatchStream {
    receiver: mpsc::Receiver<Result<RowBatch, LoaderError>>,
    worker: Option<JoinHandle<()>>,
}

impl BatchStream {
    /// Next batch in input order, or `None` once the source is exhausted.
    pub async fn next(&mut self) -> Option<Result<RowBatch, LoaderError>> {
        if let Some(batch) = self.receiver.recv().await {
            return Some(batch);
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                return Some(Err(LoaderError::worker(e.to_string())));
            }
        }
        None
    }
}

type BatchSender = mpsc::Sender<Result<RowBatch, LoaderError>>;

struct Batcher {
    sender: BatchSender,
    batch_size: usize,
    current: RowBatch,
}

impl Batcher {
    fn new(sender: BatchSender, batch_size: usize) -> Self {
        Self {
            sender,
            batch_size,
            current: RowBatch::default(),
        }
    }

    /// Returns false once the consumer has gone away.
    fn push(&mut self, row: RawRow) -> bool {
        self.current.rows.push(row);
        if self.current.rows.len() >= self.batch_size {
            return self.flush();
        }
        true
    }

    fn malformed(&mut self) {
        self.current.malformed += 1;
    }

    fn flush(&mut self) -> bool {
        if self.current.is_empty() {
            return true;
        }
        let next = RowBatch {
            index: self.current.index + 1,
            ..RowBatch::default()
        };
        let batch = std::mem::replace(&mut self.current, next);
        debug!(batch = batch.index, rows = batch.rows.len(), "Formed batch");
        self.sender.blocking_send(Ok(batch)).is_ok()
    }

    fn fail(&self, err: LoaderError) {
        let _ = self.sender.blocking_send(Err(err));
    }
}

fn produce(source: RowSource, batch_size: usize, sender: BatchSender) {
    let mut batcher = Batcher::new(sender, batch_size);
    let result = match source {
        RowSource::Rows(rows) => {
            for row in rows {
                if !batcher.push(row) {
                    return;
                }
            }
            Ok(())
        }
        RowSource::Csv(path) => match File::open(&path) {
            Ok(file) => read_csv(file, &mut batcher),
            Err(e) => Err(LoaderError::source(format!(
                "cannot open {}: {}",
                path.display(),
                e
            ))),
        },
        RowSource::Reader(reader) => read_csv(reader, &mut batcher),
    };

    match result {
        Ok(()) => {
            batcher.flush();
        }
        Err(e) => batcher.fail(e),
    }
}

fn read_csv<R: Read>(reader: R, batcher: &mut Batcher) -> Result<(), LoaderError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    // Blank headers, e.g. from a trailing comma, map to `None` and are dropped.
    let headers: Vec<Option<String>> = csv_reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let header = if i == 0 {
                header.trim_start_matches('\u{feff}')
            } else {
                header
            };
            let header = header.trim();
            if header.is_empty() {
                warn!(column = i + 1, "Ignoring CSV column with a blank header");
                None
            } else {
                Some(header.to_string())
            }
        })
        .collect();

    for (line, record) in csv_reader.records().enumerate() {
        match record {
            Ok(record) => {
                let row: RawRow = headers
                    .iter()
                    .zip(record.iter())
                    .filter_map(|(header, value)| {
                        header.as_ref().map(|h| (h.clone(), value.to_string()))
                    })
                    .collect();
                if !batcher.push(row) {
                    return Ok(());
                }
            }
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                warn!(record = line + 1, error = %e, "Skipping malformed CSV record");
                batcher.malformed();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(source: RowSource, batch_size: usize) -> Vec<RowBatch> {
        let mut stream = source.into_batches(batch_size);
        let mut batches = Vec::new();
        while let Some(batch) = stream.next().await {
            batches.push(batch.unwrap());
        }
        batches
    }

    fn row(id: &str) -> RawRow {
        let mut row = RawRow::new();
        row.insert("Asset ID".to_string(), id.to_string());
        row
    }

    #[tokio::test]
    async fn test_rows_are_batched_in_order() {
        let rows = (1..=5).map(|i| row(&format!("D{}", i))).collect();
        let batches = collect(RowSource::Rows(rows), 2).await;

        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(batches[2].rows.len(), 1);
        assert_eq!(batches[2].rows[0]["Asset ID"], "D5");
    }

    #[tokio::test]
    async fn test_empty_source_yields_nothing() {
        assert!(collect(RowSource::Rows(vec![]), 10).await.is_empty());
        assert!(collect(RowSource::csv_text("Asset ID,Type\n"), 10)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_csv_headers_are_cleaned_and_records_flexible() {
        let text = "\u{feff}Asset ID , Type\nD1,Router\nD2\n";
        let batches = collect(RowSource::csv_text(text), 10).await;

        assert_eq!(batches.len(), 1);
        let rows = &batches[0].rows;
        assert_eq!(rows[0]["Asset ID"], "D1");
        assert_eq!(rows[0]["Type"], "Router");
        assert_eq!(rows[1]["Asset ID"], "D2");
        assert!(!rows[1].contains_key("Type"));
    }

    #[tokio::test]
    async fn test_blank_header_columns_are_dropped() {
        let text = "Asset ID,Port,\nD1,eth0,\nD2,eth1,stray\n";
        let batches = collect(RowSource::csv_text(text), 10).await;

        let rows = &batches[0].rows;
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert!(!row.contains_key(""));
            assert_eq!(row.len(), 2);
        }
        assert_eq!(rows[1]["Port"], "eth1");
    }

    #[tokio::test]
    async fn test_invalid_utf8_record_is_counted() {
        let mut bytes = b"Asset ID\nD1\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"D3\n");
        let batches = collect(RowSource::Reader(Box::new(std::io::Cursor::new(bytes))), 10).await;

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows.len(), 2);
        assert_eq!(batches[0].malformed, 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_source_error() {
        let mut stream = RowSource::csv("/nonexistent/devices.csv").into_batches(10);
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(LoaderError::Source(_))));
        assert!(stream.next().await.is_none());
    }
}
