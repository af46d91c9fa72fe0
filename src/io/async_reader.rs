//! Asynchronous CSV reader with batch interface
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of ReplayRecords
//!                  ↓
//!           csv_format module
//!           (CsvRecord, convert_csv_record)
//! ```

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::ReplayRecord;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous CSV reader over replay rows
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    line_num: usize,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Create a new AsyncReader from an async reader
    ///
    /// # Arguments
    ///
    /// * `reader` - Async reader providing CSV data
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            line_num: 1,
        }
    }

    /// Read up to `batch_size` valid replay rows
    ///
    /// Malformed rows are logged and skipped; they do not count towards the
    /// batch size.
    ///
    /// # Returns
    ///
    /// The converted rows in file order. An empty vector means the end of
    /// the file was reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<ReplayRecord> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CsvRecord>();

        while batch.len() < batch_size {
            let Some(next) = records.next().await else {
                break;
            };
            self.line_num += 1;
            match next {
                Ok(csv_record) => match convert_csv_record(csv_record) {
                    Ok(record) => batch.push(record),
                    Err(e) => warn!(line = self.line_num, error = %e, "skipping malformed row"),
                },
                Err(e) => warn!(line = self.line_num, error = %e, "CSV parse error"),
            }
        }

        batch
    }
}
