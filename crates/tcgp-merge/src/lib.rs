//! Streaming merge of per-group price CSVs into one de-duplicated file.
//!
//! Files are read one after another in the order given. The output header is
//! the first-seen-order union of every input header, and each
//! `productId`/`groupId` pair survives exactly once: the last row read for
//! that pair wins, while its position stays where the pair was first seen.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CRATE_NAME: &str = "tcgp-merge";

pub const PRODUCT_ID_COLUMN: &str = "productId";
pub const GROUP_ID_COLUMN: &str = "groupId";
pub const KEY_SEPARATOR: char = '_';

const BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no input files to merge")]
    NoInputs,
    #[error("failed reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed writing {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Ordered, non-empty list of files to merge. Later entries override earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInputs(Vec<PathBuf>);

impl MergeInputs {
    pub fn new(paths: Vec<PathBuf>) -> Result<Self, MergeError> {
        if paths.is_empty() {
            return Err(MergeError::NoInputs);
        }
        Ok(Self(paths))
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub files: usize,
    pub input_rows: usize,
    pub output_rows: usize,
    pub columns: usize,
    pub rows_missing_key: usize,
}

pub fn composite_key(product_id: &str, group_id: &str) -> String {
    format!("{product_id}{KEY_SEPARATOR}{group_id}")
}

// rightmost match, so duplicate key columns agree with the value that lands in the row
fn last_position(headers: &StringRecord, column: &str) -> Option<usize> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, h)| *h == column)
        .map(|(i, _)| i)
        .last()
}

/// Accumulation state for a single merge call.
#[derive(Debug, Default)]
struct MergeState {
    columns: IndexSet<String>,
    // values are positioned by column index; rows read before a column
    // existed are simply shorter
    rows: IndexMap<String, Vec<String>>,
    stats: MergeStats,
}

impl MergeState {
    fn absorb_file(&mut self, path: &Path) -> Result<(), MergeError> {
        let read_err = |source: csv::Error| MergeError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(read_err)?;

        let headers = reader.headers().map_err(read_err)?.clone();
        let positions: Vec<usize> = headers
            .iter()
            .map(|name| self.columns.insert_full(name.to_string()).0)
            .collect();

        let product_pos = last_position(&headers, PRODUCT_ID_COLUMN);
        let group_pos = last_position(&headers, GROUP_ID_COLUMN);
        let key_complete = product_pos.is_some() && group_pos.is_some();
        if !key_complete {
            warn!(
                path = %path.display(),
                "missing {PRODUCT_ID_COLUMN} or {GROUP_ID_COLUMN} column; rows will share a degraded key"
            );
        }

        let width = positions.iter().copied().max().map_or(0, |m| m + 1);
        let mut record = StringRecord::new();
        let mut file_rows = 0usize;
        while reader.read_record(&mut record).map_err(read_err)? {
            file_rows += 1;
            let product_id = product_pos.and_then(|i| record.get(i));
            let group_id = group_pos.and_then(|i| record.get(i));
            if product_id.is_none() || group_id.is_none() {
                self.stats.rows_missing_key += 1;
            }
            let key = composite_key(
                product_id.unwrap_or_default(),
                group_id.unwrap_or_default(),
            );

            let mut row = vec![String::new(); width];
            for (value, &pos) in record.iter().zip(&positions) {
                row[pos] = value.to_string();
            }

            self.rows.insert(key, row);
        }

        debug!(path = %path.display(), rows = file_rows, "absorbed file");
        self.stats.files += 1;
        self.stats.input_rows += file_rows;
        Ok(())
    }

    fn write_to(mut self, output: &Path) -> Result<MergeStats, MergeError> {
        let write_err = |source: csv::Error| MergeError::Write {
            path: output.to_path_buf(),
            source,
        };

        let file = File::create(output).map_err(|e| write_err(e.into()))?;
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(BufWriter::with_capacity(BUFFER_SIZE, file));

        writer.write_record(&self.columns).map_err(write_err)?;

        let width = self.columns.len();
        for row in self.rows.values() {
            let padded = row
                .iter()
                .map(String::as_str)
                .chain(std::iter::repeat("").take(width - row.len()));
            writer.write_record(padded).map_err(write_err)?;
        }

        let mut inner = writer
            .into_inner()
            .map_err(|e| write_err(e.into_error().into()))?;
        inner.flush().map_err(|e| write_err(e.into()))?;

        self.stats.output_rows = self.rows.len();
        self.stats.columns = width;
        Ok(self.stats)
    }
}

/// Merge `inputs` into a single CSV at `output`, creating or truncating it.
///
/// Any read failure aborts the merge before `output` is touched. On a write
/// failure `output` may be left empty or partial.
pub fn merge_csv_files(inputs: &MergeInputs, output: &Path) -> Result<MergeStats, MergeError> {
    let mut state = MergeState::default();
    for path in inputs.paths() {
        state.absorb_file(path)?;
    }

    let stats = state.write_to(output)?;
    info!(
        output = %output.display(),
        files = stats.files,
        input_rows = stats.input_rows,
        output_rows = stats.output_rows,
        columns = stats.columns,
        "merged and normalized csv"
    );
    Ok(stats)
}
