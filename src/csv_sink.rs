use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::record::{BusinessRecord, COLUMNS};

/// CSV output with the fixed column header.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl CsvSink<File> {
    /// Open `path` for appending. The header is written only when the file
    /// is new or empty, so rows accumulate across runs like the dataset.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let fresh = file.metadata()?.len() == 0;
        Self::start(file, fresh)
    }
}

impl<W: Write> CsvSink<W> {
    /// New output that begins with the header row.
    pub fn new(inner: W) -> Result<Self> {
        Self::start(inner, true)
    }

    fn start(inner: W, header: bool) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        if header {
            writer.write_record(COLUMNS.iter().map(|f| f.title()))?;
            writer.flush()?;
        }
        Ok(Self { writer, rows: 0 })
    }

    /// Write one row and flush it.
    pub fn append(&mut self, record: &BusinessRecord) -> Result<()> {
        self.writer.write_record(record.csv_row())?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Rows appended through this sink.
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[cfg(test)]
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))
    }
}
