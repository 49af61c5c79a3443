//! Append-only JSON Lines files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// One JSON object per line, flushed after every batch.
pub struct JsonlWriter {
    writer: BufWriter<File>,
}

impl JsonlWriter {
    /// Open (or create) `path` for appending, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Append every record, then flush.
    pub fn append<'r, T, I>(&mut self, records: I) -> Result<()>
    where
        T: Serialize + 'r,
        I: IntoIterator<Item = &'r T>,
    {
        for record in records {
            let json = serde_json::to_string(record)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(self.writer, "{json}")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
