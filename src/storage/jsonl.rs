//! JSONL (JSON Lines) storage.
//!
//! Each line is a valid JSON object representing one row.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::StorageError;

/// Persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    MatchRecords,
    PlayerMatchStats,
    SyncCursors,
}

impl Collection {
    /// Get the filename for this collection.
    pub fn filename(&self) -> &'static str {
        match self {
            Collection::MatchRecords => "match_records.jsonl",
            Collection::PlayerMatchStats => "player_match_stats.jsonl",
            Collection::SyncCursors => "sync_cursors.jsonl",
        }
    }
}

/// JSONL file writer.
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    /// Create a new JSONL writer for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Ensure the parent directory exists.
    fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append a single row to the file.
    ///
    /// A file left ending mid-line by an interrupted write gets a newline
    /// first, so the new row never merges into the torn one.
    pub fn append(&self, row: &T) -> Result<(), StorageError> {
        self.ensure_dir()?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        let mut line = String::new();
        if ends_mid_line(&mut file)? {
            warn!("{:?} ends with a partial line, starting a new one", self.path);
            line.push('\n');
        }

        // One write call per line so a crash cannot interleave half rows.
        line.push_str(&serde_json::to_string(row)?);
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!("Appended row to {:?}", self.path);
        Ok(())
    }

    /// Replace the file contents.
    ///
    /// `preserved` lines (rows that failed to parse on read) are written
    /// back verbatim after the rows. Everything goes to a sibling temp file
    /// which is then renamed over the original, so readers see either the
    /// old or the new contents.
    pub fn write_all(&self, rows: &[T], preserved: &[String]) -> Result<usize, StorageError> {
        self.ensure_dir()?;

        let tmp_path = self.path.with_extension("jsonl.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        let mut count = 0;

        for row in rows {
            let json = serde_json::to_string(row)?;
            writeln!(writer, "{}", json)?;
            count += 1;
        }
        for line in preserved {
            writeln!(writer, "{}", line)?;
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(&tmp_path, &self.path)?;

        debug!("Wrote {} rows to {:?}", count, self.path);
        Ok(count)
    }
}

/// Whether a non-empty file lacks a trailing newline.
fn ends_mid_line(file: &mut File) -> Result<bool, StorageError> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// JSONL file reader.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// Create a new JSONL reader for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Read all rows from the file, skipping lines that fail to parse.
    pub fn read_all(&self) -> Result<Vec<T>, StorageError> {
        Ok(self.read_all_with_rejects()?.0)
    }

    /// Read all rows, also returning the raw lines that failed to parse.
    pub fn read_all_with_rejects(&self) -> Result<(Vec<T>, Vec<String>), StorageError> {
        if !self.path.exists() {
            return Ok((Vec::new(), Vec::new()));
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut rows = Vec::new();
        let mut rejected = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str(&line) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!("Failed to parse line {} in {:?}: {}", idx + 1, self.path, e);
                    rejected.push(line);
                }
            }
        }

        debug!("Read {} rows from {:?}", rows.len(), self.path);
        Ok((rows, rejected))
    }

    /// Read rows matching a predicate.
    pub fn read_where<F>(&self, predicate: F) -> Result<Vec<T>, StorageError>
    where
        F: Fn(&T) -> bool,
    {
        let all = self.read_all()?;
        Ok(all.into_iter().filter(predicate).collect())
    }
}
