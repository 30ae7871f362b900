//! JSON Lines output.
//!
//! The record store is newline-delimited JSON: one serialized item per line,
//! so it can be appended to across runs and read back line by line.

use serde::Serialize;
use std::io::{self, Write};

/// A writer that serializes one item per line.
pub struct JsonlWriter<W: Write> {
    writer: W,
    items_written: usize,
}

impl<W: Write> JsonlWriter<W> {
    /// Create a new JSONL writer over any `Write` (file, stdout, buffer).
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            items_written: 0,
        }
    }

    /// Write a single item followed by a newline.
    ///
    /// The item is serialized before anything reaches the writer, so a
    /// value serde rejects fails with `InvalidData` and leaves no partial
    /// line behind.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        let mut line =
            serde_json::to_vec(item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.items_written += 1;
        Ok(())
    }

    /// Write multiple items, one per line.
    ///
    /// Items that cannot be serialized are logged and skipped; the rest are
    /// still written. Returns how many were written. Stops at the first I/O
    /// error.
    pub fn write_all<T: Serialize>(&mut self, items: &[T]) -> io::Result<usize> {
        let mut written = 0;
        for item in items {
            match self.write(item) {
                Ok(()) => written += 1,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    tracing::warn!("Skipping entry that cannot be stored: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    /// Get the number of items written.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BadFileMarker, HashRecord, StoredEntry};

    #[test]
    fn test_one_line_per_item() {
        let mut buffer = Vec::new();
        let mut writer = JsonlWriter::new(&mut buffer);
        let entries = vec![
            StoredEntry::Record(HashRecord::new("/a.png", 1)),
            StoredEntry::BadFile(BadFileMarker::new("/b.png")),
        ];
        assert_eq!(writer.write_all(&entries).unwrap(), 2);
        assert_eq!(writer.items_written(), 2);

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"record\""));
        assert!(lines[1].contains("\"bad_file\""));
    }

    #[test]
    fn test_empty_write_all_writes_nothing() {
        let mut buffer = Vec::new();
        let mut writer = JsonlWriter::new(&mut buffer);
        assert_eq!(writer.write_all::<StoredEntry>(&[]).unwrap(), 0);
        assert_eq!(writer.items_written(), 0);
        assert!(buffer.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unserializable_item_leaves_no_fragment() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut buffer = Vec::new();
        let mut writer = JsonlWriter::new(&mut buffer);
        let entries = vec![
            StoredEntry::Record(HashRecord::new("/a.png", 1)),
            StoredEntry::Record(HashRecord::new(OsStr::from_bytes(b"/\xff.png"), 2)),
            StoredEntry::Record(HashRecord::new("/c.png", 3)),
        ];

        assert_eq!(writer.write_all(&entries).unwrap(), 2);
        assert_eq!(writer.items_written(), 2);

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("/a.png"));
        assert!(lines[1].contains("/c.png"));
        assert!(lines.iter().all(|l| l.ends_with('}')));
    }
}
