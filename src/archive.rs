//! In-memory zip bundling for batch downloads.

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ConvertError;
use crate::naming::NameDeduplicator;

/// Download name of the batch archive
pub const ARCHIVE_FILE_NAME: &str = "converted_images.zip";
pub const ARCHIVE_MIME_TYPE: &str = "application/zip";

pub struct ZipBundle {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    names: NameDeduplicator,
    options: SimpleFileOptions,
    entries: usize,
}

impl ZipBundle {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            names: NameDeduplicator::new(),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            entries: 0,
        }
    }

    /// Add an entry; a repeated name gets a ` (n)` suffix. Returns the stored name.
    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<String, ConvertError> {
        let name = self.names.unique(name);
        self.writer.start_file(name.as_str(), self.options)?;
        self.writer.write_all(data)?;
        self.entries += 1;
        Ok(name)
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn finish(self) -> Result<Vec<u8>, ConvertError> {
        Ok(self.writer.finish()?.into_inner())
    }
}

impl Default for ZipBundle {
    fn default() -> Self {
        Self::new()
    }
}
