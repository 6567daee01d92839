use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use log::info;
use memtable::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::format::{self, CHECKSUM_FIELD_BYTES, INDEX_INTERVAL, TOMBSTONE_MARKER};
use crate::SSTableError;

/// Writes a single, immutable SSTable file from a sorted stream of
/// key/value-or-tombstone pairs.
///
/// Keys must be supplied to [`add`](SSTableWriter::add) in strictly
/// increasing order; the writer enforces this and refuses out-of-order
/// keys rather than silently producing an unsearchable file.
pub struct SSTableWriter {
    path: PathBuf,
    file: BufWriter<File>,
    num_entries: u64,
    last_key: Option<Vec<u8>>,
    index: Vec<(Vec<u8>, u64)>,
    offset: u64,
}

impl SSTableWriter {
    /// Creates `path` and writes a placeholder header (`num_entries = 0`).
    /// The true entry count is filled in by [`finalize`](Self::finalize).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SSTableError> {
        let path = path.as_ref().to_path_buf();
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut file = BufWriter::new(raw);
        format::write_header(&mut file, 0)?;
        let offset = format::HEADER_BYTES;
        Ok(Self {
            path,
            file,
            num_entries: 0,
            last_key: None,
            index: Vec::new(),
            offset,
        })
    }

    /// Appends one record to the data block.
    ///
    /// `key` must be strictly greater than the key of the previous call to
    /// `add` (if any); violating this returns
    /// [`SSTableError::Order`] and leaves the file untouched beyond what
    /// was already written.
    pub fn add(&mut self, key: &[u8], value: &Value) -> Result<(), SSTableError> {
        if let Some(previous) = &self.last_key {
            if key <= previous.as_slice() {
                return Err(SSTableError::Order {
                    key: key.to_vec(),
                    previous: previous.clone(),
                });
            }
        }

        let record_offset = self.offset;
        if self.num_entries as usize % INDEX_INTERVAL == 0 {
            self.index.push((key.to_vec(), record_offset));
        }

        self.file.write_u32::<LittleEndian>(key.len() as u32)?;
        match value {
            Value::Live(v) => {
                self.file.write_u32::<LittleEndian>(v.len() as u32)?;
                self.file.write_all(key)?;
                self.file.write_all(v)?;
                self.offset += 8 + key.len() as u64 + v.len() as u64;
            }
            Value::Tombstone => {
                self.file.write_u32::<LittleEndian>(TOMBSTONE_MARKER)?;
                self.file.write_all(key)?;
                self.offset += 8 + key.len() as u64;
            }
        }

        self.last_key = Some(key.to_vec());
        self.num_entries += 1;
        Ok(())
    }

    /// Writes the index block and footer, backfills the header with the
    /// true entry count, and fsyncs the file twice: once after the data is
    /// complete, and once after the real checksum has replaced the
    /// placeholder in the footer.
    ///
    /// This two-pass checksum write exists because the checksum covers the
    /// whole file including the footer's own `index_offset` field, which
    /// isn't known until the index block has been written.
    pub fn finalize(mut self) -> Result<(), SSTableError> {
        let index_offset = self.offset;
        for (key, data_offset) in &self.index {
            self.file.write_u32::<LittleEndian>(key.len() as u32)?;
            self.file.write_all(key)?;
            self.file.write_u64::<LittleEndian>(*data_offset)?;
        }

        // Placeholder footer so the file has its final size before we
        // compute the whole-file checksum.
        format::write_footer(&mut self.file, index_offset, 0)?;
        self.file.flush()?;

        let mut file = self.file.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        format::write_header(&mut file, self.num_entries)?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();
        let checksum = checksum_whole_file(&mut file, file_size)?;

        file.seek(SeekFrom::Start(file_size - format::FOOTER_BYTES))?;
        format::write_footer(&mut file, index_offset, checksum)?;
        file.sync_all()?;

        info!(
            "sstable finalize: path={:?} entries={} bytes={}",
            self.path, self.num_entries, file_size
        );
        Ok(())
    }
}

/// Computes the CRC32 over `[0 .. file_size - CHECKSUM_FIELD_BYTES)` — every
/// byte of the file except the trailing 8-byte checksum sub-field itself
/// (the footer's `index_offset` field IS covered). Leaves the file's
/// cursor at an unspecified position.
fn checksum_whole_file(file: &mut File, file_size: u64) -> Result<u32, SSTableError> {
    use std::io::Read;

    let covered = file_size.saturating_sub(CHECKSUM_FIELD_BYTES);
    file.seek(SeekFrom::Start(0))?;
    let mut hasher = Crc32::new();
    let mut remaining = covered;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        file.read_exact(&mut buf[..want])?;
        hasher.update(&buf[..want]);
        remaining -= want as u64;
    }
    Ok(hasher.finalize())
}
