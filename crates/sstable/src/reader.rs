use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use log::{debug, warn};
use memtable::Value;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::format::{self, CHECKSUM_FIELD_BYTES, INDEX_INTERVAL, TOMBSTONE_MARKER};
use crate::SSTableError;

/// Maximum key size this reader will allocate for (64 KiB). Guards against
/// an out-of-memory read on a corrupt length field.
const MAX_KEY_BYTES: u32 = 64 * 1024;

/// Maximum value size this reader will allocate for (64 MiB), for the same
/// reason.
const MAX_VALUE_BYTES: u32 = 64 * 1024 * 1024;

/// Reads a finalized SSTable file.
///
/// [`open`](Self::open) validates the header and footer, verifies the
/// whole-file checksum, and eagerly loads the sparse index into memory.
/// After that, [`get`](Self::get) and [`iter`](Self::iter) each open and
/// use their own fresh file handle, mirroring the reference's
/// one-handle-per-operation model.
pub struct SSTableReader {
    path: PathBuf,
    data_start: u64,
    index_offset: u64,
    num_entries: u64,
    index: Vec<(Vec<u8>, u64)>,
}

impl SSTableReader {
    /// Opens `path`, validating its header, checksum, and footer, and
    /// materializes the full sparse index.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SSTableError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        if file_size < format::HEADER_BYTES + format::FOOTER_BYTES {
            return Err(SSTableError::Format(format!(
                "file too small: {file_size} bytes"
            )));
        }

        let header = format::read_header(&mut file)?;

        file.seek(SeekFrom::Start(file_size - format::FOOTER_BYTES))?;
        let footer = format::read_footer(&mut file)?;

        let computed = checksum_whole_file(&mut file, file_size)?;
        if computed != footer.checksum {
            return Err(SSTableError::Checksum {
                expected: footer.checksum,
                computed,
            });
        }

        if footer.index_offset > file_size - format::FOOTER_BYTES {
            return Err(SSTableError::Format(format!(
                "index_offset {} is past the index/footer boundary",
                footer.index_offset
            )));
        }

        let index = read_index(
            &mut file,
            footer.index_offset,
            file_size - format::FOOTER_BYTES,
        )?;

        debug!(
            "sstable open: path={:?} entries={} index_entries={}",
            path,
            header.num_entries,
            index.len()
        );

        Ok(Self {
            path,
            data_start: format::HEADER_BYTES,
            index_offset: footer.index_offset,
            num_entries: header.num_entries,
            index,
        })
    }

    /// The number of data records in this table.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// `true` if this table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Looks up `key`.
    ///
    /// Returns `Ok(Some(value))` for a live entry, `Ok(None)` if the key
    /// does not appear in this table or appears as a tombstone — callers
    /// that need to distinguish "definitely absent" from "deleted here"
    /// should use [`get_entry`](Self::get_entry) instead.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SSTableError> {
        Ok(self.get_entry(key)?.and_then(|v| match v {
            Value::Live(bytes) => Some(bytes),
            Value::Tombstone => None,
        }))
    }

    /// Looks up `key`, distinguishing a live value, a tombstone, and
    /// absence.
    pub fn get_entry(&self, key: &[u8]) -> Result<Option<Value>, SSTableError> {
        let start = self.scan_start_offset(key);

        let mut file = BufReader::new(File::open(&self.path)?);
        file.seek(SeekFrom::Start(start))?;

        for _ in 0..INDEX_INTERVAL {
            if file.stream_position()? >= self.index_offset {
                break;
            }
            let (record_key, value) = read_record(&mut file)?;
            match record_key.as_slice().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(value)),
                std::cmp::Ordering::Greater => return Ok(None),
                std::cmp::Ordering::Less => continue,
            }
        }
        Ok(None)
    }

    /// Binary-searches the sparse index for the largest entry whose key is
    /// `<= key`, returning its data offset (or the data block's start if
    /// `key` precedes every indexed key).
    fn scan_start_offset(&self, key: &[u8]) -> u64 {
        match self
            .index
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
        {
            Ok(i) => self.index[i].1,
            Err(0) => self.data_start,
            Err(i) => self.index[i - 1].1,
        }
    }

    /// Sequentially scans every record, in ascending key order.
    pub fn iter(&self) -> Result<SSTableIter, SSTableError> {
        let mut file = BufReader::new(File::open(&self.path)?);
        file.seek(SeekFrom::Start(self.data_start))?;
        Ok(SSTableIter {
            file,
            remaining: self.num_entries,
        })
    }

    /// Iterates entries with `start <= key < end`. Either bound may be
    /// `None` for an open range.
    pub fn get_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Value)>, SSTableError> {
        let mut out = Vec::new();
        for entry in self.iter()? {
            let (key, value) = entry?;
            if let Some(s) = start {
                if key.as_slice() < s {
                    continue;
                }
            }
            if let Some(e) = end {
                if key.as_slice() >= e {
                    break;
                }
            }
            out.push((key, value));
        }
        Ok(out)
    }
}

/// A forward-only iterator over the entries of an [`SSTableReader`].
pub struct SSTableIter {
    file: BufReader<File>,
    remaining: u64,
}

impl Iterator for SSTableIter {
    type Item = Result<(Vec<u8>, Value), SSTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(read_record(&mut self.file))
    }
}

fn read_record<R: Read>(r: &mut R) -> Result<(Vec<u8>, Value), SSTableError> {
    let key_size = r.read_u32::<LittleEndian>()?;
    let value_size = r.read_u32::<LittleEndian>()?;

    if key_size > MAX_KEY_BYTES {
        return Err(SSTableError::Format(format!(
            "key_size {key_size} exceeds maximum {MAX_KEY_BYTES}"
        )));
    }

    let mut key = vec![0u8; key_size as usize];
    r.read_exact(&mut key)?;

    if value_size == TOMBSTONE_MARKER {
        return Ok((key, Value::Tombstone));
    }

    if value_size > MAX_VALUE_BYTES {
        return Err(SSTableError::Format(format!(
            "value_size {value_size} exceeds maximum {MAX_VALUE_BYTES}"
        )));
    }

    let mut value = vec![0u8; value_size as usize];
    r.read_exact(&mut value)?;
    Ok((key, Value::Live(value)))
}

fn read_index<R: Read + Seek>(
    r: &mut R,
    index_offset: u64,
    index_end: u64,
) -> Result<Vec<(Vec<u8>, u64)>, SSTableError> {
    r.seek(SeekFrom::Start(index_offset))?;
    let mut index = Vec::new();
    let mut pos = index_offset;
    while pos < index_end {
        let key_size = r.read_u32::<LittleEndian>()?;
        if key_size > MAX_KEY_BYTES {
            return Err(SSTableError::Format(format!(
                "index key_size {key_size} exceeds maximum {MAX_KEY_BYTES}"
            )));
        }
        let mut key = vec![0u8; key_size as usize];
        r.read_exact(&mut key)?;
        let data_offset = r.read_u64::<LittleEndian>()?;
        pos += 4 + key_size as u64 + 8;
        index.push((key, data_offset));
    }
    if pos != index_end {
        warn!(
            "sstable index block ended at {pos}, expected boundary {index_end}"
        );
    }
    Ok(index)
}

/// Computes the CRC32 over `[0 .. file_size - CHECKSUM_FIELD_BYTES)` — every
/// byte of the file except the trailing 8-byte checksum sub-field itself
/// (the footer's `index_offset` field IS covered).
fn checksum_whole_file(file: &mut File, file_size: u64) -> Result<u32, SSTableError> {
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
