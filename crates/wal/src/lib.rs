//! # WAL — Write-Ahead Log
//!
//! Durable, append-only log of mutation records for the LSM storage engine
//! core. Every `PUT` or `DELETE` is appended here — and, in durable-sync
//! mode, forced to stable storage — before it is applied to the in-memory
//! [`memtable`](https://docs.rs/memtable). On restart the WAL is replayed
//! from the beginning to reconstruct the memtable, so no acknowledged write
//! is lost.
//!
//! ## Binary record format
//!
//! ```text
//! [timestamp: u64 LE][key_size: u32 LE][value_size: u32 LE][key][value?][crc32: u32 LE]
//! ```
//!
//! `value_size == 0xFFFF_FFFF` marks a tombstone (delete); no value bytes
//! follow in that case. `crc32` covers every byte of the record that
//! precedes it — timestamp through the end of the value.
//!
//! ## Recovery semantics
//!
//! [`WalReader::replay`] stops cleanly, without error, the moment it hits a
//! short read or a CRC mismatch. That is the expected shape of a torn tail
//! record left behind by a crash mid-append; everything before it is still
//! handed to the caller.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalWriter, WalReader};
//!
//! let mut w = WalWriter::create("wal.log", true).unwrap();
//! w.append(b"hello", Some(b"world")).unwrap();
//! w.append(b"hello", None).unwrap(); // delete
//! drop(w);
//!
//! let mut r = WalReader::open("wal.log").unwrap();
//! r.replay(|rec| println!("{:?}", rec)).unwrap();
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Sentinel `value_size` marking a tombstone (delete) record on the wire.
const TOMBSTONE_MARKER: u32 = 0xFFFF_FFFF;

/// A single durable WAL record: a key paired with either a value or a
/// tombstone, stamped with the wall-clock microsecond timestamp assigned at
/// append time.
///
/// The timestamp establishes a total order of writes within one WAL file
/// but is informational only — neither the memtable nor the SSTable
/// consults it for ordering decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key-value insertion.
    Put {
        /// Wall-clock microseconds since the Unix epoch, assigned at append time.
        timestamp: u64,
        /// The lookup key.
        key: Vec<u8>,
        /// The payload value.
        value: Vec<u8>,
    },
    /// A key deletion (tombstone).
    Delete {
        /// Wall-clock microseconds since the Unix epoch, assigned at append time.
        timestamp: u64,
        /// The key being deleted.
        key: Vec<u8>,
    },
}

impl WalRecord {
    /// Returns the record's key, regardless of variant.
    pub fn key(&self) -> &[u8] {
        match self {
            WalRecord::Put { key, .. } => key,
            WalRecord::Delete { key, .. } => key,
        }
    }

    /// Returns the record's timestamp, regardless of variant.
    pub fn timestamp(&self) -> u64 {
        match self {
            WalRecord::Put { timestamp, .. } => *timestamp,
            WalRecord::Delete { timestamp, .. } => *timestamp,
        }
    }

    /// Returns `true` if this record is a tombstone (delete) record.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, WalRecord::Delete { .. })
    }

    /// Returns the live value, or `None` for a tombstone record.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            WalRecord::Put { value, .. } => Some(value),
            WalRecord::Delete { .. } => None,
        }
    }
}

/// Errors that can occur during WAL operations.
///
/// A checksum mismatch or a torn-tail record is never surfaced as an
/// `Err` here — [`WalReader::replay`] and [`WalReader::records`] treat both
/// as the expected signature of a crash mid-append and stop cleanly
/// instead. This enum only has a variant for failures that are not part of
/// that recovery path.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error (file open, read, write, sync, or delete)
    /// unrelated to end-of-log recovery.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Append-only WAL writer.
///
/// Every append is serialized into an in-memory scratch buffer, CRC32'd,
/// and written to the file in one `write_all` call. When opened with
/// `sync_on_write = true`, every append additionally calls `sync_all()`
/// before returning, so a successful `append` implies the record reached
/// stable storage.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    sync_on_write: bool,
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (creating if necessary) a WAL file in append mode.
    ///
    /// # Arguments
    ///
    /// * `path` — file system path for the WAL.
    /// * `sync_on_write` — if `true`, every [`append`](Self::append) call is
    ///   followed by `fsync`. Defaults to `true` via [`Self::create_default`].
    pub fn create<P: AsRef<Path>>(path: P, sync_on_write: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            sync_on_write,
            buf: Vec::with_capacity(256),
        })
    }

    /// Opens a WAL file with `sync_on_write` defaulted to `true` (spec default).
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        Self::create(path, true)
    }

    /// Appends a PUT or DELETE record, stamping it with the current
    /// wall-clock microsecond timestamp.
    ///
    /// `value = None` appends a tombstone (delete) record. Fails with
    /// [`WalError::Io`] if the underlying write or sync fails; a failed
    /// append is never observable by the caller as success.
    pub fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<WalRecord, WalError> {
        let timestamp = now_micros();

        self.buf.clear();
        self.buf.write_u64::<LittleEndian>(timestamp)?;
        self.buf.write_u32::<LittleEndian>(key.len() as u32)?;
        match value {
            Some(v) => {
                self.buf.write_u32::<LittleEndian>(v.len() as u32)?;
                self.buf.extend_from_slice(key);
                self.buf.extend_from_slice(v);
            }
            None => {
                self.buf.write_u32::<LittleEndian>(TOMBSTONE_MARKER)?;
                self.buf.extend_from_slice(key);
            }
        }

        let mut hasher = Crc32::new();
        hasher.update(&self.buf);
        let crc = hasher.finalize();
        self.buf.write_u32::<LittleEndian>(crc)?;

        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync_on_write {
            self.file.sync_all()?;
        }

        debug!(
            "wal: appended {} byte record (sync={})",
            self.buf.len(),
            self.sync_on_write
        );

        Ok(match value {
            Some(v) => WalRecord::Put {
                timestamp,
                key: key.to_vec(),
                value: v.to_vec(),
            },
            None => WalRecord::Delete {
                timestamp,
                key: key.to_vec(),
            },
        })
    }

    /// Forces all buffered data to stable storage.
    ///
    /// Useful when `sync_on_write` is `false` and the caller wants a
    /// durability checkpoint at a specific point (e.g. before acknowledging
    /// a batch of writes).
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Atomically reduces the WAL file to zero bytes.
    ///
    /// Called after a memtable flush has successfully produced and
    /// finalized an SSTable; a subsequent `replay()` on this file sees no
    /// records. Truncating an already-empty WAL is a no-op.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        info!("wal: truncated {}", self.path.display());
        Ok(())
    }

    /// Closes and deletes the WAL file.
    pub fn remove(self) -> Result<(), WalError> {
        let path = self.path.clone();
        drop(self.file);
        fs::remove_file(&path)?;
        info!("wal: removed {}", path.display());
        Ok(())
    }

    /// The path this writer was opened against.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sequential WAL reader that replays records from the beginning of a file.
///
/// Generic over any [`Read`] implementor so tests can replay from an
/// in-memory buffer as well as a real file.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor — e.g. a
    /// `Cursor<Vec<u8>>` in unit tests exercising corrupt byte sequences
    /// directly, without touching the filesystem.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every valid record from the current position, calling
    /// `apply` for each one in order.
    ///
    /// # Termination
    ///
    /// - Clean EOF (no more bytes) → returns `Ok(())`.
    /// - A truncated tail record (partial header, partial key/value, or a
    ///   missing/short CRC) → returns `Ok(())` after yielding every record
    ///   before it. This is the expected signature of a crash mid-append.
    /// - A CRC mismatch on an otherwise complete record → returns `Ok(())`,
    ///   same reasoning.
    /// - Any other I/O error (e.g. a read failure unrelated to EOF) →
    ///   returns `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        loop {
            match self.read_one()? {
                Some(record) => apply(record),
                None => return Ok(()),
            }
        }
    }

    /// Returns an iterator adapter over this reader's remaining records.
    ///
    /// Unlike [`replay`](Self::replay), this lets a caller pull records one
    /// at a time (e.g. to stop early). The iterator ends — without
    /// producing an `Err` item — on clean EOF, a torn tail, or a checksum
    /// mismatch; it only yields `Some(Err(..))` for a genuine I/O failure,
    /// and is fused (exhausted forever) after that.
    pub fn records(&mut self) -> WalRecords<'_, R> {
        WalRecords {
            reader: self,
            done: false,
        }
    }

    /// Reads and validates exactly one record from the current position.
    ///
    /// `Ok(None)` signals a clean stopping point (EOF, torn tail, or CRC
    /// mismatch) — the defined recovery semantics for replay.
    /// `Err` is reserved for I/O failures that are not just "ran out of
    /// bytes at a record boundary."
    fn read_one(&mut self) -> Result<Option<WalRecord>, WalError> {
        let timestamp = match self.rdr.read_u64::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        };
        let key_size = match self.rdr.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        };
        let value_size = match self.rdr.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        };

        let is_tombstone = value_size == TOMBSTONE_MARKER;
        let value_len = if is_tombstone { 0 } else { value_size as usize };

        let mut key = vec![0u8; key_size as usize];
        if let Err(e) = self.rdr.read_exact(&mut key) {
            return Self::stop_or_err(e);
        }

        let mut value = vec![0u8; value_len];
        if !is_tombstone {
            if let Err(e) = self.rdr.read_exact(&mut value) {
                return Self::stop_or_err(e);
            }
        }

        let stored_crc = match self.rdr.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!("wal: truncated tail after header, stopping replay cleanly");
                return Ok(None);
            }
            Err(e) => return Err(WalError::Io(e)),
        };

        let mut hasher = Crc32::new();
        hasher.update(&timestamp.to_le_bytes());
        hasher.update(&key_size.to_le_bytes());
        hasher.update(&value_size.to_le_bytes());
        hasher.update(&key);
        if !is_tombstone {
            hasher.update(&value);
        }
        if hasher.finalize() != stored_crc {
            warn!("wal: checksum mismatch, stopping replay cleanly");
            return Ok(None);
        }

        Ok(Some(if is_tombstone {
            WalRecord::Delete { timestamp, key }
        } else {
            WalRecord::Put {
                timestamp,
                key,
                value,
            }
        }))
    }

    fn stop_or_err(e: io::Error) -> Result<Option<WalRecord>, WalError> {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            warn!("wal: truncated tail mid-record, stopping replay cleanly");
            Ok(None)
        } else {
            Err(WalError::Io(e))
        }
    }
}

/// Iterator over the records remaining in a [`WalReader`].
///
/// See [`WalReader::records`].
pub struct WalRecords<'a, R: Read> {
    reader: &'a mut WalReader<R>,
    done: bool,
}

impl<'a, R: Read> Iterator for WalRecords<'a, R> {
    type Item = Result<WalRecord, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_one() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Returns the current wall-clock time as microseconds since the Unix
/// epoch. Used only to stamp records; never consulted for ordering.
fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
