//! # SSTable — Sorted String Table
//!
//! Immutable, on-disk storage files for the LSM storage engine core.
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold the
//! engine flushes it to disk as an SSTable. SSTables are *write-once,
//! read-many* — once [`SSTableWriter::finalize`] returns, the file is never
//! modified again (only superseded or deleted by a higher-level compaction
//! policy, which this crate does not implement).
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ HEADER (24 B)                                              │
//! │                                                             │
//! │ magic (u64) | version (u32) | num_entries (u64) | reserved │
//! ├───────────────────────────────────────────────────────────┤
//! │ DATA BLOCK (sorted key/value records)                       │
//! │                                                             │
//! │ key_size (u32) | value_size (u32) | key | value             │
//! │ value_size == 0xFFFF_FFFF marks a tombstone (no value bytes)│
//! │ ... repeated for each entry, strictly increasing key order  │
//! ├───────────────────────────────────────────────────────────┤
//! │ INDEX BLOCK (sparse, one entry per 16th data record)         │
//! │                                                             │
//! │ key_size (u32) | key | data_offset (u64)                    │
//! ├───────────────────────────────────────────────────────────┤
//! │ FOOTER (16 B, always the last 16 bytes of the file)          │
//! │                                                             │
//! │ index_offset (u64) | checksum (u64, low 32 bits = CRC32)    │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The checksum covers every byte of the
//! file except the final 8-byte checksum field itself: `[0 .. file_size -
//! 8)`. There is exactly one on-disk version; this crate neither reads nor
//! writes any other layout, and carries no bloom filter.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sstable::{SSTableWriter, SSTableReader};
//! use memtable::Value;
//!
//! let mut w = SSTableWriter::open("000001.sst").unwrap();
//! w.add(b"alpha", &Value::Live(b"1".to_vec())).unwrap();
//! w.add(b"beta", &Value::Tombstone).unwrap();
//! w.finalize().unwrap();
//!
//! let r = SSTableReader::open("000001.sst").unwrap();
//! assert_eq!(r.get(b"alpha").unwrap(), Some(b"1".to_vec()));
//! assert_eq!(r.get(b"beta").unwrap(), None);
//! ```

mod format;
mod reader;
mod writer;

pub use format::INDEX_INTERVAL;
pub use reader::{SSTableIter, SSTableReader};
pub use writer::SSTableWriter;

use thiserror::Error;

/// Errors produced by SSTable writing and reading.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Bad magic number, unsupported version, or a structurally impossible
    /// field (e.g. a declared key size that runs past the end of the file).
    #[error("format error: {0}")]
    Format(String),
    /// The whole-file CRC32 recomputed on open does not match the stored
    /// checksum.
    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    Checksum { expected: u32, computed: u32 },
    /// `add` received a key that is not strictly greater than the previous
    /// key written to this table.
    #[error("key {key:?} is not strictly greater than previous key {previous:?}")]
    Order { key: Vec<u8>, previous: Vec<u8> },
}
