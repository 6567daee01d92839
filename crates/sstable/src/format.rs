//! SSTable binary format constants and header/footer read/write helpers.
//!
//! ## Header (24 bytes)
//!
//! ```text
//! [magic: u64 LE][version: u32 LE][num_entries: u64 LE][reserved: u32 LE]
//! ```
//!
//! ## Footer (16 bytes, the last 16 bytes of the file)
//!
//! ```text
//! [index_offset: u64 LE][checksum: u64 LE]
//! ```
//!
//! `checksum`'s low 32 bits hold the CRC32 over every byte of the file
//! except this final 8-byte field; the high 32 bits are always zero.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::SSTableError;

/// Magic number identifying an SSTable file (ASCII-adjacent, not a string).
pub const MAGIC: u64 = 0x5353_5441_4242_4C45;

/// The only format version this crate writes or reads.
pub const VERSION: u32 = 1;

/// Header size in bytes: 8 (magic) + 4 (version) + 8 (num_entries) + 4 (reserved).
pub const HEADER_BYTES: u64 = 8 + 4 + 8 + 4;

/// Footer size in bytes: 8 (index_offset) + 8 (checksum).
pub const FOOTER_BYTES: u64 = 8 + 8;

/// Size of the footer's trailing checksum sub-field. The whole-file CRC32
/// covers every byte up to this field, including the footer's
/// `index_offset`, so this is the boundary the checksum helpers use — not
/// [`FOOTER_BYTES`], which also includes `index_offset` and would exclude
/// it from coverage.
pub const CHECKSUM_FIELD_BYTES: u64 = 8;

/// Number of data records between consecutive sparse-index entries.
pub const INDEX_INTERVAL: usize = 16;

/// Sentinel `value_size` marking a tombstone record on the wire, shared
/// with the WAL's wire format.
pub const TOMBSTONE_MARKER: u32 = 0xFFFF_FFFF;

/// A parsed SSTable header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub num_entries: u64,
}

/// Writes a header with the given entry count.
pub fn write_header<W: Write>(w: &mut W, num_entries: u64) -> io::Result<()> {
    w.write_u64::<LittleEndian>(MAGIC)?;
    w.write_u32::<LittleEndian>(VERSION)?;
    w.write_u64::<LittleEndian>(num_entries)?;
    w.write_u32::<LittleEndian>(0)?;
    Ok(())
}

/// Reads and validates a header, failing with [`SSTableError::Format`] on
/// wrong magic or unsupported version.
pub fn read_header<R: Read>(r: &mut R) -> Result<Header, SSTableError> {
    let magic = r.read_u64::<LittleEndian>()?;
    if magic != MAGIC {
        return Err(SSTableError::Format(format!(
            "bad magic: expected {MAGIC:#x}, found {magic:#x}"
        )));
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(SSTableError::Format(format!(
            "unsupported version: {version}"
        )));
    }
    let num_entries = r.read_u64::<LittleEndian>()?;
    let _reserved = r.read_u32::<LittleEndian>()?;
    Ok(Header { num_entries })
}

/// Writes a footer: `index_offset` followed by a checksum (`u64`, low 32
/// bits significant).
pub fn write_footer<W: Write>(w: &mut W, index_offset: u64, checksum: u32) -> io::Result<()> {
    w.write_u64::<LittleEndian>(index_offset)?;
    w.write_u64::<LittleEndian>(checksum as u64)?;
    Ok(())
}

/// A parsed SSTable footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index_offset: u64,
    pub checksum: u32,
}

/// Reads a footer from exactly 16 bytes already positioned at its start.
pub fn read_footer<R: Read>(r: &mut R) -> io::Result<Footer> {
    let index_offset = r.read_u64::<LittleEndian>()?;
    let checksum = r.read_u64::<LittleEndian>()? as u32;
    Ok(Footer {
        index_offset,
        checksum,
    })
}
