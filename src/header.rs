//! Fixed header stored at the start of every persistent array file.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ version u64 │ element_size u64 │ size u64 │ capacity u64     │
//! │ growth f32  │ metadata [u8; 255] │ padding [u8; 5]           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ element 0 │ element 1 │ ... │ element capacity-1             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All header integers are little-endian. Element bytes, including tree node
//! links and keys, are stored in host byte order, so files are only portable
//! between hosts of the same endianness. The header is padded to a multiple of
//! eight bytes so the element region stays 8-byte aligned inside a map.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read};

/// Current persistent format version.
pub const FORMAT_VERSION: u64 = 1;

/// Size of the metadata region reserved for higher layers.
pub const METADATA_SIZE: usize = 255;

/// Fixed size of the encoded header in bytes.
pub const HEADER_SIZE: usize = 296;

/// Largest element alignment supported by a mapped array.
pub const MAX_ELEMENT_ALIGN: usize = 8;

const METADATA_OFFSET: usize = 36;

/// Persistent array header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileHeader {
    /// Format version, see [`FORMAT_VERSION`].
    pub version: u64,
    /// Bytes per element.
    pub element_size: u64,
    /// Logical element count.
    pub size: u64,
    /// Allocated element count.
    pub capacity: u64,
    /// Growth multiplier.
    pub growth: f32,
    /// Metadata owned by the layer above the array.
    pub metadata: [u8; METADATA_SIZE],
}

impl FileHeader {
    /// Creates a header for the current format version.
    pub fn new(
        element_size: usize,
        size: usize,
        capacity: usize,
        growth: f32,
        metadata: [u8; METADATA_SIZE],
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            element_size: element_size as u64,
            size: size as u64,
            capacity: capacity as u64,
            growth,
            metadata,
        }
    }

    /// Number of file bytes needed for the header plus `capacity` elements.
    ///
    /// `None` when the length does not fit in a `u64`.
    pub fn file_len(&self) -> Option<u64> {
        self.capacity
            .checked_mul(self.element_size)?
            .checked_add(HEADER_SIZE as u64)
    }

    /// Reads a header from the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "buffer too small for header",
            ));
        }

        let mut cursor = io::Cursor::new(bytes);
        let version = cursor.read_u64::<LittleEndian>()?;
        let element_size = cursor.read_u64::<LittleEndian>()?;
        let size = cursor.read_u64::<LittleEndian>()?;
        let capacity = cursor.read_u64::<LittleEndian>()?;
        let growth = cursor.read_f32::<LittleEndian>()?;
        let mut metadata = [0u8; METADATA_SIZE];
        cursor.read_exact(&mut metadata)?;

        Ok(Self {
            version,
            element_size,
            size,
            capacity,
            growth,
            metadata,
        })
    }

    /// Encodes the header, padding included.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.version);
        LittleEndian::write_u64(&mut buf[8..16], self.element_size);
        LittleEndian::write_u64(&mut buf[16..24], self.size);
        LittleEndian::write_u64(&mut buf[24..32], self.capacity);
        LittleEndian::write_f32(&mut buf[32..36], self.growth);
        buf[METADATA_OFFSET..METADATA_OFFSET + METADATA_SIZE].copy_from_slice(&self.metadata);
        buf
    }
}
