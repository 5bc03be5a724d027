//! Binary cache for listing embeddings.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - position: u64 (little-endian)
//! - content_hash: u64 (little-endian)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::VectorIndex;

const FORMAT_VERSION: u8 = 1;

const HEADER_SIZE: usize = 47;

/// Offset of the checksum field; everything before it is checksummed.
const CHECKSUM_OFFSET: usize = 43;

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,
}

#[derive(Debug, PartialEq)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

impl Header {
    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1..33].copy_from_slice(&self.model_id);
        bytes[33..35].copy_from_slice(&self.dimensions.to_le_bytes());
        bytes[35..43].copy_from_slice(&self.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&bytes[..CHECKSUM_OFFSET]);
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self, VectorStorageError> {
        let version = bytes[0];
        if version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored = u32::from_le_bytes(read_array(&bytes[CHECKSUM_OFFSET..]));
        if stored != crc32fast::hash(&bytes[..CHECKSUM_OFFSET]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        Ok(Self {
            version,
            model_id: read_array(&bytes[1..33]),
            dimensions: u16::from_le_bytes(read_array(&bytes[33..35])),
            entry_count: u64::from_le_bytes(read_array(&bytes[35..43])),
        })
    }
}

/// Copy a slice of known length into a fixed array.
fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&slice[..N]);
    out
}

/// On-disk cache of a [`VectorIndex`].
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the cached index written for `expected_model_id`.
    pub fn load(&self, expected_model_id: &[u8; 32]) -> Result<VectorIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header = Header::from_bytes(&header_bytes)?;

        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }
        if header.dimensions == 0 {
            return Err(VectorStorageError::InvalidFormat(
                "zero embedding dimensions".to_string(),
            ));
        }

        let dimensions = header.dimensions as usize;

        // never reserve more entries than the file can hold
        let entry_size = (16 + 4 * dimensions) as u64;
        let max_entries = file_len.saturating_sub(HEADER_SIZE as u64) / entry_size;
        let capacity = header.entry_count.min(max_entries) as usize;
        let mut index = VectorIndex::with_capacity(dimensions, capacity);

        for _ in 0..header.entry_count {
            let position = u64::from_le_bytes(read_exact_array(&mut reader)?) as usize;
            let content_hash = u64::from_le_bytes(read_exact_array(&mut reader)?);

            let mut embedding = Vec::with_capacity(dimensions);
            for _ in 0..dimensions {
                embedding.push(f32::from_le_bytes(read_exact_array(&mut reader)?));
            }

            index
                .insert(position, content_hash, embedding)
                .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))?;
        }

        Ok(index)
    }

    /// Save the index.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
            VectorStorageError::InvalidFormat(format!(
                "{} dimensions do not fit the cache format",
                index.dimensions()
            ))
        })?;

        let temp_path = self.path.with_extension("tmp");

        if let Err(e) = Self::write_to_file(&temp_path, index, model_id, dimensions) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn write_to_file(
        path: &Path,
        index: &VectorIndex,
        model_id: &[u8; 32],
        dimensions: u16,
    ) -> Result<(), VectorStorageError> {
        let mut writer = BufWriter::new(File::create(path)?);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions,
            entry_count: index.len() as u64,
        };
        writer.write_all(&header.to_bytes())?;

        for entry in index.iter() {
            writer.write_all(&(entry.position as u64).to_le_bytes())?;
            writer.write_all(&entry.content_hash.to_le_bytes())?;
            for value in &entry.embedding {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }
}

fn read_exact_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N], std::io::Error> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
