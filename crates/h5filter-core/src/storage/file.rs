use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{ChunkStore, StoredChunk};
use crate::error::FilterError;
use crate::types::{FilterMask, Result};

const FILE_MAGIC: [u8; 4] = *b"H5FC";
const FILE_VERSION: u16 = 1;
const FILE_HEADER_SIZE: usize = 8;
const RECORD_HEADER_SIZE: usize = 16;

/// Location of one chunk inside a [`FileChunkStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Byte position of the chunk data.
    pub position: u64,
    pub len: u64,
    pub filter_mask: FilterMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordHeader {
    ndims: u16,
    filter_mask: u32,
    data_len: u64,
}

impl RecordHeader {
    fn to_bytes(self) -> [u8; RECORD_HEADER_SIZE] {
        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        bytes[..2].copy_from_slice(&self.ndims.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.filter_mask.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.data_len.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: [u8; RECORD_HEADER_SIZE]) -> Result<Self> {
        if bytes[2..4] != [0, 0] {
            return Err(FilterError::Storage("invalid chunk record reserved bits".to_string()));
        }

        let mut data_len = [0u8; 8];
        data_len.copy_from_slice(&bytes[8..16]);
        Ok(Self {
            ndims: u16::from_le_bytes([bytes[0], bytes[1]]),
            filter_mask: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            data_len: u64::from_le_bytes(data_len),
        })
    }
}

struct FileState {
    file: File,
    end: u64,
    index: BTreeMap<Vec<u64>, ChunkRecord>,
}

/// Append-only chunk file.
///
/// Each write appends a record with the chunk offset, filter mask and bytes.
/// Rewriting an offset appends a new record that shadows the old one.
pub struct FileChunkStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileChunkStore {
    /// Creates (or truncates) a chunk file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; FILE_HEADER_SIZE];
        header[..4].copy_from_slice(&FILE_MAGIC);
        header[4..6].copy_from_slice(&FILE_VERSION.to_le_bytes());
        file.write_all(&header)?;

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                file,
                end: FILE_HEADER_SIZE as u64,
                index: BTreeMap::new(),
            }),
        })
    }

    /// Opens an existing chunk file and rebuilds its index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();

        let mut reader = BufReader::new(file.try_clone()?);
        let mut header = [0u8; FILE_HEADER_SIZE];
        reader.read_exact(&mut header)?;
        if header[..4] != FILE_MAGIC {
            return Err(FilterError::Storage("invalid chunk file magic".to_string()));
        }
        if u16::from_le_bytes([header[4], header[5]]) != FILE_VERSION {
            return Err(FilterError::Storage("unsupported chunk file version".to_string()));
        }

        let mut index = BTreeMap::new();
        let mut position = FILE_HEADER_SIZE as u64;
        while position < file_len {
            let mut bytes = [0u8; RECORD_HEADER_SIZE];
            reader.read_exact(&mut bytes)?;
            let record = RecordHeader::from_bytes(bytes)?;

            let mut offset = Vec::with_capacity(usize::from(record.ndims));
            for _ in 0..record.ndims {
                let mut coordinate = [0u8; 8];
                reader.read_exact(&mut coordinate)?;
                offset.push(u64::from_le_bytes(coordinate));
            }

            let truncated = || {
                FilterError::Storage(format!("truncated chunk record at byte {position}"))
            };
            let data_position =
                position + RECORD_HEADER_SIZE as u64 + 8 * u64::from(record.ndims);
            let next = data_position
                .checked_add(record.data_len)
                .filter(|next| *next <= file_len)
                .ok_or_else(truncated)?;
            reader.seek(SeekFrom::Start(next))?;

            index.insert(
                offset,
                ChunkRecord {
                    position: data_position,
                    len: record.data_len,
                    filter_mask: FilterMask::from_bits(record.filter_mask),
                },
            );
            position = next;
        }

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                file,
                end: position,
                index,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().expect("chunk file mutex poisoned")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current file size in bytes.
    pub fn file_len(&self) -> u64 {
        self.lock().end
    }

    /// Latest record per offset, in offset order.
    pub fn records(&self) -> Vec<(Vec<u64>, ChunkRecord)> {
        self.lock()
            .index
            .iter()
            .map(|(offset, record)| (offset.clone(), *record))
            .collect()
    }

    pub fn read_chunk(&self, offset: &[u64]) -> Result<Option<StoredChunk>> {
        let mut state = self.lock();
        let Some(record) = state.index.get(offset).copied() else {
            return Ok(None);
        };

        let len = usize::try_from(record.len)
            .map_err(|_| FilterError::Storage("chunk too large for this platform".to_string()))?;
        let mut data = vec![0u8; len];
        state.file.seek(SeekFrom::Start(record.position))?;
        state.file.read_exact(&mut data)?;

        Ok(Some(StoredChunk {
            filter_mask: record.filter_mask,
            data,
        }))
    }

    pub fn sync(&self) -> Result<()> {
        self.lock().file.sync_data()?;
        Ok(())
    }
}

impl ChunkStore for FileChunkStore {
    fn write_chunk(&self, offset: &[u64], filter_mask: FilterMask, bytes: &[u8]) -> Result<()> {
        let ndims = u16::try_from(offset.len())
            .map_err(|_| FilterError::Storage("too many chunk dimensions".to_string()))?;
        let header = RecordHeader {
            ndims,
            filter_mask: filter_mask.bits(),
            data_len: bytes.len() as u64,
        };

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + 8 * offset.len() + bytes.len());
        record.extend_from_slice(&header.to_bytes());
        for coordinate in offset {
            record.extend_from_slice(&coordinate.to_le_bytes());
        }
        let data_start = record.len() as u64;
        record.extend_from_slice(bytes);

        let mut state = self.lock();
        let position = state.end;
        state.file.seek(SeekFrom::Start(position))?;
        state.file.write_all(&record)?;
        state.end = position + record.len() as u64;
        state.index.insert(
            offset.to_vec(),
            ChunkRecord {
                position: position + data_start,
                len: bytes.len() as u64,
                filter_mask,
            },
        );
        Ok(())
    }
}
