//! Backing storage for [`DynArray`](crate::DynArray): a heap vector or a
//! memory-mapped file prefixed by a [`FileHeader`].

use std::fs::{File, OpenOptions};
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use fs2::FileExt;
use memmap2::{MmapMut, MmapOptions};
use thiserror::Error;

use crate::header::{FileHeader, FORMAT_VERSION, HEADER_SIZE, MAX_ELEMENT_ALIGN};

/// Convenience alias for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised at the persistence boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing file could not be created or opened.
    #[error("failed to open array file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another handle holds the lock on the backing file.
    #[error("array file {path} is locked: {source}")]
    Locked {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file could not be sized or mapped.
    #[error("failed to map array file {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Flushing mapped pages failed.
    #[error("failed to sync array file {path}: {source}")]
    Sync {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The header or file length is inconsistent.
    #[error("array file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The header was written by an unknown format version.
    #[error("array file {path} has unsupported header version {version}")]
    UnsupportedVersion { path: PathBuf, version: u64 },

    /// The stored element size does not match the requested element type.
    #[error("array file {path} stores {found}-byte elements, expected {expected}")]
    ElementSize {
        path: PathBuf,
        expected: usize,
        found: u64,
    },

    /// The requested capacity does not fit in an addressable mapped file.
    #[error("capacity {capacity} is too large to map array file {path}")]
    CapacityOverflow { path: PathBuf, capacity: u64 },

    /// The element type cannot live inside a mapped region.
    #[error("element of size {size} and alignment {align} cannot be memory-mapped")]
    UnsupportedElement { size: usize, align: usize },
}

/// Ensures `T` can be viewed in place after the header.
pub(crate) fn check_mappable<T>() -> StoreResult<()> {
    let size = mem::size_of::<T>();
    let align = mem::align_of::<T>();
    if size == 0 || align > MAX_ELEMENT_ALIGN {
        return Err(StoreError::UnsupportedElement { size, align });
    }
    Ok(())
}

/// Length of the file described by `header`, if it can be mapped.
fn mapped_len(header: &FileHeader) -> Option<u64> {
    header
        .file_len()
        .filter(|&len| usize::try_from(len).is_ok())
}

/// An open, locked and mapped array file.
pub(crate) struct MappedFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
}

impl MappedFile {
    /// Creates (or truncates) the file at `path` and writes `header`.
    pub(crate) fn create(path: &Path, header: &FileHeader) -> StoreResult<Self> {
        let path = path.to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;

        file.try_lock_exclusive()
            .map_err(|source| StoreError::Locked {
                path: path.clone(),
                source,
            })?;

        let Some(len) = mapped_len(header) else {
            return Err(StoreError::CapacityOverflow {
                path,
                capacity: header.capacity,
            });
        };
        let mmap = Self::map(&path, &file, len)?;
        let mut mapped = Self { path, file, mmap };
        mapped.write_header(header);
        mapped.flush().map_err(|source| StoreError::Sync {
            path: mapped.path.clone(),
            source,
        })?;

        tracing::info!(
            path = %mapped.path.display(),
            capacity = header.capacity,
            element_size = header.element_size,
            "created mapped array"
        );
        Ok(mapped)
    }

    /// Opens an existing file, validating its header against `element_size`.
    pub(crate) fn open(path: &Path, element_size: usize) -> StoreResult<(Self, FileHeader)> {
        let path = path.to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;

        file.try_lock_exclusive()
            .map_err(|source| StoreError::Locked {
                path: path.clone(),
                source,
            })?;

        let file_len = file
            .metadata()
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?
            .len();

        if file_len < HEADER_SIZE as u64 {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("file is {file_len} bytes, shorter than the header"),
            });
        }

        let mmap = Self::map(&path, &file, file_len)?;
        let header = FileHeader::from_bytes(&mmap[..HEADER_SIZE]).map_err(|e| {
            StoreError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        if header.version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path,
                version: header.version,
            });
        }
        if header.element_size != element_size as u64 {
            return Err(StoreError::ElementSize {
                path,
                expected: element_size,
                found: header.element_size,
            });
        }
        if header.size > header.capacity {
            return Err(StoreError::Corrupt {
                path,
                reason: format!(
                    "size {} exceeds capacity {}",
                    header.size, header.capacity
                ),
            });
        }
        let Some(needed) = mapped_len(&header) else {
            return Err(StoreError::Corrupt {
                path,
                reason: format!(
                    "capacity {} of {}-byte elements is not addressable",
                    header.capacity, header.element_size
                ),
            });
        };
        if needed > file_len {
            return Err(StoreError::Corrupt {
                path,
                reason: format!(
                    "file is {} bytes, capacity {} needs {}",
                    file_len, header.capacity, needed
                ),
            });
        }

        tracing::info!(
            path = %path.display(),
            size = header.size,
            capacity = header.capacity,
            "loaded mapped array"
        );
        Ok((Self { path, file, mmap }, header))
    }

    fn map(path: &Path, file: &File, len: u64) -> StoreResult<MmapMut> {
        file.set_len(len).map_err(|source| StoreError::Map {
            path: path.to_path_buf(),
            source,
        })?;
        // SAFETY: the file is exclusively locked for the lifetime of the map.
        unsafe { MmapOptions::new().len(len as usize).map_mut(file) }.map_err(|source| {
            StoreError::Map {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Flushes, resizes the file to `len` bytes and maps it again.
    pub(crate) fn remap(&mut self, len: u64) -> io::Result<()> {
        self.mmap.flush()?;
        self.file.set_len(len)?;
        // SAFETY: see `map`; the previous map is dropped on assignment.
        self.mmap = unsafe { MmapOptions::new().len(len as usize).map_mut(&self.file)? };
        Ok(())
    }

    pub(crate) fn write_header(&mut self, header: &FileHeader) {
        self.mmap[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub(crate) fn read_header(&self) -> io::Result<FileHeader> {
        FileHeader::from_bytes(&self.mmap[..HEADER_SIZE])
    }

    pub(crate) fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn region(&self, bytes: usize) -> &[u8] {
        &self.mmap[HEADER_SIZE..HEADER_SIZE + bytes]
    }

    fn region_mut(&mut self, bytes: usize) -> &mut [u8] {
        &mut self.mmap[HEADER_SIZE..HEADER_SIZE + bytes]
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if let Err(e) = self.mmap.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush array file");
        }
        let _ = FileExt::unlock(&self.file);
    }
}

/// Element slots of an array; `capacity` slots are always addressable.
pub(crate) enum Storage<T> {
    Heap(Vec<T>),
    Mapped(MappedFile),
}

impl<T: Pod> Storage<T> {
    pub(crate) fn heap(capacity: usize) -> Self {
        Storage::Heap(vec![T::zeroed(); capacity])
    }

    pub(crate) fn slots(&self, capacity: usize) -> &[T] {
        match self {
            Storage::Heap(values) => &values[..capacity],
            Storage::Mapped(mapped) => {
                bytemuck::cast_slice(mapped.region(capacity * mem::size_of::<T>()))
            }
        }
    }

    pub(crate) fn slots_mut(&mut self, capacity: usize) -> &mut [T] {
        match self {
            Storage::Heap(values) => &mut values[..capacity],
            Storage::Mapped(mapped) => {
                bytemuck::cast_slice_mut(mapped.region_mut(capacity * mem::size_of::<T>()))
            }
        }
    }

    /// Reallocates to `header.capacity` slots, keeping existing contents.
    ///
    /// Panics if a mapped file cannot be resized: the array would otherwise be
    /// left pointing at a region that no longer matches its capacity.
    pub(crate) fn reallocate(&mut self, header: &FileHeader) {
        let capacity = header.capacity as usize;
        match self {
            Storage::Heap(values) => {
                if capacity < values.len() {
                    values.truncate(capacity);
                    values.shrink_to_fit();
                } else {
                    values.resize(capacity, T::zeroed());
                }
            }
            Storage::Mapped(mapped) => {
                let Some(len) = mapped_len(header) else {
                    fatal(format!(
                        "capacity {} overflows the mapped length of {}",
                        header.capacity,
                        mapped.path().display()
                    ));
                };
                if let Err(e) = mapped.remap(len) {
                    fatal(format!(
                        "failed to remap {} to {} bytes: {}",
                        mapped.path().display(),
                        len,
                        e
                    ));
                }
                mapped.write_header(header);
            }
        }
    }

    pub(crate) fn mapped(&self) -> Option<&MappedFile> {
        match self {
            Storage::Mapped(mapped) => Some(mapped),
            Storage::Heap(_) => None,
        }
    }

    pub(crate) fn mapped_mut(&mut self) -> Option<&mut MappedFile> {
        match self {
            Storage::Mapped(mapped) => Some(mapped),
            Storage::Heap(_) => None,
        }
    }
}

/// Logs `message` and aborts the current operation.
pub(crate) fn fatal(message: String) -> ! {
    tracing::error!("{}", message);
    panic!("{}", message);
}
