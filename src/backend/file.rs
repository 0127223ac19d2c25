//! File-backed flash image
//!
//! Stores the whole device in one file so a store survives process
//! restarts. Enforces the same NOR rules as the in-memory device.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{check_program, BackendError, FlashBackend, Geometry, ERASED_BYTE};

/// Flash device persisted to an image file
#[derive(Debug)]
pub struct FileFlash {
    /// Path to the image file
    path: PathBuf,
    /// Open image handle
    file: File,
    geometry: Geometry,
    /// fsync after every erase/program
    sync_writes: bool,
}

impl FileFlash {
    /// Create a new, fully erased image, replacing any existing file
    pub fn create(path: &Path, geometry: Geometry) -> Result<Self, BackendError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let page = vec![ERASED_BYTE; geometry.page_size];
        for _ in 0..geometry.page_count {
            file.write_all(&page)?;
        }
        file.sync_all()?;

        tracing::debug!(
            "Created flash image {} ({} pages x {} bytes)",
            path.display(),
            geometry.page_count,
            geometry.page_size
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            geometry,
            sync_writes: false,
        })
    }

    /// Open an existing image; its size must match `geometry`
    pub fn open(path: &Path, geometry: Geometry) -> Result<Self, BackendError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let len = file.metadata()?.len();
        if len != geometry.total_size() as u64 {
            return Err(BackendError::Io(format!(
                "image {} is {} bytes, geometry expects {}",
                path.display(),
                len,
                geometry.total_size()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            geometry,
            sync_writes: false,
        })
    }

    /// Open the image if it exists, otherwise create an erased one
    pub fn open_or_create(path: &Path, geometry: Geometry) -> Result<Self, BackendError> {
        if path.exists() {
            Self::open(path, geometry)
        } else {
            Self::create(path, geometry)
        }
    }

    /// fsync the image after every erase and program
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Get the image path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn seek_to(&mut self, page: u32, offset: usize) -> Result<(), BackendError> {
        let address = self.geometry.address(page, offset) as u64;
        self.file.seek(SeekFrom::Start(address))?;
        Ok(())
    }

    fn finish_write(&mut self) -> Result<(), BackendError> {
        if self.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

impl FlashBackend for FileFlash {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn erase(&mut self, page: u32) -> Result<(), BackendError> {
        self.geometry.check_range(page, 0, self.geometry.page_size)?;

        self.seek_to(page, 0)?;
        self.file.write_all(&vec![ERASED_BYTE; self.geometry.page_size])?;
        self.finish_write()
    }

    fn program(&mut self, page: u32, offset: usize, data: &[u8]) -> Result<(), BackendError> {
        self.geometry.check_range(page, offset, data.len())?;
        self.geometry.check_aligned(offset, data.len())?;

        let mut current = vec![0u8; data.len()];
        self.seek_to(page, offset)?;
        self.file.read_exact(&mut current)?;
        check_program(page, offset, &current, data)?;

        self.seek_to(page, offset)?;
        self.file.write_all(data)?;
        self.finish_write()
    }

    fn read(&mut self, page: u32, offset: usize, out: &mut [u8]) -> Result<(), BackendError> {
        self.geometry.check_range(page, offset, out.len())?;

        self.seek_to(page, offset)?;
        self.file.read_exact(out)?;
        Ok(())
    }
}
