//! Block device backed by an image file on the host filesystem.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::BlockDevice;

/// A flash image stored in a regular file.
///
/// The file plays the role of the raw flash array; erase rewrites the region
/// with `0xFF` and program overwrites in place. Geometry is supplied by the
/// caller since an image file has no hardware to report it.
pub struct FileDevice {
    file: File,
    size: u64,
    erase_size: u32,
    program_size: u32,
}

impl FileDevice {
    /// Create a new image of `size` bytes, fully erased.
    pub fn create<P: AsRef<Path>>(
        path: P,
        size: u64,
        erase_size: u32,
        program_size: u32,
    ) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let chunk = vec![0xFFu8; 64 * 1024];
        let mut remaining = size;
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            file.write_all(&chunk[..n])?;
            remaining -= n as u64;
        }
        file.flush()?;
        Ok(Self {
            file,
            size,
            erase_size,
            program_size,
        })
    }

    /// Open an existing image; the device size is the file size.
    pub fn open<P: AsRef<Path>>(path: P, erase_size: u32, program_size: u32) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            size,
            erase_size,
            program_size,
        })
    }
}

impl BlockDevice for FileDevice {
    type Error = io::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), Self::Error> {
        self.file.flush()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn erase_size(&self) -> u32 {
        self.erase_size
    }

    fn program_size(&self) -> u32 {
        self.program_size
    }

    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.file.seek(SeekFrom::Start(addr))?;
        self.file.read_exact(buf)
    }

    fn program(&mut self, addr: u64, buf: &[u8]) -> Result<(), Self::Error> {
        log::trace!("program {} bytes at {addr}", buf.len());
        self.file.seek(SeekFrom::Start(addr))?;
        self.file.write_all(buf)
    }

    fn erase(&mut self, addr: u64, len: u64) -> Result<(), Self::Error> {
        log::trace!("erase {len} bytes at {addr}");
        self.file.seek(SeekFrom::Start(addr))?;
        let chunk = vec![0xFFu8; (len as usize).min(64 * 1024)];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            self.file.write_all(&chunk[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }
}
