//! The filesystem adapter: engine lifecycle plus the generic operation set.

use std::cell::RefCell;
use std::rc::Rc;

use flashfs_block_device::BlockDevice;
use flashfs_core::{
    CACHE_HEADER_SIZE, CACHE_PAGE_HEADER_SIZE, Config, FD_SLOT_SIZE, Flashfs, MountBuffers,
};

use crate::bridge::DeviceStorage;
use crate::interface::{
    DirEntry, DirHandle, Error, FileHandle, Filesystem, OpenFlags, SeekFrom, Stat,
};
use crate::translate;

/// Number of concurrently open files per mounted filesystem.
pub const FILE_DESCRIPTORS: usize = 4;

/// Number of pages held in the read cache.
pub const CACHE_PAGES: usize = 8;

/// Default logical page size hint, raised to the device's program size at
/// mount.
pub const DEFAULT_LOG_PAGE_SIZE: u32 = 256;

/// Default logical block size hint, raised to the device's erase size at
/// mount.
pub const DEFAULT_LOG_BLOCK_SIZE: u32 = 4096;

fn alloc_buffer<E>(len: usize) -> Result<Vec<u8>, Error<E>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// A POSIX-style filesystem over a flash block device.
///
/// The adapter owns the engine and its buffers while mounted and shares the
/// block device with the engine's storage bridge. The device is initialized
/// during mount and deinitialized during unmount; dropping a mounted
/// adapter unmounts it, discarding any deinit error.
pub struct FlashFileSystem<B: BlockDevice> {
    name: Option<String>,
    log_page_size: u32,
    log_block_size: u32,
    device: Option<Rc<RefCell<B>>>,
    engine: Option<Flashfs<DeviceStorage<B>>>,
}

impl<B: BlockDevice> FlashFileSystem<B> {
    /// An unmounted filesystem with default geometry hints.
    pub fn new(name: &str) -> Self {
        Self::with_sizes(name, DEFAULT_LOG_PAGE_SIZE, DEFAULT_LOG_BLOCK_SIZE)
    }

    /// An unmounted filesystem with explicit geometry hints. Both hints are
    /// raised to the device's native granularities at mount.
    pub fn with_sizes(name: &str, log_page_size: u32, log_block_size: u32) -> Self {
        Self {
            name: Some(name.to_owned()),
            log_page_size,
            log_block_size,
            device: None,
            engine: None,
        }
    }

    /// Construct and immediately mount, with a consistency check.
    pub fn attach(name: &str, device: Rc<RefCell<B>>) -> Result<Self, Error<B::Error>> {
        let mut fs = Self::new(name);
        fs.mount_with(device, true)?;
        Ok(fs)
    }

    /// Whether a mounted engine is attached.
    pub fn is_mounted(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.is_mounted())
    }

    /// Mount the filesystem on `device`, running a consistency check after
    /// a successful engine mount.
    pub fn mount(&mut self, device: Rc<RefCell<B>>) -> Result<(), Error<B::Error>> {
        self.mount_with(device, true)
    }

    fn mount_with(&mut self, device: Rc<RefCell<B>>, check: bool) -> Result<(), Error<B::Error>> {
        if self.engine.is_some() {
            // Still holding a previous mount; unmount first so nothing leaks.
            return Err(Error::InvalidArgument);
        }

        self.device = Some(Rc::clone(&device));
        device.borrow_mut().init().map_err(Error::Device)?;
        let (size, erase_size, program_size) = {
            let dev = device.borrow();
            (dev.size(), dev.erase_size(), dev.program_size())
        };
        let phys_size = u32::try_from(size).map_err(|_| Error::InvalidArgument)?;
        let log_block_size = self.log_block_size.max(erase_size);
        let log_page_size = self.log_page_size.max(program_size);

        let buffers = MountBuffers {
            work: alloc_buffer(2 * log_page_size as usize)?,
            fds: alloc_buffer(FILE_DESCRIPTORS * FD_SLOT_SIZE)?,
            cache: alloc_buffer(
                CACHE_HEADER_SIZE + CACHE_PAGES * (CACHE_PAGE_HEADER_SIZE + log_page_size as usize),
            )?,
        };
        let config = Config {
            phys_size,
            phys_addr: 0,
            phys_erase_block: erase_size,
            log_block_size,
            log_page_size,
            storage: DeviceStorage::new(device),
        };
        let mut engine = Flashfs::new(config, buffers).map_err(translate::error_of)?;

        let mounted = engine.mount();
        let checked = match (&mounted, check) {
            (Ok(()), true) => engine.check(),
            _ => Ok(()),
        };
        // The engine (and with it the buffers) stays attached even when the
        // mount failed; unmount releases everything.
        self.engine = Some(engine);
        mounted.map_err(translate::error_of)?;
        checked.map_err(translate::error_of)?;

        log::info!(
            "mounted {} ({size} bytes, page {log_page_size}, block {log_block_size})",
            self.name.as_deref().unwrap_or("<scratch>"),
        );
        Ok(())
    }

    /// Write a fresh, empty filesystem to `device`.
    ///
    /// Probes the device through a scratch instance first: anything other
    /// than a missing filesystem aborts, and a filesystem that does mount is
    /// unmounted before the low-level format runs.
    pub fn format(
        device: Rc<RefCell<B>>,
        log_page_size: u32,
        log_block_size: u32,
    ) -> Result<(), Error<B::Error>> {
        let mut scratch = Self {
            name: None,
            log_page_size,
            log_block_size,
            device: None,
            engine: None,
        };
        match scratch.mount_with(device, false) {
            Ok(()) => {
                // The low-level format requires the engine offline.
                if let Some(engine) = scratch.engine.as_mut() {
                    engine.unmount();
                }
            }
            Err(Error::NoSuchDevice) => {}
            Err(e) => return Err(e), // scratch drop releases the buffers
        }
        let Some(engine) = scratch.engine.as_mut() else {
            return Err(Error::NoSuchDevice);
        };
        engine.format().map_err(translate::error_of)?;
        scratch.release()
    }

    /// Release the engine, buffers and device. Idempotent.
    fn release(&mut self) -> Result<(), Error<B::Error>> {
        if let Some(mut engine) = self.engine.take() {
            engine.unmount();
            log::info!(
                "unmounted {}",
                self.name.as_deref().unwrap_or("<scratch>")
            );
        }
        if let Some(device) = self.device.take() {
            device.borrow_mut().deinit().map_err(Error::Device)?;
        }
        Ok(())
    }

    fn engine_mut(&mut self) -> Result<&mut Flashfs<DeviceStorage<B>>, Error<B::Error>> {
        self.engine.as_mut().ok_or(Error::InvalidArgument)
    }
}

impl<B: BlockDevice> Drop for FlashFileSystem<B> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl<B: BlockDevice> Filesystem for FlashFileSystem<B> {
    type DeviceError = B::Error;

    fn unmount(&mut self) -> Result<(), Error<B::Error>> {
        self.release()
    }

    fn remove(&mut self, path: &str) -> Result<(), Error<B::Error>> {
        self.engine_mut()?
            .remove(path)
            .map_err(translate::error_of)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), Error<B::Error>> {
        self.engine_mut()?
            .rename(from, to)
            .map_err(translate::error_of)
    }

    fn stat(&mut self, path: &str) -> Result<Stat, Error<B::Error>> {
        let stat = self.engine_mut()?.stat(path).map_err(translate::error_of)?;
        Ok(Stat {
            size: u64::from(stat.size),
            mode: translate::mode_of(stat.object_type),
        })
    }

    fn file_open(&mut self, path: &str, flags: OpenFlags) -> Result<FileHandle, Error<B::Error>> {
        self.engine_mut()?
            .open(path, translate::flags_of(flags))
            .map(FileHandle)
            .map_err(translate::error_of)
    }

    fn file_close(&mut self, file: FileHandle) -> Result<(), Error<B::Error>> {
        self.engine_mut()?
            .close(file.0)
            .map_err(translate::error_of)
    }

    fn file_read(
        &mut self,
        file: &FileHandle,
        buf: &mut [u8],
    ) -> Result<usize, Error<B::Error>> {
        self.engine_mut()?
            .read(file.0, buf)
            .map_err(translate::error_of)
    }

    fn file_write(&mut self, file: &FileHandle, buf: &[u8]) -> Result<usize, Error<B::Error>> {
        self.engine_mut()?
            .write(file.0, buf)
            .map_err(translate::error_of)
    }

    fn file_seek(&mut self, file: &FileHandle, pos: SeekFrom) -> Result<u64, Error<B::Error>> {
        let (offset, whence) = translate::whence_of(pos);
        self.engine_mut()?
            .lseek(file.0, offset, whence)
            .map(u64::from)
            .map_err(translate::error_of)
    }

    fn file_tell(&mut self, file: &FileHandle) -> Result<u64, Error<B::Error>> {
        self.engine_mut()?
            .tell(file.0)
            .map(u64::from)
            .map_err(translate::error_of)
    }

    fn file_size(&mut self, file: &FileHandle) -> Result<u64, Error<B::Error>> {
        self.engine_mut()?
            .fstat(file.0)
            .map(|stat| u64::from(stat.size))
            .map_err(translate::error_of)
    }

    fn dir_open(&mut self, path: &str) -> Result<DirHandle, Error<B::Error>> {
        // The iteration state only comes into existence on success, so a
        // failed open has nothing to release.
        self.engine_mut()?
            .opendir(path)
            .map(|state| DirHandle(Box::new(state)))
            .map_err(translate::error_of)
    }

    fn dir_read(&mut self, dir: &mut DirHandle) -> Result<Option<DirEntry>, Error<B::Error>> {
        let entry = self
            .engine_mut()?
            .readdir(&mut dir.0)
            .map_err(translate::error_of)?;
        Ok(entry.map(|raw| DirEntry {
            name: raw.name,
            entry_type: translate::entry_type_of(raw.object_type),
        }))
    }

    fn dir_close(&mut self, dir: DirHandle) -> Result<(), Error<B::Error>> {
        // The state record is dropped whatever the engine says.
        self.engine_mut()?
            .closedir(*dir.0)
            .map_err(translate::error_of)
    }
}
