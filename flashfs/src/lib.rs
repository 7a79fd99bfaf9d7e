//! POSIX-style filesystem interface over the flashfs engine.
//!
//! [`FlashFileSystem`] adapts the flat-namespace flash filesystem engine to
//! a generic [`Filesystem`] interface backed by any [`BlockDevice`]. The
//! adapter owns the engine's working buffers for the duration of a mount,
//! derives the logical geometry from the device's native erase and program
//! granularities, and translates every argument and result between the two
//! vocabularies.
//!
//! ```no_run
//! use flashfs::{Error, FlashFileSystem, Filesystem, OpenFlags, RamDevice};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! # fn main() -> Result<(), Error<flashfs::RamDeviceError>> {
//! let device = Rc::new(RefCell::new(RamDevice::new(1024 * 1024, 4096, 256)));
//! FlashFileSystem::format(device.clone(), 256, 4096)?;
//!
//! let mut fs = FlashFileSystem::attach("flash", device)?;
//! let file = fs.file_open("/hello", OpenFlags::WRONLY | OpenFlags::CREATE)?;
//! fs.file_write(&file, b"hello")?;
//! fs.file_close(file)?;
//! fs.unmount()?;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod fs;
mod interface;
mod translate;

pub use flashfs_block_device::{BlockDevice, FileDevice, RamDevice, RamDeviceError};
pub use fs::{CACHE_PAGES, DEFAULT_LOG_BLOCK_SIZE, DEFAULT_LOG_PAGE_SIZE, FILE_DESCRIPTORS, FlashFileSystem};
pub use interface::{
    DirEntry, DirHandle, EntryType, Error, FileHandle, Filesystem, Mode, OpenFlags, SeekFrom, Stat,
};
