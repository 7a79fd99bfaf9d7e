//! Flat-namespace log-structured flash filesystem engine.
//!
//! The engine stores named objects in fixed-size logical pages on top of a
//! [`Storage`] port. Callers configure the logical geometry, hand over three
//! working buffers and then drive the engine through its mount, object and
//! directory entry points. There is no directory hierarchy: every object
//! lives in a single flat namespace and directory iteration walks all of
//! them.
//!
//! Wear leveling, bad-block management and power-loss recovery are outside
//! this crate's scope; updates are crash-ordered (new pages are written
//! before old ones are retired) but nothing more is promised.

mod cache;
mod error;
mod fs;
mod layout;
mod storage;
mod types;

#[cfg(test)]
mod tests;

pub use error::FsError;
pub use fs::{DirState, Flashfs, FsInfo, RawDirEntry};
pub use layout::MAX_NAME_LEN;
pub use storage::Storage;
pub use types::{Fd, ObjectStat, ObjectType, OpenFlags, Whence};

/// Bytes reserved per file descriptor slot in the descriptor buffer.
pub const FD_SLOT_SIZE: usize = 16;

/// Bytes reserved at the front of the cache buffer for cache bookkeeping.
pub const CACHE_HEADER_SIZE: usize = 8;

/// Bytes reserved in front of every cached page frame.
pub const CACHE_PAGE_HEADER_SIZE: usize = 8;

/// Engine configuration.
///
/// `log_block_size` must be a multiple of both `log_page_size` and
/// `phys_erase_block`, and the region must hold at least three logical
/// blocks. The first logical block is reserved for the superblock.
pub struct Config<S: Storage> {
    /// Size of the managed region in bytes.
    pub phys_size: u32,
    /// Byte offset of the managed region on the device.
    pub phys_addr: u32,
    /// Physical erase granularity of the device.
    pub phys_erase_block: u32,
    /// Logical block size (erase and reclaim unit).
    pub log_block_size: u32,
    /// Logical page size (allocation and addressing unit).
    pub log_page_size: u32,
    /// Port used for all physical I/O.
    pub storage: S,
}

/// The three caller-owned buffers the engine works in.
///
/// `work` must hold at least two logical pages. The descriptor buffer bounds
/// the number of concurrently open files (`fds.len() / FD_SLOT_SIZE` slots);
/// the cache buffer holds read-cache frames, each
/// [`CACHE_PAGE_HEADER_SIZE`] + one page large.
pub struct MountBuffers {
    pub work: Vec<u8>,
    pub fds: Vec<u8>,
    pub cache: Vec<u8>,
}
