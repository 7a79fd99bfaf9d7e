//! The generic filesystem vocabulary spoken at the adapter's outer edge.

use core::fmt;

use bitflags::bitflags;
use flashfs_core::{DirState, Fd};

/// Errors reported across the generic filesystem interface.
///
/// Device errors from init and deinit pass through as [`Error::Device`]
/// without remapping; everything the engine reports is translated to one of
/// the generic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// An argument or the filesystem state made the operation impossible.
    InvalidArgument,
    /// No space left on the device.
    OutOfSpace,
    /// No such file.
    NotFound,
    /// Read or seek past the end of the file.
    EndOfStream,
    /// A buffer or descriptor-table allocation failed.
    OutOfMemory,
    /// The handle does not refer to an open file.
    BadDescriptor,
    /// The name is already taken.
    AlreadyExists,
    /// The device holds no recognizable filesystem.
    NoSuchDevice,
    /// A low-level I/O failure, such as a failed block erase.
    Io,
    /// The operation expects a file but the target is a directory.
    IsADirectory,
    /// The name exceeds the maximum length.
    NameTooLong,
    /// A block device error, passed through verbatim.
    Device(E),
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::OutOfSpace => write!(f, "no space left on device"),
            Self::NotFound => write!(f, "no such file"),
            Self::EndOfStream => write!(f, "end of stream"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::AlreadyExists => write!(f, "file already exists"),
            Self::NoSuchDevice => write!(f, "no filesystem found on device"),
            Self::Io => write!(f, "input/output error"),
            Self::IsADirectory => write!(f, "is a directory"),
            Self::NameTooLong => write!(f, "name too long"),
            Self::Device(e) => write!(f, "device error: {e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for Error<E> {}

bitflags! {
    /// Generic open flags.
    ///
    /// The two low bits form the access mode and must be decoded through
    /// [`ACCMODE`](Self::ACCMODE) masking; `RDONLY` is the zero value of
    /// that field, so flag containment checks cannot distinguish it from an
    /// unset mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open for reading only (access-mode field value 0).
        const RDONLY = 0x0000;
        /// Open for writing only.
        const WRONLY = 0x0001;
        /// Open for reading and writing.
        const RDWR = 0x0002;
        /// Mask selecting the access-mode field.
        const ACCMODE = 0x0003;
        /// Every write lands at the end of the file.
        const APPEND = 0x0008;
        /// Create the file if it does not exist.
        const CREATE = 0x0200;
        /// Truncate the file to zero length on open.
        const TRUNCATE = 0x0400;
        /// Together with `CREATE`, fail if the file already exists.
        const EXCLUSIVE = 0x0800;
    }
}

/// Seek origin and offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    /// Offset from the start of the file.
    Start(u64),
    /// Offset from the current position.
    Current(i64),
    /// Offset from the end of the file.
    End(i64),
}

bitflags! {
    /// POSIX-style mode bits reported by [`Filesystem::stat`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u32 {
        const S_IFDIR = 0o040000;
        const S_IFREG = 0o100000;
        const S_IFLNK = 0o120000;
        /// Read, write and execute for everyone.
        const PERM_ALL = 0o777;
    }
}

/// File metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// File size in bytes.
    pub size: u64,
    /// File type and permission bits.
    pub mode: Mode,
}

/// Directory entry type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    RegularFile,
    Directory,
    /// Hard and soft links both report as links; the generic vocabulary
    /// does not distinguish them.
    Link,
    Unknown,
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub entry_type: EntryType,
}

/// Handle to an open file.
///
/// Wraps the engine's own descriptor; the adapter validates it on every use
/// rather than trusting the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle(pub(crate) Fd);

/// Handle to a directory being iterated.
///
/// Owns the engine's iteration state for its whole lifetime, so the state is
/// released on every exit path, including a failed open or a handle that is
/// simply dropped.
#[derive(Debug)]
pub struct DirHandle(pub(crate) Box<DirState>);

/// The generic filesystem contract the adapter implements.
pub trait Filesystem {
    /// Error type of the backing block device.
    type DeviceError;

    /// Take the filesystem offline and release its resources.
    fn unmount(&mut self) -> Result<(), Error<Self::DeviceError>>;

    /// Remove a file by path.
    fn remove(&mut self, path: &str) -> Result<(), Error<Self::DeviceError>>;

    /// Rename a file. Fails if the new name is taken.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), Error<Self::DeviceError>>;

    /// Look up metadata by path.
    fn stat(&mut self, path: &str) -> Result<Stat, Error<Self::DeviceError>>;

    /// Open a file.
    fn file_open(
        &mut self,
        path: &str,
        flags: OpenFlags,
    ) -> Result<FileHandle, Error<Self::DeviceError>>;

    /// Close an open file.
    fn file_close(&mut self, file: FileHandle) -> Result<(), Error<Self::DeviceError>>;

    /// Read from the current position. Fails with [`Error::EndOfStream`]
    /// when the position is at the end of the file.
    fn file_read(
        &mut self,
        file: &FileHandle,
        buf: &mut [u8],
    ) -> Result<usize, Error<Self::DeviceError>>;

    /// Write at the current position.
    fn file_write(
        &mut self,
        file: &FileHandle,
        buf: &[u8],
    ) -> Result<usize, Error<Self::DeviceError>>;

    /// Reposition and return the new offset.
    fn file_seek(
        &mut self,
        file: &FileHandle,
        pos: SeekFrom,
    ) -> Result<u64, Error<Self::DeviceError>>;

    /// Current position.
    fn file_tell(&mut self, file: &FileHandle) -> Result<u64, Error<Self::DeviceError>>;

    /// Size of the open file.
    fn file_size(&mut self, file: &FileHandle) -> Result<u64, Error<Self::DeviceError>>;

    /// Open a directory for iteration.
    fn dir_open(&mut self, path: &str) -> Result<DirHandle, Error<Self::DeviceError>>;

    /// Produce the next entry, or `None` at the end.
    fn dir_read(
        &mut self,
        dir: &mut DirHandle,
    ) -> Result<Option<DirEntry>, Error<Self::DeviceError>>;

    /// Finish iterating and release the handle.
    fn dir_close(&mut self, dir: DirHandle) -> Result<(), Error<Self::DeviceError>>;
}
