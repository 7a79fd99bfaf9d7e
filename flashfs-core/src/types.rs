//! Engine-side vocabulary types.

use bitflags::bitflags;

bitflags! {
    /// Open flags in the engine's own encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open for reading.
        const RDONLY = 0x01;
        /// Open for writing.
        const WRONLY = 0x02;
        /// Open for reading and writing.
        const RDWR = Self::RDONLY.bits() | Self::WRONLY.bits();
        /// Every write lands at the end of the object.
        const APPEND = 0x04;
        /// Truncate the object to zero length on open.
        const TRUNC = 0x08;
        /// Create the object if it does not exist.
        const CREAT = 0x10;
        /// Together with `CREAT`, fail if the object already exists.
        const EXCL = 0x40;
    }
}

/// Seek origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the object.
    Set,
    /// From the current position.
    Cur,
    /// From the end of the object.
    End,
}

/// Object kinds stored on flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    File,
    Dir,
    HardLink,
    SoftLink,
}

impl ObjectType {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            Self::File => 1,
            Self::Dir => 2,
            Self::HardLink => 3,
            Self::SoftLink => 4,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::File),
            2 => Some(Self::Dir),
            3 => Some(Self::HardLink),
            4 => Some(Self::SoftLink),
            _ => None,
        }
    }
}

/// A file descriptor issued by [`Flashfs::open`](crate::Flashfs::open).
///
/// Descriptors are plain slot numbers; the engine validates them on every
/// use, so a stale descriptor fails with `BadDescriptor` instead of
/// corrupting unrelated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fd(pub(crate) u16);

impl Fd {
    /// The raw slot number.
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Rebuild a descriptor from a raw slot number.
    pub fn from_raw(raw: u16) -> Self {
        Self(raw)
    }
}

/// Object metadata as reported by `stat` and `fstat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    /// The object's name.
    pub name: String,
    /// Object size in bytes.
    pub size: u32,
    /// What kind of object this is.
    pub object_type: ObjectType,
}
