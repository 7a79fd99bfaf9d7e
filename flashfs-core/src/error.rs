//! Engine error codes.

use core::fmt;

/// Errors reported by the engine.
///
/// This is a closed vocabulary; everything the engine can report is listed
/// here. Device failures surface as [`FsError::Hal`] and carry the device's
/// own error unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError<E> {
    /// The engine is not mounted.
    NotMounted,
    /// No free pages remain and nothing could be reclaimed.
    Full,
    /// No object with the given name exists.
    NotFound,
    /// A read or seek reached past the end of the object.
    EndOfObject,
    /// The object was deleted.
    Deleted,
    /// Every descriptor slot is in use.
    OutOfFileDescs,
    /// The descriptor refers to a closed file.
    FileClosed,
    /// The descriptor's object was removed while it was open.
    FileDeleted,
    /// The descriptor is out of range or not open.
    BadDescriptor,
    /// Write attempted on a descriptor opened without write access.
    NotWritable,
    /// Read attempted on a descriptor opened without read access.
    NotReadable,
    /// The target name is already taken.
    ConflictingName,
    /// The configuration or buffers are unusable.
    NotConfigured,
    /// The region does not hold a recognizable filesystem for this
    /// configuration.
    NotAFs,
    /// The engine is already mounted.
    Mounted,
    /// The device failed to erase a block.
    EraseFail,
    /// Reclaim found no deleted blocks to erase.
    NoDeletedBlocks,
    /// Exclusive create found an existing object.
    FileExists,
    /// The operation expects a file but the object is not one.
    NotAFile,
    /// The name exceeds [`MAX_NAME_LEN`](crate::MAX_NAME_LEN).
    NameTooLong,
    /// A device error, passed through untranslated.
    Hal(E),
}

impl<E: fmt::Display> fmt::Display for FsError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMounted => write!(f, "filesystem is not mounted"),
            Self::Full => write!(f, "filesystem is full"),
            Self::NotFound => write!(f, "object not found"),
            Self::EndOfObject => write!(f, "end of object"),
            Self::Deleted => write!(f, "object was deleted"),
            Self::OutOfFileDescs => write!(f, "out of file descriptors"),
            Self::FileClosed => write!(f, "file is closed"),
            Self::FileDeleted => write!(f, "file was deleted while open"),
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::NotWritable => write!(f, "descriptor is not writable"),
            Self::NotReadable => write!(f, "descriptor is not readable"),
            Self::ConflictingName => write!(f, "name already in use"),
            Self::NotConfigured => write!(f, "engine is not configured"),
            Self::NotAFs => write!(f, "no recognizable filesystem"),
            Self::Mounted => write!(f, "filesystem is already mounted"),
            Self::EraseFail => write!(f, "block erase failed"),
            Self::NoDeletedBlocks => write!(f, "no deleted blocks to reclaim"),
            Self::FileExists => write!(f, "file already exists"),
            Self::NotAFile => write!(f, "object is not a file"),
            Self::NameTooLong => write!(f, "name too long"),
            Self::Hal(e) => write!(f, "device error: {e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for FsError<E> {}
