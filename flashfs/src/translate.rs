//! Pure mappings between the generic vocabulary and the engine's.

use flashfs_core::{FsError, ObjectType, Whence};

use crate::interface::{EntryType, Error, Mode, OpenFlags, SeekFrom};

/// Map an engine error to its one generic kind. Device errors pass through
/// unchanged.
pub(crate) fn error_of<E>(err: FsError<E>) -> Error<E> {
    match err {
        FsError::NotMounted => Error::InvalidArgument,
        FsError::Full => Error::OutOfSpace,
        FsError::NotFound => Error::NotFound,
        FsError::EndOfObject => Error::EndOfStream,
        FsError::Deleted => Error::NotFound,
        FsError::OutOfFileDescs => Error::OutOfMemory,
        FsError::FileClosed => Error::InvalidArgument,
        FsError::FileDeleted => Error::NotFound,
        FsError::BadDescriptor => Error::BadDescriptor,
        FsError::NotWritable => Error::InvalidArgument,
        FsError::NotReadable => Error::InvalidArgument,
        FsError::ConflictingName => Error::AlreadyExists,
        FsError::NotConfigured => Error::InvalidArgument,
        FsError::NotAFs => Error::NoSuchDevice,
        FsError::Mounted => Error::InvalidArgument,
        FsError::EraseFail => Error::Io,
        FsError::NoDeletedBlocks => Error::OutOfSpace,
        FsError::FileExists => Error::AlreadyExists,
        FsError::NotAFile => Error::IsADirectory,
        FsError::NameTooLong => Error::NameTooLong,
        FsError::Hal(e) => Error::Device(e),
    }
}

/// Map generic open flags onto the engine's flag bits.
///
/// The access mode is masked to its 2-bit field before comparison so
/// modifier bits can never corrupt the decode. The reserved field value 3
/// yields no access bits at all; the engine then rejects both reads and
/// writes on the descriptor.
pub(crate) fn flags_of(flags: OpenFlags) -> flashfs_core::OpenFlags {
    use flashfs_core::OpenFlags as E;

    let mut out = match (flags & OpenFlags::ACCMODE).bits() {
        0 => E::RDONLY,
        1 => E::WRONLY,
        2 => E::RDWR,
        _ => E::empty(),
    };
    if flags.contains(OpenFlags::APPEND) {
        out |= E::APPEND;
    }
    if flags.contains(OpenFlags::CREATE) {
        out |= E::CREAT;
    }
    if flags.contains(OpenFlags::TRUNCATE) {
        out |= E::TRUNC;
    }
    if flags.contains(OpenFlags::EXCLUSIVE) {
        out |= E::EXCL;
    }
    out
}

/// Split a seek position into the engine's offset and origin. The typed
/// origin enum makes an out-of-range origin unrepresentable, so no fallback
/// arm exists.
pub(crate) fn whence_of(pos: SeekFrom) -> (i64, Whence) {
    match pos {
        SeekFrom::Start(offset) => (offset as i64, Whence::Set),
        SeekFrom::Current(offset) => (offset, Whence::Cur),
        SeekFrom::End(offset) => (offset, Whence::End),
    }
}

/// Mode bits for an engine object type. Everything is world accessible; the
/// engine stores no permissions.
pub(crate) fn mode_of(otype: ObjectType) -> Mode {
    let kind = match otype {
        ObjectType::Dir => Mode::S_IFDIR,
        ObjectType::File => Mode::S_IFREG,
        ObjectType::HardLink | ObjectType::SoftLink => Mode::S_IFLNK,
    };
    kind | Mode::PERM_ALL
}

/// Directory-entry type tag for an engine object type.
pub(crate) fn entry_type_of(otype: ObjectType) -> EntryType {
    match otype {
        ObjectType::Dir => EntryType::Directory,
        ObjectType::File => EntryType::RegularFile,
        ObjectType::HardLink | ObjectType::SoftLink => EntryType::Link,
    }
}
