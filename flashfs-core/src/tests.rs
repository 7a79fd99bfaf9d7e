//! Engine tests against an in-memory NOR-like storage.

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

use crate::{
    CACHE_HEADER_SIZE, CACHE_PAGE_HEADER_SIZE, Config, FD_SLOT_SIZE, Fd, Flashfs, FsError,
    MountBuffers, ObjectType, OpenFlags, Storage, Whence, layout,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutOfBounds;

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "access out of bounds")
    }
}

impl core::error::Error for OutOfBounds {}

/// NOR-flavored memory: programming clears bits, erasing sets them.
#[derive(Clone)]
struct MemStorage {
    mem: Rc<RefCell<Vec<u8>>>,
}

impl MemStorage {
    fn new(size: usize) -> Self {
        Self {
            mem: Rc::new(RefCell::new(vec![0xFF; size])),
        }
    }

    fn poke_and(&self, addr: usize, mask: u8) {
        self.mem.borrow_mut()[addr] &= mask;
    }
}

impl Storage for MemStorage {
    type Error = OutOfBounds;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), OutOfBounds> {
        let mem = self.mem.borrow();
        let start = addr as usize;
        let end = start.checked_add(buf.len()).ok_or(OutOfBounds)?;
        buf.copy_from_slice(mem.get(start..end).ok_or(OutOfBounds)?);
        Ok(())
    }

    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), OutOfBounds> {
        let mut mem = self.mem.borrow_mut();
        let start = addr as usize;
        let end = start.checked_add(buf.len()).ok_or(OutOfBounds)?;
        let cells = mem.get_mut(start..end).ok_or(OutOfBounds)?;
        for (cell, byte) in cells.iter_mut().zip(buf) {
            *cell &= *byte;
        }
        Ok(())
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<(), OutOfBounds> {
        let mut mem = self.mem.borrow_mut();
        let start = addr as usize;
        let end = start.checked_add(len as usize).ok_or(OutOfBounds)?;
        mem.get_mut(start..end).ok_or(OutOfBounds)?.fill(0xFF);
        Ok(())
    }
}

const PAGE: u32 = 256;
const BLOCK: u32 = 4096;

fn engine_on(storage: MemStorage, size: u32, page: u32, fd_slots: usize) -> Flashfs<MemStorage> {
    let config = Config {
        phys_size: size,
        phys_addr: 0,
        phys_erase_block: BLOCK,
        log_block_size: BLOCK,
        log_page_size: page,
        storage,
    };
    let buffers = MountBuffers {
        work: vec![0; 2 * page as usize],
        fds: vec![0; fd_slots * FD_SLOT_SIZE],
        cache: vec![0; CACHE_HEADER_SIZE + 8 * (CACHE_PAGE_HEADER_SIZE + page as usize)],
    };
    Flashfs::new(config, buffers).unwrap()
}

/// A formatted and mounted 256 KiB engine.
fn fresh() -> Flashfs<MemStorage> {
    let size = 256 * 1024;
    let mut fs = engine_on(MemStorage::new(size as usize), size, PAGE, 4);
    fs.format().unwrap();
    fs.mount().unwrap();
    fs
}

fn create(fs: &mut Flashfs<MemStorage>, name: &str, data: &[u8]) {
    let fd = fs
        .open(name, OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::TRUNC)
        .unwrap();
    if !data.is_empty() {
        assert_eq!(fs.write(fd, data).unwrap(), data.len());
    }
    fs.close(fd).unwrap();
}

fn read_all(fs: &mut Flashfs<MemStorage>, name: &str) -> Vec<u8> {
    let fd = fs.open(name, OpenFlags::RDONLY).unwrap();
    let size = fs.fstat(fd).unwrap().size as usize;
    let mut out = vec![0u8; size];
    let mut done = 0;
    while done < size {
        done += fs.read(fd, &mut out[done..]).unwrap();
    }
    fs.close(fd).unwrap();
    out
}

#[test]
fn rejects_bad_geometry() {
    // page not a divisor of block
    let config = Config {
        phys_size: 256 * 1024,
        phys_addr: 0,
        phys_erase_block: BLOCK,
        log_block_size: BLOCK,
        log_page_size: 192,
        storage: MemStorage::new(256 * 1024),
    };
    let buffers = MountBuffers {
        work: vec![0; 512],
        fds: vec![0; FD_SLOT_SIZE],
        cache: Vec::new(),
    };
    assert_eq!(
        Flashfs::new(config, buffers).map(|_| ()),
        Err(FsError::NotConfigured)
    );
}

#[test]
fn rejects_short_work_buffer() {
    let config = Config {
        phys_size: 256 * 1024,
        phys_addr: 0,
        phys_erase_block: BLOCK,
        log_block_size: BLOCK,
        log_page_size: PAGE,
        storage: MemStorage::new(256 * 1024),
    };
    let buffers = MountBuffers {
        work: vec![0; PAGE as usize], // needs two pages
        fds: vec![0; FD_SLOT_SIZE],
        cache: Vec::new(),
    };
    assert_eq!(
        Flashfs::new(config, buffers).map(|_| ()),
        Err(FsError::NotConfigured)
    );
}

#[test]
fn mount_of_erased_flash_is_not_a_fs() {
    let mut fs = engine_on(MemStorage::new(256 * 1024), 256 * 1024, PAGE, 4);
    assert_eq!(fs.mount(), Err(FsError::NotAFs));
    assert!(!fs.is_mounted());
}

#[test]
fn mount_with_wrong_geometry_is_not_a_fs() {
    let storage = MemStorage::new(256 * 1024);
    let mut fs = engine_on(storage.clone(), 256 * 1024, PAGE, 4);
    fs.format().unwrap();

    let mut other = engine_on(storage, 256 * 1024, 512, 4);
    assert_eq!(other.mount(), Err(FsError::NotAFs));
}

#[test]
fn format_then_mount_is_empty() {
    let mut fs = fresh();
    let info = fs.info();
    assert_eq!(info.objects, 0);
    assert_eq!(info.deleted_pages, 0);
    assert!(info.free_pages > 0);

    let mut dir = fs.opendir("/").unwrap();
    assert_eq!(fs.readdir(&mut dir).unwrap(), None);
    fs.closedir(dir).unwrap();
}

#[test]
fn double_mount_fails() {
    let mut fs = fresh();
    assert_eq!(fs.mount(), Err(FsError::Mounted));
}

#[test]
fn format_while_mounted_fails() {
    let mut fs = fresh();
    assert_eq!(fs.format(), Err(FsError::Mounted));
}

#[test]
fn operations_require_mount() {
    let mut fs = engine_on(MemStorage::new(256 * 1024), 256 * 1024, PAGE, 4);
    assert_eq!(fs.stat("/a").map(|_| ()), Err(FsError::NotMounted));
    assert_eq!(
        fs.open("/a", OpenFlags::RDONLY).map(|_| ()),
        Err(FsError::NotMounted)
    );
    assert_eq!(fs.opendir("/").map(|_| ()), Err(FsError::NotMounted));
}

#[test]
fn write_and_read_back_multi_page() {
    let mut fs = fresh();
    let data: Vec<u8> = (0..3000u32).map(|i| (i * 7) as u8).collect();
    create(&mut fs, "/blob", &data);

    let stat = fs.stat("/blob").unwrap();
    assert_eq!(stat.size, 3000);
    assert_eq!(stat.object_type, ObjectType::File);
    assert_eq!(read_all(&mut fs, "/blob"), data);
}

#[test]
fn read_at_end_reports_end_of_object() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"abc");
    let fd = fs.open("/f", OpenFlags::RDONLY).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 3);
    assert_eq!(fs.read(fd, &mut buf), Err(FsError::EndOfObject));
    fs.close(fd).unwrap();
}

#[test]
fn overwrite_in_the_middle() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"0123456789");
    let fd = fs.open("/f", OpenFlags::RDWR).unwrap();
    assert_eq!(fs.lseek(fd, 3, Whence::Set).unwrap(), 3);
    assert_eq!(fs.write(fd, b"XYZ").unwrap(), 3);
    fs.close(fd).unwrap();
    assert_eq!(read_all(&mut fs, "/f"), b"012XYZ6789");
}

#[test]
fn append_lands_at_the_end() {
    let mut fs = fresh();
    create(&mut fs, "/log", b"one");
    let fd = fs
        .open("/log", OpenFlags::WRONLY | OpenFlags::APPEND)
        .unwrap();
    assert_eq!(fs.write(fd, b"two").unwrap(), 3);
    fs.close(fd).unwrap();
    assert_eq!(read_all(&mut fs, "/log"), b"onetwo");
}

#[test]
fn seek_bounds_and_tell() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"hello");
    let fd = fs.open("/f", OpenFlags::RDONLY).unwrap();
    assert_eq!(fs.tell(fd).unwrap(), 0);
    assert_eq!(fs.lseek(fd, -2, Whence::End).unwrap(), 3);
    assert_eq!(fs.tell(fd).unwrap(), 3);
    assert_eq!(fs.lseek(fd, 1, Whence::Cur).unwrap(), 4);
    assert_eq!(fs.lseek(fd, 0, Whence::End).unwrap(), 5);
    assert_eq!(fs.lseek(fd, 1, Whence::End), Err(FsError::EndOfObject));
    assert_eq!(fs.lseek(fd, -1, Whence::Set), Err(FsError::EndOfObject));
    fs.close(fd).unwrap();
}

#[test]
fn seek_with_extreme_offsets_is_out_of_bounds() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"hello");
    let fd = fs.open("/f", OpenFlags::RDONLY).unwrap();
    assert_eq!(fs.lseek(fd, 2, Whence::Set).unwrap(), 2);
    assert_eq!(fs.lseek(fd, i64::MAX, Whence::Cur), Err(FsError::EndOfObject));
    assert_eq!(fs.lseek(fd, i64::MAX, Whence::End), Err(FsError::EndOfObject));
    assert_eq!(fs.lseek(fd, i64::MIN, Whence::Cur), Err(FsError::EndOfObject));
    // failed seeks leave the position alone
    assert_eq!(fs.tell(fd).unwrap(), 2);
    fs.close(fd).unwrap();
}

#[test]
fn truncate_on_open_discards_content() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"some old content");
    let fd = fs
        .open("/f", OpenFlags::WRONLY | OpenFlags::TRUNC)
        .unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.stat("/f").unwrap().size, 0);
}

#[test]
fn exclusive_create_fails_on_existing() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"x");
    assert_eq!(
        fs.open("/f", OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::EXCL)
            .map(|_| ()),
        Err(FsError::FileExists)
    );
}

#[test]
fn open_missing_without_create_fails() {
    let mut fs = fresh();
    assert_eq!(
        fs.open("/missing", OpenFlags::RDONLY).map(|_| ()),
        Err(FsError::NotFound)
    );
}

#[test]
fn long_names_are_rejected() {
    let mut fs = fresh();
    let name = format!("/{}", "x".repeat(layout::MAX_NAME_LEN));
    assert_eq!(
        fs.open(&name, OpenFlags::RDWR | OpenFlags::CREAT).map(|_| ()),
        Err(FsError::NameTooLong)
    );
    assert_eq!(fs.stat(&name).map(|_| ()), Err(FsError::NameTooLong));
}

#[test]
fn access_mode_is_enforced() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"x");
    let ro = fs.open("/f", OpenFlags::RDONLY).unwrap();
    assert_eq!(fs.write(ro, b"y"), Err(FsError::NotWritable));
    fs.close(ro).unwrap();

    let wo = fs.open("/f", OpenFlags::WRONLY).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(fs.read(wo, &mut buf), Err(FsError::NotReadable));
    fs.close(wo).unwrap();
}

#[test]
fn descriptor_slots_are_bounded() {
    let size = 256 * 1024;
    let mut fs = engine_on(MemStorage::new(size as usize), size, PAGE, 2);
    fs.format().unwrap();
    fs.mount().unwrap();
    create(&mut fs, "/f", b"x");

    let a = fs.open("/f", OpenFlags::RDONLY).unwrap();
    let b = fs.open("/f", OpenFlags::RDONLY).unwrap();
    assert_eq!(
        fs.open("/f", OpenFlags::RDONLY).map(|_| ()),
        Err(FsError::OutOfFileDescs)
    );
    fs.close(a).unwrap();
    let c = fs.open("/f", OpenFlags::RDONLY).unwrap();
    fs.close(b).unwrap();
    fs.close(c).unwrap();
}

#[test]
fn stale_and_bogus_descriptors_fail() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"x");
    let fd = fs.open("/f", OpenFlags::RDONLY).unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.tell(fd), Err(FsError::FileClosed));
    assert_eq!(fs.close(fd), Err(FsError::FileClosed));
    assert_eq!(fs.tell(Fd::from_raw(999)), Err(FsError::BadDescriptor));
}

#[test]
fn removing_an_open_file_invalidates_its_descriptor() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"abc");
    let fd = fs.open("/f", OpenFlags::RDONLY).unwrap();
    fs.remove("/f").unwrap();

    let mut buf = [0u8; 3];
    assert_eq!(fs.read(fd, &mut buf), Err(FsError::FileDeleted));
    assert_eq!(fs.fstat(fd).map(|_| ()), Err(FsError::FileDeleted));
    // the slot itself is still closeable
    fs.close(fd).unwrap();
    assert_eq!(fs.stat("/f").map(|_| ()), Err(FsError::NotFound));
}

#[test]
fn rename_moves_and_respects_conflicts() {
    let mut fs = fresh();
    create(&mut fs, "/a", b"payload");
    create(&mut fs, "/b", b"other");

    assert_eq!(fs.rename("/a", "/b"), Err(FsError::ConflictingName));
    assert_eq!(fs.rename("/missing", "/c"), Err(FsError::NotFound));

    fs.rename("/a", "/c").unwrap();
    assert_eq!(fs.stat("/a").map(|_| ()), Err(FsError::NotFound));
    assert_eq!(read_all(&mut fs, "/c"), b"payload");
}

#[test]
fn directory_listing_reports_all_objects() {
    let mut fs = fresh();
    create(&mut fs, "/a", b"1");
    create(&mut fs, "/b", b"22");
    create(&mut fs, "/c", b"333");

    let mut dir = fs.opendir("/").unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = fs.readdir(&mut dir).unwrap() {
        assert_eq!(entry.object_type, ObjectType::File);
        seen.push((entry.name, entry.size));
    }
    fs.closedir(dir).unwrap();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("/a".to_owned(), 1),
            ("/b".to_owned(), 2),
            ("/c".to_owned(), 3)
        ]
    );
}

#[test]
fn directory_iteration_skips_entries_removed_after_opendir() {
    let mut fs = fresh();
    create(&mut fs, "/a", b"1");
    create(&mut fs, "/b", b"2");

    let mut dir = fs.opendir("/").unwrap();
    fs.remove("/a").unwrap();
    fs.remove("/b").unwrap();
    assert_eq!(fs.readdir(&mut dir).unwrap(), None);
    fs.closedir(dir).unwrap();
}

#[test]
fn content_survives_remount() {
    let storage = MemStorage::new(256 * 1024);
    let mut fs = engine_on(storage.clone(), 256 * 1024, PAGE, 4);
    fs.format().unwrap();
    fs.mount().unwrap();
    let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
    create(&mut fs, "/persist", &data);
    fs.unmount();

    let mut fs = engine_on(storage, 256 * 1024, PAGE, 4);
    fs.mount().unwrap();
    assert_eq!(fs.info().objects, 1);
    assert_eq!(read_all(&mut fs, "/persist"), data);
}

#[test]
fn unmount_invalidates_descriptors() {
    let mut fs = fresh();
    create(&mut fs, "/f", b"x");
    let fd = fs.open("/f", OpenFlags::RDONLY).unwrap();
    let dir = fs.opendir("/").unwrap();
    fs.unmount();
    assert_eq!(fs.tell(fd), Err(FsError::NotMounted));
    assert_eq!(fs.closedir(dir), Err(FsError::NotMounted));
}

#[test]
fn rewriting_reclaims_retired_pages() {
    // 64 KiB: small enough that 200 rewrites must reclaim to survive.
    let size = 64 * 1024;
    let mut fs = engine_on(MemStorage::new(size as usize), size, PAGE, 4);
    fs.format().unwrap();
    fs.mount().unwrap();

    let data = [0x5A; 200];
    for round in 0..200 {
        let fd = fs
            .open("/churn", OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::TRUNC)
            .unwrap_or_else(|e| panic!("round {round}: open failed: {e}"));
        fs.write(fd, &data)
            .unwrap_or_else(|e| panic!("round {round}: write failed: {e}"));
        fs.close(fd).unwrap();
    }
    assert_eq!(read_all(&mut fs, "/churn"), data);
    assert!(fs.info().free_pages > 0);
}

#[test]
fn filling_the_device_reports_out_of_space() {
    // Three blocks, one of them reserved: 32 usable pages.
    let size = 3 * BLOCK;
    let mut fs = engine_on(MemStorage::new(size as usize), size, PAGE, 4);
    fs.format().unwrap();
    fs.mount().unwrap();

    let fd = fs
        .open("/big", OpenFlags::RDWR | OpenFlags::CREAT)
        .unwrap();
    let err = fs.write(fd, &[0u8; 10_000]).unwrap_err();
    assert!(
        matches!(err, FsError::Full | FsError::NoDeletedBlocks),
        "unexpected error: {err:?}"
    );
}

#[test]
fn check_retires_orphan_data_pages() {
    let storage = MemStorage::new(256 * 1024);
    let mut fs = engine_on(storage.clone(), 256 * 1024, PAGE, 4);
    fs.format().unwrap();
    fs.mount().unwrap();
    create(&mut fs, "/keep", b"kept content");
    fs.unmount();

    // Forge a live data page no index references.
    let orphan_page = 256 * 1024 / PAGE - 1;
    let mut image = vec![0u8; PAGE as usize];
    layout::encode_data_page(999, 0, b"orphan", &mut image);
    storage
        .clone()
        .write(orphan_page * PAGE, &image)
        .unwrap();

    let mut fs = engine_on(storage, 256 * 1024, PAGE, 4);
    fs.mount().unwrap();
    let before = fs.info();
    fs.check().unwrap();
    let after = fs.info();

    assert_eq!(after.deleted_pages, before.deleted_pages + 1);
    assert_eq!(after.objects, 1);
    assert_eq!(read_all(&mut fs, "/keep"), b"kept content");
}

#[test]
fn check_drops_objects_with_misnumbered_data_pages() {
    let storage = MemStorage::new(256 * 1024);
    let mut fs = engine_on(storage.clone(), 256 * 1024, PAGE, 4);
    fs.format().unwrap();
    fs.mount().unwrap();
    create(&mut fs, "/keep", b"kept content");
    create(&mut fs, "/twisted", &[0x33; 300]);
    fs.unmount();

    // Clear the span field of /twisted's second data page so it claims
    // span 0. Only that page carries span 1: /keep fits in one page.
    let page = storage
        .mem
        .borrow()
        .chunks(PAGE as usize)
        .position(|p| p[2] == 0x02 && p[3] == 0xFF && p[4] == 0x01 && p[5] == 0x00)
        .unwrap();
    storage.poke_and(page * PAGE as usize + 4, 0xFE);

    let mut fs = engine_on(storage, 256 * 1024, PAGE, 4);
    fs.mount().unwrap();
    fs.check().unwrap();
    assert_eq!(fs.info().objects, 1);
    assert_eq!(fs.stat("/twisted").map(|_| ()), Err(FsError::NotFound));
    assert_eq!(read_all(&mut fs, "/keep"), b"kept content");
}

#[test]
fn mount_drops_objects_with_damaged_indexes() {
    let storage = MemStorage::new(256 * 1024);
    let mut fs = engine_on(storage.clone(), 256 * 1024, PAGE, 4);
    fs.format().unwrap();
    fs.mount().unwrap();
    create(&mut fs, "/good", b"fine");
    create(&mut fs, "/bad", b"doomed");
    fs.unmount();

    // Clear a bit inside /bad's index payload without fixing its CRC. The
    // second object created lands on the later index page.
    let bad_index = storage
        .mem
        .borrow()
        .chunks(PAGE as usize)
        .position(|p| p[2] == 0x01 && p[3] == 0xFF && p[8..].starts_with(b"/bad"))
        .unwrap();
    storage.poke_and(bad_index * PAGE as usize + 40, 0xFE);

    let mut fs = engine_on(storage, 256 * 1024, PAGE, 4);
    fs.mount().unwrap();
    assert_eq!(fs.info().objects, 1);
    assert_eq!(read_all(&mut fs, "/good"), b"fine");
    assert_eq!(fs.stat("/bad").map(|_| ()), Err(FsError::NotFound));
}
