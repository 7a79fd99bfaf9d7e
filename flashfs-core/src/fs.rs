//! The engine proper: mount state, object operations, directory iteration.

use std::collections::BTreeMap;

use crate::cache::PageCache;
use crate::error::FsError;
use crate::layout::{
    self, IndexRecord, KIND_DATA, KIND_FREE, KIND_INDEX, LIVE_OFFSET, MAX_NAME_LEN, PageHeader,
    SUPERBLOCK_LEN,
};
use crate::storage::Storage;
use crate::types::{Fd, ObjectStat, ObjectType, OpenFlags, Whence};
use crate::{Config, FD_SLOT_SIZE, MountBuffers};

const MIN_PAGE_SIZE: u32 = 128;
const MIN_BLOCKS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Free,
    Index,
    Data,
    Deleted,
}

#[derive(Debug, Clone)]
struct Object {
    name: String,
    otype: ObjectType,
    size: u32,
    index_page: u32,
    seq: u16,
}

#[derive(Debug, Clone, Copy)]
struct FileDesc {
    obj_id: u16,
    flags: OpenFlags,
    pos: u32,
}

/// Directory iteration state.
///
/// Snapshot of the index pages that were live when the directory was
/// opened; entries removed after the snapshot are skipped during iteration.
#[derive(Debug)]
pub struct DirState {
    pages: Vec<u32>,
    pos: usize,
}

/// One directory entry as the engine reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirEntry {
    pub name: String,
    pub object_type: ObjectType,
    pub size: u32,
}

/// Point-in-time usage summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfo {
    pub total_pages: u32,
    pub free_pages: u32,
    pub deleted_pages: u32,
    pub objects: usize,
    pub log_page_size: u32,
    pub log_block_size: u32,
}

/// The flash filesystem engine.
///
/// Constructed unmounted; [`mount`](Self::mount) brings it online against
/// whatever image the storage currently holds, [`format`](Self::format)
/// writes a fresh empty image (and requires the engine to be unmounted).
pub struct Flashfs<S: Storage> {
    config: Config<S>,
    total_pages: u32,
    pages_per_block: u32,
    block_count: u32,
    first_obj_page: u32,
    work: Vec<u8>,
    fds: Vec<u8>,
    cache: PageCache,
    pages: Vec<PageState>,
    objects: BTreeMap<u16, Object>,
    mounted: bool,
    alloc_hint: u32,
}

impl<S: Storage> Flashfs<S> {
    /// Validate the configuration and buffers and build an unmounted engine.
    pub fn new(config: Config<S>, buffers: MountBuffers) -> Result<Self, FsError<S::Error>> {
        let page = config.log_page_size;
        let block = config.log_block_size;
        let configured = page >= MIN_PAGE_SIZE
            && block > 0
            && block % page == 0
            && config.phys_erase_block > 0
            && block % config.phys_erase_block == 0
            && config.phys_size % block == 0
            && config.phys_size / block >= MIN_BLOCKS
            // data page references are stored as u16
            && config.phys_size / page <= u16::MAX as u32
            && buffers.work.len() >= 2 * page as usize
            && buffers.fds.len() >= FD_SLOT_SIZE;
        if !configured {
            return Err(FsError::NotConfigured);
        }

        let total_pages = config.phys_size / page;
        let pages_per_block = block / page;
        let cache = PageCache::new(buffers.cache, page as usize);
        log::debug!(
            "engine configured: {} pages of {page} bytes, {} cache frames",
            total_pages,
            cache.frames()
        );
        Ok(Self {
            block_count: config.phys_size / block,
            first_obj_page: pages_per_block,
            config,
            total_pages,
            pages_per_block,
            work: buffers.work,
            fds: buffers.fds,
            cache,
            pages: vec![PageState::Free; total_pages as usize],
            objects: BTreeMap::new(),
            mounted: false,
            alloc_hint: pages_per_block,
        })
    }

    /// Whether the engine is currently mounted.
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Usage summary; meaningful only while mounted.
    pub fn info(&self) -> FsInfo {
        let mut free = 0;
        let mut deleted = 0;
        for state in &self.pages[self.first_obj_page as usize..] {
            match state {
                PageState::Free => free += 1,
                PageState::Deleted => deleted += 1,
                _ => {}
            }
        }
        FsInfo {
            total_pages: self.total_pages,
            free_pages: free,
            deleted_pages: deleted,
            objects: self.objects.len(),
            log_page_size: self.config.log_page_size,
            log_block_size: self.config.log_block_size,
        }
    }

    // ---- mount / unmount / format / check ----

    /// Mount the image currently held by the storage.
    pub fn mount(&mut self) -> Result<(), FsError<S::Error>> {
        if self.mounted {
            return Err(FsError::Mounted);
        }

        let mut sb = [0u8; SUPERBLOCK_LEN];
        self.config
            .storage
            .read(self.config.phys_addr, &mut sb)
            .map_err(FsError::Hal)?;
        match layout::decode_superblock(&sb) {
            Some((page, block))
                if page == self.config.log_page_size && block == self.config.log_block_size => {}
            // Wrong geometry is as unmountable as no image at all.
            _ => return Err(FsError::NotAFs),
        }

        self.pages.fill(PageState::Free);
        self.objects.clear();
        for idx in self.first_obj_page..self.total_pages {
            let header = self.read_header(idx)?;
            if header.kind == KIND_FREE {
                continue;
            }
            if !header.live {
                self.pages[idx as usize] = PageState::Deleted;
                continue;
            }
            match header.kind {
                KIND_DATA => self.pages[idx as usize] = PageState::Data,
                KIND_INDEX => {
                    self.pages[idx as usize] = PageState::Index;
                    let rec = match self.read_index(idx) {
                        Ok(rec) => rec,
                        Err(FsError::NotFound) => {
                            self.mark_deleted(idx)?;
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    self.adopt_index(header.obj_id, idx, rec)?;
                }
                kind => {
                    log::warn!("page {idx}: unknown kind {kind:#x}, retiring");
                    self.mark_deleted(idx)?;
                }
            }
        }

        self.fds.fill(0);
        self.alloc_hint = self.first_obj_page;
        self.mounted = true;
        log::debug!("mounted, {} objects", self.objects.len());
        Ok(())
    }

    /// Record a scanned index page, resolving duplicates by sequence number.
    fn adopt_index(
        &mut self,
        obj_id: u16,
        idx: u32,
        rec: IndexRecord,
    ) -> Result<(), FsError<S::Error>> {
        if let Some(prev) = self.objects.get(&obj_id) {
            let newer = rec.seq != prev.seq && rec.seq.wrapping_sub(prev.seq) < 0x8000;
            if !newer {
                self.mark_deleted(idx)?;
                return Ok(());
            }
            let stale = prev.index_page;
            self.mark_deleted(stale)?;
        }
        self.objects.insert(
            obj_id,
            Object {
                name: rec.name,
                otype: rec.otype,
                size: rec.size,
                index_page: idx,
                seq: rec.seq,
            },
        );
        Ok(())
    }

    /// Take the engine offline. Descriptors and iteration state become
    /// invalid.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.objects.clear();
        self.cache.clear();
        self.fds.fill(0);
        log::debug!("unmounted");
    }

    /// Erase the region and write a fresh, empty image. The engine must be
    /// unmounted.
    pub fn format(&mut self) -> Result<(), FsError<S::Error>> {
        if self.mounted {
            return Err(FsError::Mounted);
        }
        let block = self.config.log_block_size;
        for b in 0..self.block_count {
            let addr = self.config.phys_addr + b * block;
            self.config.storage.erase(addr, block).map_err(|e| {
                log::error!("format: erase of block {b} failed: {e}");
                FsError::EraseFail
            })?;
        }
        let sb = layout::encode_superblock(self.config.log_page_size, self.config.log_block_size);
        self.config
            .storage
            .write(self.config.phys_addr, &sb)
            .map_err(FsError::Hal)?;
        self.pages.fill(PageState::Free);
        self.objects.clear();
        self.cache.clear();
        log::debug!("formatted {} blocks", self.block_count);
        Ok(())
    }

    /// Consistency check with repair.
    ///
    /// Verifies every object's index against the pages it references and
    /// retires anything inconsistent: damaged indexes drop the object,
    /// orphaned data pages are deleted so their space can be reclaimed.
    pub fn check(&mut self) -> Result<(), FsError<S::Error>> {
        self.require_mounted()?;
        let page = self.config.log_page_size as usize;
        let cap = layout::data_capacity(page) as u32;
        let mut referenced = vec![false; self.total_pages as usize];

        let ids: Vec<u16> = self.objects.keys().copied().collect();
        for id in ids {
            let Some(obj) = self.objects.get(&id).cloned() else {
                continue;
            };
            let rec = match self.read_index(obj.index_page) {
                Ok(rec) => rec,
                Err(FsError::NotFound) => {
                    log::warn!("check: dropping object {id} with unreadable index");
                    self.objects.remove(&id);
                    self.mark_deleted(obj.index_page)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let expected = rec.size.div_ceil(cap) as usize;
            let mut consistent = rec.pages.len() == expected;
            if consistent {
                consistent = self.with_work(|fs, work| {
                    for (span, &p) in rec.pages.iter().enumerate() {
                        let p = p as u32;
                        if p < fs.first_obj_page
                            || p >= fs.total_pages
                            || fs.pages[p as usize] != PageState::Data
                        {
                            return Ok(false);
                        }
                        fs.read_page(p, &mut work[..page])?;
                        let header = PageHeader::decode(&work[..page]);
                        if header.obj_id != id
                            || header.kind != KIND_DATA
                            || !header.live
                            || layout::data_span(&work[..page]) != span as u16
                        {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                })?;
            }

            if !consistent {
                log::warn!("check: dropping inconsistent object {id} ({})", obj.name);
                self.objects.remove(&id);
                self.mark_deleted(obj.index_page)?;
                continue;
            }
            referenced[obj.index_page as usize] = true;
            for &p in &rec.pages {
                referenced[p as usize] = true;
            }
        }

        for idx in self.first_obj_page..self.total_pages {
            if self.pages[idx as usize] == PageState::Data && !referenced[idx as usize] {
                log::warn!("check: retiring orphan data page {idx}");
                self.mark_deleted(idx)?;
            }
        }
        Ok(())
    }

    // ---- object operations ----

    /// Open an object, creating it when `CREAT` is set.
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<Fd, FsError<S::Error>> {
        self.require_mounted()?;
        if path.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }

        let obj_id = match self.lookup_name(path) {
            Some(id) => {
                if flags.contains(OpenFlags::CREAT | OpenFlags::EXCL) {
                    return Err(FsError::FileExists);
                }
                let (otype, size) = {
                    let obj = self.objects.get(&id).ok_or(FsError::NotFound)?;
                    (obj.otype, obj.size)
                };
                if otype != ObjectType::File {
                    return Err(FsError::NotAFile);
                }
                if flags.contains(OpenFlags::TRUNC) && flags.contains(OpenFlags::WRONLY) && size > 0
                {
                    self.truncate_object(id)?;
                }
                id
            }
            None => {
                if !flags.contains(OpenFlags::CREAT) {
                    return Err(FsError::NotFound);
                }
                self.create_object(path)?
            }
        };

        let slot = self.fd_alloc()?;
        self.fd_store(
            slot,
            FileDesc {
                obj_id,
                flags,
                pos: 0,
            },
        );
        log::trace!("open {path:?} flags {flags:?} -> fd {slot}");
        Ok(Fd(slot as u16))
    }

    /// Close a descriptor.
    pub fn close(&mut self, fd: Fd) -> Result<(), FsError<S::Error>> {
        self.require_mounted()?;
        self.fd_load(fd)?;
        self.fd_free(fd.0 as usize);
        Ok(())
    }

    /// Read from the current position. Reading while positioned at the end
    /// of the object fails with `EndOfObject`.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, FsError<S::Error>> {
        self.require_mounted()?;
        let mut desc = self.fd_load(fd)?;
        if !desc.flags.contains(OpenFlags::RDONLY) {
            return Err(FsError::NotReadable);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let obj = self
            .objects
            .get(&desc.obj_id)
            .cloned()
            .ok_or(FsError::FileDeleted)?;
        if desc.pos >= obj.size {
            return Err(FsError::EndOfObject);
        }
        let rec = self.read_index(obj.index_page)?;

        let page = self.config.log_page_size as usize;
        let cap = layout::data_capacity(page) as u32;
        let n = (buf.len() as u32).min(rec.size - desc.pos);
        let start = desc.pos;
        self.with_work(|fs, work| {
            let mut copied = 0u32;
            while copied < n {
                let pos = start + copied;
                let span = pos / cap;
                let off = (pos % cap) as usize;
                let take = (n - copied).min(cap - pos % cap) as usize;
                let pidx = rec.pages[span as usize] as u32;
                fs.read_page(pidx, &mut work[..page])?;
                buf[copied as usize..copied as usize + take]
                    .copy_from_slice(&layout::data_payload(&work[..page])[off..off + take]);
                copied += take as u32;
            }
            Ok(())
        })?;

        desc.pos += n;
        self.fd_store(fd.0 as usize, desc);
        Ok(n as usize)
    }

    /// Write at the current position (or the end, for append descriptors).
    ///
    /// New data pages are programmed before the old index and data pages are
    /// retired, so an interrupted write resolves to either the old or the
    /// new object state at the next mount.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, FsError<S::Error>> {
        self.require_mounted()?;
        let mut desc = self.fd_load(fd)?;
        if !desc.flags.contains(OpenFlags::WRONLY) {
            return Err(FsError::NotWritable);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let obj = self
            .objects
            .get(&desc.obj_id)
            .cloned()
            .ok_or(FsError::FileDeleted)?;
        let rec = self.read_index(obj.index_page)?;

        let page = self.config.log_page_size as usize;
        let cap = layout::data_capacity(page) as u32;
        let pos = if desc.flags.contains(OpenFlags::APPEND) {
            rec.size
        } else {
            desc.pos.min(rec.size)
        };
        let len = buf.len() as u32;
        let end = pos.checked_add(len).ok_or(FsError::Full)?;
        let new_size = rec.size.max(end);
        let new_count = new_size.div_ceil(cap) as usize;
        if new_count > layout::index_capacity(page) {
            return Err(FsError::Full);
        }

        let obj_id = desc.obj_id;
        self.with_work(|fs, work| {
            // One half stages the span payload, the other holds page images.
            let (staging, image) = work.split_at_mut(page);

            let mut new_pages = rec.pages.clone();
            new_pages.resize(new_count, 0);
            let mut replaced = Vec::new();

            let first = pos / cap;
            let last = (end - 1) / cap;
            for span in first..=last {
                let span_start = span * cap;
                let span_len = (new_size - span_start).min(cap) as usize;

                staging[..span_len].fill(0);
                if (span as usize) < rec.pages.len() {
                    let old_idx = rec.pages[span as usize] as u32;
                    fs.read_page(old_idx, &mut image[..page])?;
                    let old_len = (rec.size - span_start).min(cap) as usize;
                    staging[..old_len].copy_from_slice(&layout::data_payload(image)[..old_len]);
                    replaced.push(old_idx);
                }

                let from = pos.max(span_start);
                let to = end.min(span_start + span_len as u32);
                staging[(from - span_start) as usize..(to - span_start) as usize]
                    .copy_from_slice(&buf[(from - pos) as usize..(to - pos) as usize]);

                layout::encode_data_page(obj_id, span as u16, &staging[..span_len], image);
                let pidx = fs.alloc_page()?;
                fs.program_page(pidx, &image[..page], PageState::Data)?;
                new_pages[span as usize] = pidx as u16;
            }

            let new_rec = IndexRecord {
                name: rec.name.clone(),
                otype: rec.otype,
                seq: rec.seq.wrapping_add(1),
                size: new_size,
                pages: new_pages,
            };
            new_rec.encode(obj_id, &mut image[..page]);
            let new_idx = fs.alloc_page()?;
            fs.program_page(new_idx, &image[..page], PageState::Index)?;

            for p in replaced {
                fs.mark_deleted(p)?;
            }
            fs.mark_deleted(obj.index_page)?;
            fs.objects.insert(
                obj_id,
                Object {
                    name: new_rec.name,
                    otype: new_rec.otype,
                    size: new_size,
                    index_page: new_idx,
                    seq: new_rec.seq,
                },
            );
            Ok(())
        })?;

        desc.pos = end;
        self.fd_store(fd.0 as usize, desc);
        Ok(len as usize)
    }

    /// Reposition a descriptor. Seeking outside `0..=size` fails with
    /// `EndOfObject`.
    pub fn lseek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u32, FsError<S::Error>> {
        self.require_mounted()?;
        let mut desc = self.fd_load(fd)?;
        let obj = self
            .objects
            .get(&desc.obj_id)
            .ok_or(FsError::FileDeleted)?;
        let base = match whence {
            Whence::Set => 0i64,
            Whence::Cur => desc.pos as i64,
            Whence::End => obj.size as i64,
        };
        let target = base.checked_add(offset).ok_or(FsError::EndOfObject)?;
        if target < 0 || target > obj.size as i64 {
            return Err(FsError::EndOfObject);
        }
        desc.pos = target as u32;
        self.fd_store(fd.0 as usize, desc);
        Ok(desc.pos)
    }

    /// Current position of a descriptor.
    pub fn tell(&mut self, fd: Fd) -> Result<u32, FsError<S::Error>> {
        self.require_mounted()?;
        Ok(self.fd_load(fd)?.pos)
    }

    /// Metadata for an open descriptor.
    pub fn fstat(&mut self, fd: Fd) -> Result<ObjectStat, FsError<S::Error>> {
        self.require_mounted()?;
        let desc = self.fd_load(fd)?;
        let obj = self
            .objects
            .get(&desc.obj_id)
            .ok_or(FsError::FileDeleted)?;
        Ok(ObjectStat {
            name: obj.name.clone(),
            size: obj.size,
            object_type: obj.otype,
        })
    }

    /// Metadata by name.
    pub fn stat(&mut self, path: &str) -> Result<ObjectStat, FsError<S::Error>> {
        self.require_mounted()?;
        if path.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }
        let id = self.lookup_name(path).ok_or(FsError::NotFound)?;
        let obj = self.objects.get(&id).ok_or(FsError::NotFound)?;
        Ok(ObjectStat {
            name: obj.name.clone(),
            size: obj.size,
            object_type: obj.otype,
        })
    }

    /// Remove an object by name. Open descriptors for it start failing with
    /// `FileDeleted`.
    pub fn remove(&mut self, path: &str) -> Result<(), FsError<S::Error>> {
        self.require_mounted()?;
        if path.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }
        let id = self.lookup_name(path).ok_or(FsError::NotFound)?;
        let obj = self.objects.get(&id).cloned().ok_or(FsError::NotFound)?;
        let rec = self.read_index(obj.index_page)?;
        for p in rec.pages {
            self.mark_deleted(p as u32)?;
        }
        self.mark_deleted(obj.index_page)?;
        self.objects.remove(&id);
        log::debug!("removed {path:?}");
        Ok(())
    }

    /// Rename an object. Fails with `ConflictingName` when the target name
    /// is taken.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), FsError<S::Error>> {
        self.require_mounted()?;
        if new.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }
        let id = self.lookup_name(old).ok_or(FsError::NotFound)?;
        if self.lookup_name(new).is_some() {
            return Err(FsError::ConflictingName);
        }
        let obj = self.objects.get(&id).cloned().ok_or(FsError::NotFound)?;
        let rec = self.read_index(obj.index_page)?;
        let new_rec = IndexRecord {
            name: new.to_owned(),
            otype: rec.otype,
            seq: rec.seq.wrapping_add(1),
            size: rec.size,
            pages: rec.pages,
        };
        let new_idx = self.write_index(id, &new_rec)?;
        self.mark_deleted(obj.index_page)?;
        self.objects.insert(
            id,
            Object {
                name: new_rec.name,
                otype: new_rec.otype,
                size: new_rec.size,
                index_page: new_idx,
                seq: new_rec.seq,
            },
        );
        log::debug!("renamed {old:?} -> {new:?}");
        Ok(())
    }

    // ---- directory iteration ----

    /// Begin iterating the namespace. The namespace is flat, so the path is
    /// accepted for interface compatibility and otherwise ignored.
    pub fn opendir(&mut self, path: &str) -> Result<DirState, FsError<S::Error>> {
        self.require_mounted()?;
        log::trace!("opendir {path:?}");
        Ok(DirState {
            pages: self.objects.values().map(|o| o.index_page).collect(),
            pos: 0,
        })
    }

    /// Produce the next entry, or `None` at the end.
    pub fn readdir(
        &mut self,
        dir: &mut DirState,
    ) -> Result<Option<RawDirEntry>, FsError<S::Error>> {
        self.require_mounted()?;
        while dir.pos < dir.pages.len() {
            let idx = dir.pages[dir.pos];
            dir.pos += 1;
            if self.pages[idx as usize] != PageState::Index {
                continue; // removed or rewritten since opendir
            }
            match self.read_index(idx) {
                Ok(rec) => {
                    return Ok(Some(RawDirEntry {
                        name: rec.name,
                        object_type: rec.otype,
                        size: rec.size,
                    }));
                }
                Err(FsError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Finish iterating.
    pub fn closedir(&mut self, dir: DirState) -> Result<(), FsError<S::Error>> {
        self.require_mounted()?;
        drop(dir);
        Ok(())
    }

    // ---- internals ----

    fn require_mounted(&self) -> Result<(), FsError<S::Error>> {
        if self.mounted {
            Ok(())
        } else {
            Err(FsError::NotMounted)
        }
    }

    fn lookup_name(&self, name: &str) -> Option<u16> {
        self.objects
            .iter()
            .find(|(_, o)| o.name == name)
            .map(|(&id, _)| id)
    }

    fn page_addr(&self, idx: u32) -> u32 {
        self.config.phys_addr + idx * self.config.log_page_size
    }

    /// Run `f` with the work buffer detached from `self` so the closure can
    /// hold both mutably. Never nest: the buffer is gone while `f` runs.
    fn with_work<R>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut [u8]) -> Result<R, FsError<S::Error>>,
    ) -> Result<R, FsError<S::Error>> {
        let mut work = std::mem::take(&mut self.work);
        let result = f(self, &mut work);
        self.work = work;
        result
    }

    fn read_header(&mut self, idx: u32) -> Result<PageHeader, FsError<S::Error>> {
        let mut raw = [0u8; 4];
        self.config
            .storage
            .read(self.page_addr(idx), &mut raw)
            .map_err(FsError::Hal)?;
        Ok(PageHeader::decode(&raw))
    }

    /// Read a full page image, through the cache.
    fn read_page(&mut self, idx: u32, out: &mut [u8]) -> Result<(), FsError<S::Error>> {
        if self.cache.lookup(idx, out) {
            return Ok(());
        }
        self.config
            .storage
            .read(self.page_addr(idx), out)
            .map_err(FsError::Hal)?;
        self.cache.insert(idx, out);
        Ok(())
    }

    fn program_page(
        &mut self,
        idx: u32,
        image: &[u8],
        state: PageState,
    ) -> Result<(), FsError<S::Error>> {
        self.config
            .storage
            .write(self.page_addr(idx), image)
            .map_err(FsError::Hal)?;
        self.cache.invalidate(idx);
        self.pages[idx as usize] = state;
        Ok(())
    }

    /// Retire a page by clearing its live marker. No erase needed.
    fn mark_deleted(&mut self, idx: u32) -> Result<(), FsError<S::Error>> {
        self.config
            .storage
            .write(self.page_addr(idx) + LIVE_OFFSET, &[0])
            .map_err(FsError::Hal)?;
        self.cache.invalidate(idx);
        self.pages[idx as usize] = PageState::Deleted;
        Ok(())
    }

    fn read_index(&mut self, idx: u32) -> Result<IndexRecord, FsError<S::Error>> {
        let page = self.config.log_page_size as usize;
        self.with_work(|fs, work| {
            fs.read_page(idx, &mut work[..page])?;
            IndexRecord::decode(&work[..page]).ok_or_else(|| {
                log::warn!("index page {idx} failed to decode");
                FsError::NotFound
            })
        })
    }

    fn write_index(&mut self, obj_id: u16, rec: &IndexRecord) -> Result<u32, FsError<S::Error>> {
        let page = self.config.log_page_size as usize;
        let idx = self.alloc_page()?;
        self.with_work(|fs, work| {
            rec.encode(obj_id, &mut work[..page]);
            fs.program_page(idx, &work[..page], PageState::Index)
        })?;
        Ok(idx)
    }

    fn alloc_page(&mut self) -> Result<u32, FsError<S::Error>> {
        for attempt in 0..2 {
            for i in 0..self.total_pages {
                let idx = (self.alloc_hint + i) % self.total_pages;
                if idx < self.first_obj_page {
                    continue;
                }
                if self.pages[idx as usize] == PageState::Free {
                    self.alloc_hint = (idx + 1) % self.total_pages;
                    return Ok(idx);
                }
            }
            if attempt == 0 {
                self.reclaim()?;
            }
        }
        Err(FsError::Full)
    }

    /// Erase blocks that contain only deleted or free pages. Fails with
    /// `NoDeletedBlocks` when nothing qualified.
    fn reclaim(&mut self) -> Result<(), FsError<S::Error>> {
        let mut freed = false;
        for b in 1..self.block_count {
            let start = (b * self.pages_per_block) as usize;
            let end = start + self.pages_per_block as usize;
            let mut has_deleted = false;
            let mut busy = false;
            for state in &self.pages[start..end] {
                match state {
                    PageState::Deleted => has_deleted = true,
                    PageState::Index | PageState::Data => {
                        busy = true;
                        break;
                    }
                    PageState::Free => {}
                }
            }
            if busy || !has_deleted {
                continue;
            }
            let block = self.config.log_block_size;
            let addr = self.config.phys_addr + b * block;
            self.config.storage.erase(addr, block).map_err(|e| {
                log::error!("reclaim: erase of block {b} failed: {e}");
                FsError::EraseFail
            })?;
            for idx in start..end {
                self.pages[idx] = PageState::Free;
                self.cache.invalidate(idx as u32);
            }
            log::trace!("reclaimed block {b}");
            freed = true;
        }
        if freed {
            Ok(())
        } else {
            Err(FsError::NoDeletedBlocks)
        }
    }

    fn create_object(&mut self, name: &str) -> Result<u16, FsError<S::Error>> {
        let id = (1..u16::MAX)
            .find(|id| !self.objects.contains_key(id))
            .ok_or(FsError::Full)?;
        let rec = IndexRecord {
            name: name.to_owned(),
            otype: ObjectType::File,
            seq: 0,
            size: 0,
            pages: Vec::new(),
        };
        let idx = self.write_index(id, &rec)?;
        self.objects.insert(
            id,
            Object {
                name: rec.name,
                otype: rec.otype,
                size: 0,
                index_page: idx,
                seq: 0,
            },
        );
        log::trace!("created object {id} ({name:?})");
        Ok(id)
    }

    fn truncate_object(&mut self, id: u16) -> Result<(), FsError<S::Error>> {
        let obj = self.objects.get(&id).cloned().ok_or(FsError::NotFound)?;
        let rec = self.read_index(obj.index_page)?;
        let new_rec = IndexRecord {
            name: rec.name,
            otype: rec.otype,
            seq: rec.seq.wrapping_add(1),
            size: 0,
            pages: Vec::new(),
        };
        let new_idx = self.write_index(id, &new_rec)?;
        for p in rec.pages {
            self.mark_deleted(p as u32)?;
        }
        self.mark_deleted(obj.index_page)?;
        self.objects.insert(
            id,
            Object {
                name: new_rec.name,
                otype: new_rec.otype,
                size: 0,
                index_page: new_idx,
                seq: new_rec.seq,
            },
        );
        Ok(())
    }

    // ---- descriptor table, stored in the caller's descriptor buffer ----
    // Slot layout: in_use(1) flags(1) obj_id(2 LE) pos(4 LE) pad(8).

    fn fd_limit(&self) -> usize {
        self.fds.len() / FD_SLOT_SIZE
    }

    fn fd_load(&self, fd: Fd) -> Result<FileDesc, FsError<S::Error>> {
        let i = fd.0 as usize;
        if i >= self.fd_limit() {
            return Err(FsError::BadDescriptor);
        }
        let slot = &self.fds[i * FD_SLOT_SIZE..(i + 1) * FD_SLOT_SIZE];
        if slot[0] == 0 {
            return Err(FsError::FileClosed);
        }
        Ok(FileDesc {
            flags: OpenFlags::from_bits_truncate(slot[1] as u32),
            obj_id: u16::from_le_bytes([slot[2], slot[3]]),
            pos: u32::from_le_bytes([slot[4], slot[5], slot[6], slot[7]]),
        })
    }

    fn fd_store(&mut self, i: usize, desc: FileDesc) {
        let slot = &mut self.fds[i * FD_SLOT_SIZE..(i + 1) * FD_SLOT_SIZE];
        slot[0] = 1;
        slot[1] = desc.flags.bits() as u8;
        slot[2..4].copy_from_slice(&desc.obj_id.to_le_bytes());
        slot[4..8].copy_from_slice(&desc.pos.to_le_bytes());
    }

    fn fd_alloc(&mut self) -> Result<usize, FsError<S::Error>> {
        (0..self.fd_limit())
            .find(|i| self.fds[i * FD_SLOT_SIZE] == 0)
            .ok_or(FsError::OutOfFileDescs)
    }

    fn fd_free(&mut self, i: usize) {
        self.fds[i * FD_SLOT_SIZE..(i + 1) * FD_SLOT_SIZE].fill(0);
    }
}
