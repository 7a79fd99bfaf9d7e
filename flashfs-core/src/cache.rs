//! Read cache living inside the caller-provided cache buffer.
//!
//! The buffer is carved into fixed frames, one logical page each, with a
//! small per-frame header and a rotating replacement counter at the front of
//! the buffer. A buffer too small for even one frame degrades to a no-op
//! cache.

use crate::{CACHE_HEADER_SIZE, CACHE_PAGE_HEADER_SIZE};

pub(crate) struct PageCache {
    buf: Vec<u8>,
    frames: usize,
    page_size: usize,
}

impl PageCache {
    pub(crate) fn new(mut buf: Vec<u8>, page_size: usize) -> Self {
        let frame = CACHE_PAGE_HEADER_SIZE + page_size;
        let frames = buf.len().saturating_sub(CACHE_HEADER_SIZE) / frame;
        buf.fill(0);
        Self {
            buf,
            frames,
            page_size,
        }
    }

    pub(crate) fn frames(&self) -> usize {
        self.frames
    }

    fn frame_offset(&self, i: usize) -> usize {
        CACHE_HEADER_SIZE + i * (CACHE_PAGE_HEADER_SIZE + self.page_size)
    }

    fn frame_page(&self, i: usize) -> Option<u32> {
        let off = self.frame_offset(i);
        if self.buf[off + 4] == 0 {
            return None;
        }
        Some(u32::from_le_bytes(
            self.buf[off..off + 4].try_into().unwrap(),
        ))
    }

    /// Copy a cached page into `out`. Returns false on miss.
    pub(crate) fn lookup(&self, page: u32, out: &mut [u8]) -> bool {
        for i in 0..self.frames {
            if self.frame_page(i) == Some(page) {
                let data = self.frame_offset(i) + CACHE_PAGE_HEADER_SIZE;
                out.copy_from_slice(&self.buf[data..data + self.page_size]);
                return true;
            }
        }
        false
    }

    /// Remember a page image, evicting round-robin when full.
    pub(crate) fn insert(&mut self, page: u32, data: &[u8]) {
        if self.frames == 0 {
            return;
        }
        let slot = match (0..self.frames).find(|&i| self.frame_page(i) == Some(page)) {
            Some(i) => i,
            None => {
                let counter = u32::from_le_bytes(self.buf[0..4].try_into().unwrap());
                self.buf[0..4].copy_from_slice(&counter.wrapping_add(1).to_le_bytes());
                counter as usize % self.frames
            }
        };
        let off = self.frame_offset(slot);
        self.buf[off..off + 4].copy_from_slice(&page.to_le_bytes());
        self.buf[off + 4] = 1;
        let data_off = off + CACHE_PAGE_HEADER_SIZE;
        self.buf[data_off..data_off + self.page_size].copy_from_slice(data);
    }

    /// Drop a page from the cache, if present.
    pub(crate) fn invalidate(&mut self, page: u32) {
        for i in 0..self.frames {
            if self.frame_page(i) == Some(page) {
                let off = self.frame_offset(i);
                self.buf[off + 4] = 0;
            }
        }
    }

    /// Drop everything.
    pub(crate) fn clear(&mut self) {
        for i in 0..self.frames {
            let off = self.frame_offset(i);
            self.buf[off + 4] = 0;
        }
    }
}
