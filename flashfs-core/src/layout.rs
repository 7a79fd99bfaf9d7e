//! On-flash layout: superblock, page headers, index and data pages.
//!
//! Page 0 of the region holds the superblock; the rest of logical block 0
//! is reserved. Every other page begins with a 4-byte header. Deletion is a
//! single programmed byte (all bits cleared), so it never needs an erase.

use crc::{CRC_32_ISO_HDLC, Crc};

use crate::types::ObjectType;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub(crate) const MAGIC: u32 = 0x464C_4653; // "FLFS"
pub(crate) const VERSION: u16 = 1;
pub(crate) const SUPERBLOCK_LEN: usize = 20;

pub(crate) const PAGE_HEADER_SIZE: usize = 4;
/// Byte offset of the `live` marker within a page.
pub(crate) const LIVE_OFFSET: u32 = 3;

pub(crate) const KIND_INDEX: u8 = 0x01;
pub(crate) const KIND_DATA: u8 = 0x02;
pub(crate) const KIND_FREE: u8 = 0xFF;

const NAME_FIELD: usize = 32;
/// Longest allowed object name in bytes.
pub const MAX_NAME_LEN: usize = NAME_FIELD - 1;

// crc(4) + name(32) + type(1) + rsvd(1) + seq(2) + size(4) + count(2)
const INDEX_FIXED: usize = 46;
const DATA_SPAN_FIELD: usize = 2;

/// Number of data page references an index page can hold.
pub(crate) fn index_capacity(page_size: usize) -> usize {
    (page_size - PAGE_HEADER_SIZE - INDEX_FIXED) / 2
}

/// Payload bytes per data page.
pub(crate) fn data_capacity(page_size: usize) -> usize {
    page_size - PAGE_HEADER_SIZE - DATA_SPAN_FIELD
}

pub(crate) fn encode_superblock(log_page_size: u32, log_block_size: u32) -> [u8; SUPERBLOCK_LEN] {
    let mut out = [0u8; SUPERBLOCK_LEN];
    out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    out[4..6].copy_from_slice(&VERSION.to_le_bytes());
    out[8..12].copy_from_slice(&log_page_size.to_le_bytes());
    out[12..16].copy_from_slice(&log_block_size.to_le_bytes());
    let crc = CRC32.checksum(&out[0..16]);
    out[16..20].copy_from_slice(&crc.to_le_bytes());
    out
}

/// Returns `(log_page_size, log_block_size)` when the superblock is valid.
pub(crate) fn decode_superblock(raw: &[u8]) -> Option<(u32, u32)> {
    if raw.len() < SUPERBLOCK_LEN {
        return None;
    }
    let magic = u32::from_le_bytes(raw[0..4].try_into().ok()?);
    let version = u16::from_le_bytes(raw[4..6].try_into().ok()?);
    if magic != MAGIC || version != VERSION {
        return None;
    }
    let crc = u32::from_le_bytes(raw[16..20].try_into().ok()?);
    if crc != CRC32.checksum(&raw[0..16]) {
        return None;
    }
    let page = u32::from_le_bytes(raw[8..12].try_into().ok()?);
    let block = u32::from_le_bytes(raw[12..16].try_into().ok()?);
    Some((page, block))
}

/// Decoded 4-byte page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageHeader {
    pub obj_id: u16,
    pub kind: u8,
    pub live: bool,
}

impl PageHeader {
    pub(crate) fn encode(obj_id: u16, kind: u8) -> [u8; PAGE_HEADER_SIZE] {
        let id = obj_id.to_le_bytes();
        [id[0], id[1], kind, 0xFF]
    }

    pub(crate) fn decode(raw: &[u8]) -> Self {
        Self {
            obj_id: u16::from_le_bytes([raw[0], raw[1]]),
            kind: raw[2],
            live: raw[3] == 0xFF,
        }
    }
}

/// Decoded contents of an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexRecord {
    pub name: String,
    pub otype: ObjectType,
    pub seq: u16,
    pub size: u32,
    pub pages: Vec<u16>,
}

impl IndexRecord {
    /// Serialize into a full page image, header included. `out` must be one
    /// logical page; unused tail bytes are left erased (`0xFF`).
    pub(crate) fn encode(&self, obj_id: u16, out: &mut [u8]) {
        debug_assert!(self.name.len() <= MAX_NAME_LEN);
        debug_assert!(self.pages.len() <= index_capacity(out.len()));

        out.fill(0xFF);
        out[..PAGE_HEADER_SIZE].copy_from_slice(&PageHeader::encode(obj_id, KIND_INDEX));

        let p = &mut out[PAGE_HEADER_SIZE..];
        p[4..4 + NAME_FIELD].fill(0);
        p[4..4 + self.name.len()].copy_from_slice(self.name.as_bytes());
        p[36] = self.otype.to_raw();
        p[37] = 0;
        p[38..40].copy_from_slice(&self.seq.to_le_bytes());
        p[40..44].copy_from_slice(&self.size.to_le_bytes());
        p[44..46].copy_from_slice(&(self.pages.len() as u16).to_le_bytes());
        for (i, page) in self.pages.iter().enumerate() {
            let off = INDEX_FIXED + i * 2;
            p[off..off + 2].copy_from_slice(&page.to_le_bytes());
        }
        let end = INDEX_FIXED + self.pages.len() * 2;
        let crc = CRC32.checksum(&p[4..end]);
        p[0..4].copy_from_slice(&crc.to_le_bytes());
    }

    /// Parse a full page image. Returns `None` on CRC or structural damage.
    pub(crate) fn decode(page: &[u8]) -> Option<Self> {
        let p = &page[PAGE_HEADER_SIZE..];
        if p.len() < INDEX_FIXED {
            return None;
        }
        let count = u16::from_le_bytes(p[44..46].try_into().ok()?) as usize;
        let end = INDEX_FIXED + count * 2;
        if end > p.len() {
            return None;
        }
        let crc = u32::from_le_bytes(p[0..4].try_into().ok()?);
        if crc != CRC32.checksum(&p[4..end]) {
            return None;
        }
        let name_len = p[4..4 + NAME_FIELD].iter().position(|&b| b == 0)?;
        let name = core::str::from_utf8(&p[4..4 + name_len]).ok()?.to_owned();
        let otype = ObjectType::from_raw(p[36])?;
        let seq = u16::from_le_bytes(p[38..40].try_into().ok()?);
        let size = u32::from_le_bytes(p[40..44].try_into().ok()?);
        let mut pages = Vec::with_capacity(count);
        for i in 0..count {
            let off = INDEX_FIXED + i * 2;
            pages.push(u16::from_le_bytes(p[off..off + 2].try_into().ok()?));
        }
        Some(Self {
            name,
            otype,
            seq,
            size,
            pages,
        })
    }
}

/// Write a data page image: header, span number, payload.
pub(crate) fn encode_data_page(obj_id: u16, span: u16, payload: &[u8], out: &mut [u8]) {
    debug_assert!(payload.len() <= data_capacity(out.len()));
    out.fill(0xFF);
    out[..PAGE_HEADER_SIZE].copy_from_slice(&PageHeader::encode(obj_id, KIND_DATA));
    out[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + 2].copy_from_slice(&span.to_le_bytes());
    let start = PAGE_HEADER_SIZE + DATA_SPAN_FIELD;
    out[start..start + payload.len()].copy_from_slice(payload);
}

/// Payload slice of a data page image.
pub(crate) fn data_payload(page: &[u8]) -> &[u8] {
    &page[PAGE_HEADER_SIZE + DATA_SPAN_FIELD..]
}

/// Span number of a data page image.
pub(crate) fn data_span(page: &[u8]) -> u16 {
    u16::from_le_bytes([page[PAGE_HEADER_SIZE], page[PAGE_HEADER_SIZE + 1]])
}
