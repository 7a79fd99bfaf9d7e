//! In-memory NOR-flash-like device.

use core::fmt;

use crate::BlockDevice;

/// Errors reported by [`RamDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamDeviceError {
    /// An access reached past the end of the device.
    OutOfBounds {
        /// Start address of the offending access.
        addr: u64,
        /// Length of the offending access.
        len: u64,
        /// Device size in bytes.
        size: u64,
    },
    /// An erase was not aligned to the erase size.
    UnalignedErase {
        /// Start address of the offending erase.
        addr: u64,
        /// Length of the offending erase.
        len: u64,
        /// Required alignment.
        erase_size: u32,
    },
}

impl fmt::Display for RamDeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { addr, len, size } => {
                write!(f, "access at {addr}+{len} is outside device of {size} bytes")
            }
            Self::UnalignedErase {
                addr,
                len,
                erase_size,
            } => {
                write!(f, "erase at {addr}+{len} is not aligned to {erase_size} bytes")
            }
        }
    }
}

impl core::error::Error for RamDeviceError {}

/// An in-memory device with NOR flash semantics.
///
/// Erase sets the region to `0xFF`; programming can only clear bits, so a
/// rewrite without an intervening erase corrupts data the same way real
/// flash would. Useful for tests and host-side simulation.
pub struct RamDevice {
    data: Vec<u8>,
    erase_size: u32,
    program_size: u32,
}

impl RamDevice {
    /// Create a fully erased device of `size` bytes.
    pub fn new(size: usize, erase_size: u32, program_size: u32) -> Self {
        assert!(erase_size > 0 && program_size > 0);
        assert!(size as u64 % erase_size as u64 == 0);
        Self {
            data: vec![0xFF; size],
            erase_size,
            program_size,
        }
    }

    fn check_bounds(&self, addr: u64, len: u64) -> Result<(), RamDeviceError> {
        let size = self.data.len() as u64;
        if addr.checked_add(len).is_none_or(|end| end > size) {
            return Err(RamDeviceError::OutOfBounds { addr, len, size });
        }
        Ok(())
    }
}

impl BlockDevice for RamDevice {
    type Error = RamDeviceError;

    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn erase_size(&self) -> u32 {
        self.erase_size
    }

    fn program_size(&self) -> u32 {
        self.program_size
    }

    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.check_bounds(addr, buf.len() as u64)?;
        let start = addr as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn program(&mut self, addr: u64, buf: &[u8]) -> Result<(), Self::Error> {
        self.check_bounds(addr, buf.len() as u64)?;
        let start = addr as usize;
        // NOR programming can only clear bits.
        for (cell, byte) in self.data[start..start + buf.len()].iter_mut().zip(buf) {
            *cell &= *byte;
        }
        Ok(())
    }

    fn erase(&mut self, addr: u64, len: u64) -> Result<(), Self::Error> {
        self.check_bounds(addr, len)?;
        let es = self.erase_size as u64;
        if addr % es != 0 || len % es != 0 {
            return Err(RamDeviceError::UnalignedErase {
                addr,
                len,
                erase_size: self.erase_size,
            });
        }
        self.data[addr as usize..(addr + len) as usize].fill(0xFF);
        Ok(())
    }
}
