//! Block device contract for flashfs.
//!
//! A block device exposes byte-addressed `read`, `program` and `erase`
//! operations together with its native erase and program granularities.
//! The filesystem layers above never touch storage directly; everything
//! funnels through this trait.

mod file_device;
mod ram_device;

pub use file_device::FileDevice;
pub use ram_device::{RamDevice, RamDeviceError};

/// A byte-addressed flash-style block device.
///
/// Addresses are offsets from the start of the device. `erase` turns the
/// addressed region into the erased state (all bits set); `program` may only
/// clear bits within a previously erased region. Devices report the minimum
/// sizes at which they can erase and program so callers can align their
/// layout to the hardware.
pub trait BlockDevice {
    /// Error produced by device operations.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Initialize the device. Must be called before any I/O.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Deinitialize the device, releasing any underlying resources.
    fn deinit(&mut self) -> Result<(), Self::Error>;

    /// Total device size in bytes.
    fn size(&self) -> u64;

    /// Minimum erasable region size in bytes.
    fn erase_size(&self) -> u32;

    /// Minimum programmable region size in bytes.
    fn program_size(&self) -> u32;

    /// Read `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Program `buf.len()` bytes starting at `addr`.
    fn program(&mut self, addr: u64, buf: &[u8]) -> Result<(), Self::Error>;

    /// Erase `len` bytes starting at `addr`. Both must be aligned to
    /// [`erase_size`](Self::erase_size).
    fn erase(&mut self, addr: u64, len: u64) -> Result<(), Self::Error>;
}
