//! The storage port the engine performs all physical I/O through.

/// Byte-addressed storage operations.
///
/// Implementations forward to some actual device; the engine never touches
/// hardware any other way. Addresses are relative to the start of the
/// device, not of the managed region.
pub trait Storage {
    /// Error produced by the underlying device.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Read `buf.len()` bytes at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Program `buf.len()` bytes at `addr`.
    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), Self::Error>;

    /// Erase `len` bytes at `addr`.
    fn erase(&mut self, addr: u32, len: u32) -> Result<(), Self::Error>;
}
