//! Storage bridge: forwards the engine's physical I/O to the block device.

use std::cell::RefCell;
use std::rc::Rc;

use flashfs_block_device::BlockDevice;
use flashfs_core::Storage;

/// Adapts a shared [`BlockDevice`] to the engine's [`Storage`] port.
///
/// A pure forwarding shim: the engine's `write` becomes the device's
/// `program`, addresses widen from the engine's `u32` space to the device's
/// `u64`, and errors pass through untouched. No buffering or retry happens
/// here.
pub(crate) struct DeviceStorage<B: BlockDevice> {
    device: Rc<RefCell<B>>,
}

impl<B: BlockDevice> DeviceStorage<B> {
    pub(crate) fn new(device: Rc<RefCell<B>>) -> Self {
        Self { device }
    }
}

impl<B: BlockDevice> Storage for DeviceStorage<B> {
    type Error = B::Error;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), B::Error> {
        self.device.borrow_mut().read(u64::from(addr), buf)
    }

    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), B::Error> {
        self.device.borrow_mut().program(u64::from(addr), buf)
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<(), B::Error> {
        self.device
            .borrow_mut()
            .erase(u64::from(addr), u64::from(len))
    }
}
