//! # Byte-Storage Drivers
//!
//! The heap allocator depends only on the capability to read and write
//! single bytes over a contiguous address range, never on the transport
//! behind it. Two conforming drivers exist:
//!
//! - [`SliceStorage`] — direct access to a borrowed RAM buffer
//! - [`SerialStorage`] — every access framed as a short command sequence
//!   over a serial bus (external SRAM behind SPI)
//!
//! Addresses handed to a driver are absolute within its
//! `[first_addr, first_addr + size)` range; the heap never steps outside
//! the range it was configured with.

use crate::heap::{MemAddr, MemValue};

/// Non-fatal driver configuration failures, surfaced at init time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The serial transport reports itself already owned by another
    /// controller; the driver must not be used.
    BusNotOwned,
}

/// Byte-granular storage capability consumed by the heap.
pub trait StorageDriver {
    /// Bring the device into a usable state.
    fn init(&mut self) -> Result<(), StorageError>;

    /// Read the byte at `addr`.
    fn read(&mut self, addr: MemAddr) -> MemValue;

    /// Write the byte at `addr`.
    fn write(&mut self, addr: MemAddr, value: MemValue);

    /// First addressable address.
    fn first_addr(&self) -> MemAddr;

    /// Number of addressable bytes.
    fn size(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Direct-access driver
// ---------------------------------------------------------------------------

/// Direct-access driver over a borrowed byte buffer (on-chip SRAM).
pub struct SliceStorage<'a> {
    mem: &'a mut [u8],
    first: MemAddr,
}

impl<'a> SliceStorage<'a> {
    /// Expose `mem` as storage starting at address `first`.
    pub fn new(first: MemAddr, mem: &'a mut [u8]) -> Self {
        Self { mem, first }
    }
}

impl StorageDriver for SliceStorage<'_> {
    fn init(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn read(&mut self, addr: MemAddr) -> MemValue {
        self.mem[(addr - self.first) as usize]
    }

    fn write(&mut self, addr: MemAddr, value: MemValue) {
        self.mem[(addr - self.first) as usize] = value;
    }

    fn first_addr(&self) -> MemAddr {
        self.first
    }

    fn size(&self) -> usize {
        self.mem.len()
    }
}

// ---------------------------------------------------------------------------
// Serial transport
// ---------------------------------------------------------------------------

/// Byte-oriented serial link with an explicit chip select, as offered by
/// an SPI peripheral wired to an external SRAM.
pub trait SerialBus {
    /// Assert chip select.
    fn select(&mut self);

    /// Release chip select.
    fn deselect(&mut self);

    /// Clock one byte out and the simultaneous response byte in.
    fn transfer(&mut self, byte: u8) -> u8;

    /// Whether this end of the link is the bus controller. A device
    /// strapped as a peripheral must not be driven.
    fn is_controller(&self) -> bool;
}

// Command bytes understood by the serial SRAM.
const CMD_WRITE_MODE: u8 = 0x01;
const CMD_WRITE: u8 = 0x02;
const CMD_READ: u8 = 0x03;
const MODE_BYTE: u8 = 0x00;

/// Transport-based driver: frames each read/write as a command sequence
/// over a [`SerialBus`].
pub struct SerialStorage<B: SerialBus> {
    bus: B,
    first: MemAddr,
    size: usize,
}

impl<B: SerialBus> SerialStorage<B> {
    pub fn new(bus: B, first: MemAddr, size: usize) -> Self {
        Self { bus, first, size }
    }

    fn send_addr(&mut self, addr: MemAddr) {
        self.bus.transfer(0x00);
        self.bus.transfer((addr >> 8) as u8);
        self.bus.transfer((addr & 0xFF) as u8);
    }
}

impl<B: SerialBus> StorageDriver for SerialStorage<B> {
    /// Switch the device to byte mode. Fails (non-fatally) when the
    /// transport is already owned by another controller.
    fn init(&mut self) -> Result<(), StorageError> {
        if !self.bus.is_controller() {
            return Err(StorageError::BusNotOwned);
        }
        self.bus.select();
        self.bus.transfer(CMD_WRITE_MODE);
        self.bus.transfer(MODE_BYTE);
        self.bus.deselect();
        Ok(())
    }

    fn read(&mut self, addr: MemAddr) -> MemValue {
        self.bus.select();
        self.bus.transfer(CMD_READ);
        self.send_addr(addr);
        let value = self.bus.transfer(0xFF);
        self.bus.deselect();
        value
    }

    fn write(&mut self, addr: MemAddr, value: MemValue) {
        self.bus.select();
        self.bus.transfer(CMD_WRITE);
        self.send_addr(addr);
        self.bus.transfer(value);
        self.bus.deselect();
    }

    fn first_addr(&self) -> MemAddr {
        self.first
    }

    fn size(&self) -> usize {
        self.size
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn slice_storage_round_trips_at_offset() {
        let mut mem = [0u8; 16];
        let mut s = SliceStorage::new(0x100, &mut mem);
        assert_eq!(s.init(), Ok(()));
        s.write(0x100, 0xAA);
        s.write(0x10F, 0x55);
        assert_eq!(s.read(0x100), 0xAA);
        assert_eq!(s.read(0x10F), 0x55);
        assert_eq!(s.first_addr(), 0x100);
        assert_eq!(s.size(), 16);
    }

    /// Serial bus mock backed by a flat array, recording the framed
    /// command stream.
    struct MockBus {
        mem: [u8; 64],
        frame: Vec<u8>,
        log: Vec<Vec<u8>>,
        controller: bool,
    }

    impl MockBus {
        fn new() -> Self {
            Self {
                mem: [0; 64],
                frame: Vec::new(),
                log: Vec::new(),
                controller: true,
            }
        }
    }

    impl SerialBus for MockBus {
        fn select(&mut self) {
            self.frame.clear();
        }

        fn deselect(&mut self) {
            // Apply writes, archive the frame.
            if self.frame.first() == Some(&CMD_WRITE) && self.frame.len() == 5 {
                let addr = u16::from_be_bytes([self.frame[2], self.frame[3]]) as usize;
                self.mem[addr] = self.frame[4];
            }
            self.log.push(core::mem::take(&mut self.frame));
        }

        fn transfer(&mut self, byte: u8) -> u8 {
            // A read frame answers with the addressed byte on the dummy
            // transfer; everything else answers 0.
            let reply = if self.frame.first() == Some(&CMD_READ) && self.frame.len() == 4 {
                let addr = u16::from_be_bytes([self.frame[2], self.frame[3]]) as usize;
                self.mem[addr]
            } else {
                0
            };
            self.frame.push(byte);
            reply
        }

        fn is_controller(&self) -> bool {
            self.controller
        }
    }

    #[test]
    fn serial_storage_frames_commands() {
        let mut s = SerialStorage::new(MockBus::new(), 0, 64);
        assert_eq!(s.init(), Ok(()));
        s.write(0x0012, 0x5A);
        assert_eq!(s.read(0x0012), 0x5A);

        assert_eq!(s.bus.log[0], std::vec![CMD_WRITE_MODE, MODE_BYTE]);
        assert_eq!(s.bus.log[1], std::vec![CMD_WRITE, 0x00, 0x00, 0x12, 0x5A]);
        assert_eq!(s.bus.log[2], std::vec![CMD_READ, 0x00, 0x00, 0x12, 0xFF]);
    }

    #[test]
    fn serial_storage_rejects_foreign_controller() {
        let mut bus = MockBus::new();
        bus.controller = false;
        let mut s = SerialStorage::new(bus, 0, 64);
        assert_eq!(s.init(), Err(StorageError::BusNotOwned));
    }
}
