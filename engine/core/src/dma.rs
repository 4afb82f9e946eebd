//! Per-frame DMA transfers.
//!
//! [`Hdma`] programs a DMA channel to copy a run of 16-bit words once per frame
//! during vertical blank, e.g. to stream a scroll table into a register block.

use alloc::boxed::Box;
use core::marker::PhantomData;

use log::debug;
use vbank_hw::dma::{DmaControl, DmaRegisters};

#[derive(Copy, Clone, Debug)]
struct Transfer {
    source: *const u16,
    destination: *mut u16,
    elements: usize,
}

/// A DMA channel repeating one transfer every frame.
///
/// The register block is detached from the bus, so [`Hdma::vblank`] performs the copy
/// the channel would.
pub struct Hdma {
    registers: Box<DmaRegisters>,
    transfer: Option<Transfer>,
}

impl Hdma {
    pub fn new() -> Self {
        Self { registers: DmaRegisters::detached(), transfer: None }
    }

    pub fn registers(&self) -> &DmaRegisters {
        &self.registers
    }

    /// Arms the channel to copy `elements` words from `source` to `destination` at
    /// every vertical blank, replacing any running transfer.
    ///
    /// # Safety
    /// Both buffers must hold `elements` words and stay valid until [`Hdma::stop`]
    /// (or the next `start`). Overlapping buffers are not detected.
    pub unsafe fn start(&mut self, source: *const u16, elements: usize, destination: *mut u16) {
        assert!(elements > 0 && elements <= u16::MAX as usize, "Invalid elements count: {elements}");

        // SAFETY: the register block is owned by this channel
        unsafe {
            self.registers.control.write(0);
            self.registers.source.write(source as usize as u32);
            self.registers.destination.write(destination as usize as u32);
            self.registers.count.write(elements as u16);
            self.registers.control.write(DmaControl::VBLANK_REPEAT.bits());
        }

        self.transfer = Some(Transfer { source, destination, elements });
        debug!(target: "hdma", "started: {} elements", elements);
    }

    /// Borrow checked variant of [`Hdma::start`]: the transfer runs until the returned
    /// guard is dropped.
    pub fn transfer<'a>(&'a mut self, source: &'a [u16], destination: &'a mut [u16]) -> HdmaGuard<'a> {
        assert!(
            destination.len() >= source.len(),
            "Invalid destination length: {} - {}", destination.len(), source.len()
        );

        // SAFETY: both slices outlive the guard, which stops the transfer on drop
        unsafe { self.start(source.as_ptr(), source.len(), destination.as_mut_ptr()) };
        HdmaGuard { hdma: self, _buffers: PhantomData }
    }

    pub fn stop(&mut self) {
        if self.transfer.take().is_some() {
            // SAFETY: the register block is owned by this channel
            unsafe { self.registers.control.write(0) };
            debug!(target: "hdma", "stopped");
        }
    }

    pub fn running(&self) -> bool {
        self.transfer.is_some() && self.registers.enabled()
    }

    /// Words copied per frame, 0 when stopped.
    pub fn elements(&self) -> usize {
        self.transfer.map_or(0, |transfer| transfer.elements)
    }

    /// Performs this frame's copy.
    pub fn vblank(&mut self) {
        let Some(transfer) = self.transfer else {
            return;
        };

        // SAFETY: validity of both buffers was promised to `start`
        unsafe { core::ptr::copy_nonoverlapping(transfer.source, transfer.destination, transfer.elements) };
    }
}

impl Default for Hdma {
    fn default() -> Self {
        Self::new()
    }
}

/// Running transfer borrowing its buffers. Stops the channel when dropped.
pub struct HdmaGuard<'a> {
    hdma: &'a mut Hdma,
    _buffers: PhantomData<&'a mut [u16]>,
}

impl HdmaGuard<'_> {
    pub fn running(&self) -> bool {
        self.hdma.running()
    }

    pub fn vblank(&mut self) {
        self.hdma.vblank();
    }
}

impl Drop for HdmaGuard<'_> {
    fn drop(&mut self) {
        self.hdma.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_once_per_vblank() {
        let source = [1u16, 2, 3, 4];
        let mut destination = [0u16; 6];
        let mut hdma = Hdma::new();

        {
            let mut guard = hdma.transfer(&source, &mut destination);
            assert!(guard.running());
            guard.vblank();
        }
        assert_eq!(destination, [1, 2, 3, 4, 0, 0]);
        assert!(!hdma.running());
        assert_eq!(hdma.elements(), 0);
    }

    #[test]
    fn start_programs_the_registers() {
        let source = [5u16; 3];
        let mut destination = [0u16; 3];
        let mut hdma = Hdma::new();

        unsafe { hdma.start(source.as_ptr(), source.len(), destination.as_mut_ptr()) };
        assert!(hdma.running());
        assert_eq!(hdma.registers().count.read(), 3);
        assert_eq!(hdma.registers().control_flags(), DmaControl::VBLANK_REPEAT);

        hdma.vblank();
        hdma.stop();
        hdma.vblank();
        assert_eq!(destination, [5; 3]);
        assert!(!hdma.registers().enabled());
    }

    #[test]
    #[should_panic(expected = "Invalid destination length")]
    fn short_destination() {
        let source = [0u16; 4];
        let mut destination = [0u16; 2];
        let mut hdma = Hdma::new();
        let _guard = hdma.transfer(&source, &mut destination);
    }
}
