use alloc::boxed::Box;

use bitflags::bitflags;
use volatile_register::RW;

/// Register block of DMA channel 0.
pub const DMA0_ADDRESS: usize = 0x0400_00B0;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct DmaControl: u16 {
        const DEST_DECREMENT = 0b01 << 5;
        const DEST_FIXED = 0b10 << 5;
        const DEST_RELOAD = 0b11 << 5;
        const SOURCE_DECREMENT = 0b01 << 7;
        const SOURCE_FIXED = 0b10 << 7;
        const REPEAT = 1 << 9;
        const WORDS_32 = 1 << 10;
        const START_VBLANK = 0b01 << 12;
        const START_HBLANK = 0b10 << 12;
        const IRQ = 1 << 14;
        const ENABLE = 1 << 15;
    }
}

impl DmaControl {
    /// Copy 16-bit words once per frame, reloading the destination each time.
    pub const VBLANK_REPEAT: DmaControl = DmaControl::DEST_RELOAD
        .union(DmaControl::REPEAT)
        .union(DmaControl::START_VBLANK)
        .union(DmaControl::ENABLE);
}

#[repr(C)]
pub struct DmaRegisters {
    pub source: RW<u32>,
    pub destination: RW<u32>,
    pub count: RW<u16>,
    pub control: RW<u16>,
}

impl DmaRegisters {
    /// Register block backed by ordinary memory instead of the bus.
    pub fn detached() -> Box<Self> {
        // SAFETY: every field is a volatile cell around an integer, so all zeroes is valid
        Box::new(unsafe { core::mem::zeroed() })
    }

    /// # Safety
    /// `address` must be the base of a DMA channel's register block, and nothing else
    /// may program that channel while the returned reference is in use.
    pub unsafe fn mapped(address: usize) -> &'static Self {
        unsafe { &*(address as *const Self) }
    }

    pub fn control_flags(&self) -> DmaControl {
        DmaControl::from_bits_retain(self.control.read())
    }

    pub fn enabled(&self) -> bool {
        self.control_flags().contains(DmaControl::ENABLE)
    }
}
