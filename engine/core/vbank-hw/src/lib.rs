//! # Video Hardware Surface
//!
//! Register and memory definitions for the console's video hardware:
//!
//! | Region          | Address       | Contents                                   |
//! |-----------------|---------------|--------------------------------------------|
//! | BG palette RAM  | `$0500_0000`  | 256 BGR555 colors                          |
//! | OBJ palette RAM | `$0500_0200`  | 256 BGR555 colors                          |
//! | BG tile RAM     | `$0600_0000`  | 1024 tiles of 8×8 pixels, 4 bits per pixel |
//! | BG map RAM      | `$0600_8000`  | 16 blocks of 32×32 map cells               |
//! | OBJ tile RAM    | `$0601_0000`  | 1024 tiles of 8×8 pixels, 4 bits per pixel |
//! | OAM             | `$0700_0000`  | 128 sprite entries of 4 words each         |
//!
//! Every region is addressed in 16-bit words. [`memory::VideoMemory`] owns a copy of
//! each region so the engine can run (and be tested) away from the real hardware;
//! [`dma::DmaRegisters`] describes a DMA channel's register block.

#![no_std]
extern crate alloc;

pub mod dma;
pub mod memory;
pub mod oam;

/// Visible pixels per scanline.
pub const SCREEN_WIDTH: i32 = 240;

/// Visible scanlines per frame.
pub const SCREEN_HEIGHT: i32 = 160;
