//! # vbank
//!
//! Resource engine for a tile based console's video memory: palette, tile and map
//! banks shared through reference counted handles, a sprite manager that sorts and
//! culls sprites into OAM, affine matrices, per-scanline H-Blank effects and a
//! per-frame DMA transfer.
//!
//! Nothing is global. An [`Engine`] owns every manager and a [`hw::memory::VideoMemory`]
//! they commit to; a frame is `update`, `commit`, then `vblank`.

#![no_std]
extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod affine_mats;
pub mod camera;
pub mod color;
pub mod config;
pub mod dma;
pub mod engine;
pub mod error;
pub mod hblank;
pub mod maps;
pub mod math;
pub mod palettes;
pub mod pool;
pub mod source;
pub mod sprites;
pub mod tiles;

pub use vbank_hw as hw;

pub use affine_mats::{AffineMatAttributes, AffineMatHandle, AffineMats, DoubleSizeMode};
pub use camera::Camera;
pub use color::Color;
pub use config::EngineConfig;
pub use dma::{Hdma, HdmaGuard};
pub use engine::Engine;
pub use error::{Error, Result};
pub use hblank::{EffectTarget, HblankContext, HblankEffectHandler, HblankEffectId, HblankEffects, SpriteAxis};
pub use maps::{MapBinding, MapCell, MapHandle, MapItem, Maps};
pub use math::{Fixed, Point};
pub use pool::{ContentPool, PoolPayload};
pub use palettes::{Bpp, PaletteEffects, PaletteHandle, PaletteItem, PaletteLayer, Palettes};
pub use source::SourceRef;
pub use sprites::{SpriteBuilder, SpriteHandle, SpriteItem, SpriteShape, SpriteShapeSize, SpriteSize, Sprites};
pub use tiles::{Tile, Tiles, TilesHandle, TilesItem};
