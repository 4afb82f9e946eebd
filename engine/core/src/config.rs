//! Fixed capacities.
//!
//! Item tables are sized at compile time; block counts of the tile and map pools can
//! be lowered at construction through [`EngineConfig`] (to leave room for data the
//! engine doesn't manage) but never grow afterwards.

use vbank_hw::memory;

pub const MAX_SPRITES: usize = 128;
pub const MAX_TILES_ITEMS: usize = 128;
pub const MAX_MAP_ITEMS: usize = memory::MAP_BLOCKS + 1;
pub const MAX_AFFINE_MATS: usize = memory::AFFINE_MATS;
pub const MAX_HBLANK_EFFECTS: usize = 8;

/// Item table size of a 4 bits per pixel palette pool: one per slot plus one free run.
pub const MAX_PALETTE_ITEMS: usize = memory::PALETTE_SLOTS + 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub bg_tiles_blocks: u16,
    pub sprite_tiles_blocks: u16,
    pub bg_map_blocks: u16,
}

impl EngineConfig {
    pub fn validate(&self) {
        assert!(
            self.bg_tiles_blocks > 0 && self.bg_tiles_blocks as usize <= memory::BG_TILES_BLOCKS,
            "Invalid BG tiles blocks count: {}", self.bg_tiles_blocks
        );
        assert!(
            self.sprite_tiles_blocks > 0 && self.sprite_tiles_blocks as usize <= memory::SPRITE_TILES_BLOCKS,
            "Invalid sprite tiles blocks count: {}", self.sprite_tiles_blocks
        );
        assert!(
            self.bg_map_blocks > 0 && self.bg_map_blocks as usize <= memory::MAP_BLOCKS,
            "Invalid BG map blocks count: {}", self.bg_map_blocks
        );
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bg_tiles_blocks: memory::BG_TILES_BLOCKS as u16,
            sprite_tiles_blocks: memory::SPRITE_TILES_BLOCKS as u16,
            bg_map_blocks: memory::MAP_BLOCKS as u16,
        }
    }
}
