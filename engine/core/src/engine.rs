use log::debug;
use vbank_hw::memory::VideoMemory;

use crate::affine_mats::AffineMats;
use crate::config::EngineConfig;
use crate::dma::Hdma;
use crate::hblank::{HblankContext, HblankEffects};
use crate::maps::Maps;
use crate::palettes::{PaletteLayer, Palettes};
use crate::sprites::Sprites;
use crate::tiles::Tiles;

/// Every manager plus the video memory they commit to.
///
/// A frame is `update` (compute, no writes), `commit` (write what changed), then
/// `vblank` (activate staged H-Blank values and run the DMA transfer).
pub struct Engine {
    pub memory: VideoMemory,
    pub bg_palettes: Palettes,
    pub sprite_palettes: Palettes,
    pub bg_tiles: Tiles,
    pub sprite_tiles: Tiles,
    pub bg_maps: Maps,
    pub affine_mats: AffineMats,
    pub sprites: Sprites,
    pub hblank_effects: HblankEffects,
    pub hdma: Hdma,
    frame: u32,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        config.validate();

        Self {
            memory: VideoMemory::new(),
            bg_palettes: Palettes::new(PaletteLayer::Bg),
            sprite_palettes: Palettes::new(PaletteLayer::Sprites),
            bg_tiles: Tiles::new("bg tiles", config.bg_tiles_blocks),
            sprite_tiles: Tiles::new("sprite tiles", config.sprite_tiles_blocks),
            bg_maps: Maps::new(config.bg_map_blocks),
            affine_mats: AffineMats::new(),
            sprites: Sprites::new(),
            hblank_effects: HblankEffects::new(),
            hdma: Hdma::new(),
            frame: 0,
        }
    }

    pub fn update(&mut self) {
        self.sprites.manager_mut().update();

        let sprites = self.sprites.manager();
        let bg_palettes = self.bg_palettes.bank();
        let sprite_palettes = self.sprite_palettes.bank();
        let ctx = HblankContext { sprites: &sprites, bg_palettes: &bg_palettes, sprite_palettes: &sprite_palettes };
        self.hblank_effects.update(&ctx);
    }

    /// Writes pending changes to video memory: banks, affine matrices, sprites, then
    /// H-Blank values. Returns the number of items written.
    pub fn commit(&mut self) -> usize {
        let memory = &mut self.memory;
        let mut written = 0;

        written += self.bg_palettes.bank_mut().commit(&mut memory.bg_palette[..]);
        written += self.sprite_palettes.bank_mut().commit(&mut memory.sprite_palette[..]);
        written += self.bg_tiles.bank_mut().commit(&mut memory.bg_tiles[..]);
        written += self.sprite_tiles.bank_mut().commit(&mut memory.sprite_tiles[..]);
        written += self.bg_maps.bank_mut().commit(&mut memory.maps[..]);
        written += self.affine_mats.manager_mut().commit(&mut memory.oam[..]);
        written += self.sprites.manager_mut().commit(&mut memory.oam[..]);

        let sprites = self.sprites.manager();
        let bg_palettes = self.bg_palettes.bank();
        let sprite_palettes = self.sprite_palettes.bank();
        let ctx = HblankContext { sprites: &sprites, bg_palettes: &bg_palettes, sprite_palettes: &sprite_palettes };
        written += self.hblank_effects.commit(&ctx);

        debug!(target: "engine", "frame {}: {} items committed", self.frame, written);
        written
    }

    pub fn vblank(&mut self) {
        self.hblank_effects.vblank();
        self.hdma.vblank();
        self.frame = self.frame.wrapping_add(1);
    }

    /// Frames since construction.
    pub fn frame(&self) -> u32 {
        self.frame
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
