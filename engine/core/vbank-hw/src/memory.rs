use alloc::boxed::Box;

pub const BG_PALETTE_ADDRESS: u32 = 0x0500_0000;
pub const SPRITE_PALETTE_ADDRESS: u32 = 0x0500_0200;
pub const BG_TILES_ADDRESS: u32 = 0x0600_0000;
pub const MAPS_ADDRESS: u32 = 0x0600_8000;
pub const SPRITE_TILES_ADDRESS: u32 = 0x0601_0000;
pub const OAM_ADDRESS: u32 = 0x0700_0000;

/// Colors in one palette RAM bank.
pub const PALETTE_COLORS: usize = 256;
/// Colors in a 4 bits per pixel palette slot.
pub const PALETTE_SLOT_COLORS: usize = 16;
/// 4 bits per pixel palette slots per bank.
pub const PALETTE_SLOTS: usize = PALETTE_COLORS / PALETTE_SLOT_COLORS;

/// Words in an 8×8 tile at 4 bits per pixel.
pub const TILE_WORDS: usize = 16;
pub const BG_TILES_BLOCKS: usize = 1024;
pub const SPRITE_TILES_BLOCKS: usize = 1024;

/// Cells in a 32×32 map block.
pub const MAP_BLOCK_CELLS: usize = 1024;
pub const MAP_BLOCKS: usize = 16;

pub const OAM_ITEMS: usize = 128;
pub const OAM_ITEM_WORDS: usize = 4;
pub const OAM_WORDS: usize = OAM_ITEMS * OAM_ITEM_WORDS;
pub const AFFINE_MATS: usize = 32;

const REGIONS: [(u32, usize); 6] = [
    (BG_PALETTE_ADDRESS, PALETTE_COLORS),
    (SPRITE_PALETTE_ADDRESS, PALETTE_COLORS),
    (BG_TILES_ADDRESS, BG_TILES_BLOCKS * TILE_WORDS),
    (MAPS_ADDRESS, MAP_BLOCKS * MAP_BLOCK_CELLS),
    (SPRITE_TILES_ADDRESS, SPRITE_TILES_BLOCKS * TILE_WORDS),
    (OAM_ADDRESS, OAM_WORDS),
];

/// Host-side copy of every video memory region, in 16-bit words.
pub struct VideoMemory {
    pub bg_palette: Box<[u16; PALETTE_COLORS]>,
    pub sprite_palette: Box<[u16; PALETTE_COLORS]>,
    pub bg_tiles: Box<[u16; BG_TILES_BLOCKS * TILE_WORDS]>,
    pub maps: Box<[u16; MAP_BLOCKS * MAP_BLOCK_CELLS]>,
    pub sprite_tiles: Box<[u16; SPRITE_TILES_BLOCKS * TILE_WORDS]>,
    pub oam: Box<[u16; OAM_WORDS]>,
}

impl VideoMemory {
    pub fn new() -> Self {
        Self {
            bg_palette: Box::new([0; PALETTE_COLORS]),
            sprite_palette: Box::new([0; PALETTE_COLORS]),
            bg_tiles: Box::new([0; BG_TILES_BLOCKS * TILE_WORDS]),
            maps: Box::new([0; MAP_BLOCKS * MAP_BLOCK_CELLS]),
            sprite_tiles: Box::new([0; SPRITE_TILES_BLOCKS * TILE_WORDS]),
            oam: Box::new([0; OAM_WORDS]),
        }
    }

    /// Resolves a bus address to the word it names, if it falls inside a region.
    pub fn word_mut(&mut self, address: u32) -> Option<&mut u16> {
        if address % 2 != 0 {
            return None;
        }

        let (region, index) = REGIONS.iter().enumerate().find_map(|(region, &(base, words))| {
            let index = address.checked_sub(base)? as usize / 2;
            (index < words).then_some((region, index))
        })?;

        let words: &mut [u16] = match region {
            0 => &mut self.bg_palette[..],
            1 => &mut self.sprite_palette[..],
            2 => &mut self.bg_tiles[..],
            3 => &mut self.maps[..],
            4 => &mut self.sprite_tiles[..],
            _ => &mut self.oam[..],
        };
        words.get_mut(index)
    }

    pub fn read(&mut self, address: u32) -> Option<u16> {
        self.word_mut(address).map(|word| *word)
    }

    /// Returns false when the address is outside every region.
    pub fn write(&mut self, address: u32, value: u16) -> bool {
        match self.word_mut(address) {
            Some(word) => {
                *word = value;
                true
            }
            None => false,
        }
    }

    /// The three attribute words of an OAM entry.
    pub fn oam_entry(&self, index: usize) -> [u16; 3] {
        let base = index * OAM_ITEM_WORDS;
        [self.oam[base], self.oam[base + 1], self.oam[base + 2]]
    }
}

impl Default for VideoMemory {
    fn default() -> Self {
        Self::new()
    }
}
