//! Per-scanline sprite attribute values, as fed to H-Blank effects.

use bitfield::bitfield;
use bytemuck::{Pod, Zeroable};

bitfield! {
    #[repr(transparent)]
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct SpriteFirstAttributes(u16);
    impl Debug;
    pub visible, set_visible: 0;
    pub mosaic_enabled, set_mosaic_enabled: 1;
    pub blending_enabled, set_blending_enabled: 2;
    pub window_enabled, set_window_enabled: 3;
}

impl SpriteFirstAttributes {
    pub fn new(visible: bool, mosaic_enabled: bool, blending_enabled: bool, window_enabled: bool) -> Self {
        let mut attributes = SpriteFirstAttributes(0);
        attributes.set_visible(visible);
        attributes.set_mosaic_enabled(mosaic_enabled);
        attributes.set_blending_enabled(blending_enabled);
        attributes.set_window_enabled(window_enabled);
        attributes
    }
}

bitfield! {
    #[repr(transparent)]
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct SpriteRegularSecondAttributes(u16);
    impl Debug;
    pub horizontal_flip, set_horizontal_flip: 0;
    pub vertical_flip, set_vertical_flip: 1;
}

impl SpriteRegularSecondAttributes {
    pub fn new(horizontal_flip: bool, vertical_flip: bool) -> Self {
        let mut attributes = SpriteRegularSecondAttributes(0);
        attributes.set_horizontal_flip(horizontal_flip);
        attributes.set_vertical_flip(vertical_flip);
        attributes
    }
}

bitfield! {
    /// Same layout as the third OAM attribute word.
    #[repr(transparent)]
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct SpriteThirdAttributes(u16);
    impl Debug;
    u16;
    pub tiles_index, set_tiles_index: 9, 0;
    pub bg_priority, set_bg_priority: 11, 10;
    pub palette_bank, set_palette_bank: 15, 12;
}

impl SpriteThirdAttributes {
    pub fn new(tiles_index: u16, bg_priority: u8, palette_bank: u8) -> Self {
        assert!(tiles_index < 1024, "Invalid tiles index: {tiles_index}");
        assert!(bg_priority < 4, "Invalid BG priority: {bg_priority}");
        assert!(palette_bank < 16, "Invalid palette bank: {palette_bank}");

        let mut attributes = SpriteThirdAttributes(0);
        attributes.set_tiles_index(tiles_index);
        attributes.set_bg_priority(bg_priority as u16);
        attributes.set_palette_bank(palette_bank as u16);
        attributes
    }

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }
}

unsafe impl Zeroable for SpriteFirstAttributes {}
unsafe impl Pod for SpriteFirstAttributes {}
unsafe impl Zeroable for SpriteRegularSecondAttributes {}
unsafe impl Pod for SpriteRegularSecondAttributes {}
unsafe impl Zeroable for SpriteThirdAttributes {}
unsafe impl Pod for SpriteThirdAttributes {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_attributes_match_the_oam_word() {
        let attributes = SpriteThirdAttributes::new(300, 2, 5);
        assert_eq!(attributes.raw(), vbank_hw::oam::third_attributes(300, 2, 5));
    }

    #[test]
    fn first_attributes_flags() {
        let attributes = SpriteFirstAttributes::new(true, false, true, false);
        assert!(attributes.visible());
        assert!(!attributes.mosaic_enabled());
        assert!(attributes.blending_enabled());
    }
}
