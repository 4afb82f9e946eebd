//! OAM attribute word encoding.
//!
//! Each OAM entry holds three attribute words followed by one word of affine
//! matrix parameters; matrix `n` is spread over word 3 of entries `4n..4n+4`.

use bit_field::BitField;

use crate::memory::{OAM_ADDRESS, OAM_ITEM_WORDS};

/// First attribute word of an entry that is never drawn.
pub const HIDDEN_ATTR0: u16 = (AffineMode::Hidden as u16) << 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AffineMode {
    Regular = 0,
    Affine = 1,
    Hidden = 2,
    AffineDoubleSize = 3,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjMode {
    Normal = 0,
    Blending = 1,
    Window = 2,
}

pub fn first_attributes(y: i32, affine: AffineMode, mode: ObjMode, mosaic: bool, bpp8: bool, shape: u8) -> u16 {
    let mut attr = 0u16;
    attr.set_bits(0..8, y as u16 & 0xFF);
    attr.set_bits(8..10, affine as u16);
    attr.set_bits(10..12, mode as u16);
    attr.set_bit(12, mosaic);
    attr.set_bit(13, bpp8);
    attr.set_bits(14..16, shape as u16 & 0b11);
    attr
}

pub fn regular_second_attributes(x: i32, horizontal_flip: bool, vertical_flip: bool, size: u8) -> u16 {
    let mut attr = 0u16;
    attr.set_bits(0..9, x as u16 & 0x1FF);
    attr.set_bit(12, horizontal_flip);
    attr.set_bit(13, vertical_flip);
    attr.set_bits(14..16, size as u16 & 0b11);
    attr
}

pub fn affine_second_attributes(x: i32, affine_mat: u8, size: u8) -> u16 {
    let mut attr = 0u16;
    attr.set_bits(0..9, x as u16 & 0x1FF);
    attr.set_bits(9..14, affine_mat as u16 & 0x1F);
    attr.set_bits(14..16, size as u16 & 0b11);
    attr
}

pub fn third_attributes(tile: u16, bg_priority: u8, palette_bank: u8) -> u16 {
    let mut attr = 0u16;
    attr.set_bits(0..10, tile & 0x3FF);
    attr.set_bits(10..12, bg_priority as u16 & 0b11);
    attr.set_bits(12..16, palette_bank as u16 & 0xF);
    attr
}

/// Replaces the vertical position of a first attribute word.
pub fn with_y(mut attr0: u16, y: i32) -> u16 {
    attr0.set_bits(0..8, y as u16 & 0xFF);
    attr0
}

/// Replaces the horizontal position of a second attribute word.
pub fn with_x(mut attr1: u16, x: i32) -> u16 {
    attr1.set_bits(0..9, x as u16 & 0x1FF);
    attr1
}

pub fn affine_mode(attr0: u16) -> AffineMode {
    match attr0.get_bits(8..10) {
        0 => AffineMode::Regular,
        1 => AffineMode::Affine,
        2 => AffineMode::Hidden,
        _ => AffineMode::AffineDoubleSize,
    }
}

/// Word index of parameter `parameter` (0 = pa … 3 = pd) of an affine matrix.
pub const fn affine_parameter_index(affine_mat: usize, parameter: usize) -> usize {
    (affine_mat * 4 + parameter) * OAM_ITEM_WORDS + 3
}

/// Bus address of attribute word `word` of OAM entry `index`.
pub const fn attribute_address(index: usize, word: usize) -> u32 {
    OAM_ADDRESS + ((index * OAM_ITEM_WORDS + word) * 2) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_positions_wrap_into_the_field() {
        let attr0 = first_attributes(-8, AffineMode::Regular, ObjMode::Normal, false, false, 0);
        assert_eq!(attr0 & 0xFF, 0xF8);

        let attr1 = regular_second_attributes(-1, true, false, 3);
        assert_eq!(attr1 & 0x1FF, 0x1FF);
        assert!(attr1.get_bit(12));
        assert_eq!(attr1 >> 14, 3);
    }

    #[test]
    fn position_replacement_keeps_other_fields() {
        let attr0 = first_attributes(10, AffineMode::Affine, ObjMode::Blending, true, true, 2);
        let moved = with_y(attr0, 100);
        assert_eq!(moved & 0xFF, 100);
        assert_eq!(moved & 0xFF00, attr0 & 0xFF00);
        assert_eq!(affine_mode(moved), AffineMode::Affine);
    }

    #[test]
    fn hidden_word_reads_back_as_hidden() {
        assert_eq!(affine_mode(HIDDEN_ATTR0), AffineMode::Hidden);
    }

    #[test]
    fn affine_parameters_live_in_the_fourth_word() {
        assert_eq!(affine_parameter_index(0, 0), 3);
        assert_eq!(affine_parameter_index(0, 3), 15);
        assert_eq!(affine_parameter_index(1, 0), 19);
    }
}
