use core::fmt;

use bit_field::BitField;
use bytemuck::{Pod, Zeroable};

use crate::math::Fixed;

/// 15-bit BGR color as stored in palette RAM.
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Color(u16);

unsafe impl Zeroable for Color {}
unsafe impl Pod for Color {}

impl Color {
    pub const BLACK: Color = Color(0);
    pub const WHITE: Color = Color(0x7FFF);

    pub const fn from_raw(raw: u16) -> Self {
        Color(raw & 0x7FFF)
    }

    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        assert!(red < 32, "Invalid red: {red}");
        assert!(green < 32, "Invalid green: {green}");
        assert!(blue < 32, "Invalid blue: {blue}");

        let mut raw = 0u16;
        raw.set_bits(0..5, red as u16);
        raw.set_bits(5..10, green as u16);
        raw.set_bits(10..15, blue as u16);
        Color(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub fn red(self) -> u8 {
        self.0.get_bits(0..5) as u8
    }

    pub fn green(self) -> u8 {
        self.0.get_bits(5..10) as u8
    }

    pub fn blue(self) -> u8 {
        self.0.get_bits(10..15) as u8
    }

    pub fn inverted(self) -> Color {
        Color::new(31 - self.red(), 31 - self.green(), 31 - self.blue())
    }

    /// Moves the color towards its luma by `intensity` (`[0, 1]`).
    pub fn grayscale(self, intensity: Fixed) -> Color {
        let luma = (self.red() as u32 * 77 + self.green() as u32 * 151 + self.blue() as u32 * 28) >> 8;
        let gray = luma as u8;
        self.blend(Color::new(gray, gray, gray), intensity)
    }

    /// Moves the color towards `target` by `intensity` (`[0, 1]`).
    pub fn blend(self, target: Color, intensity: Fixed) -> Color {
        Color::new(
            blend_channel(self.red(), target.red(), intensity),
            blend_channel(self.green(), target.green(), intensity),
            blend_channel(self.blue(), target.blue(), intensity),
        )
    }
}

fn blend_channel(from: u8, to: u8, intensity: Fixed) -> u8 {
    let delta = (to as i32 - from as i32) * intensity.raw();
    (from as i32 + (delta >> Fixed::FRACTION_BITS)).clamp(0, 31) as u8
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({}, {}, {})", self.red(), self.green(), self.blue())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_round_trip() {
        let color = Color::new(1, 2, 31);
        assert_eq!((color.red(), color.green(), color.blue()), (1, 2, 31));
        assert_eq!(color.raw(), 1 | 2 << 5 | 31 << 10);
    }

    #[test]
    fn inverted_white_is_black() {
        assert_eq!(Color::WHITE.inverted(), Color::BLACK);
    }

    #[test]
    fn blend_endpoints() {
        let red = Color::new(31, 0, 0);
        assert_eq!(red.blend(Color::WHITE, Fixed::ZERO), red);
        assert_eq!(red.blend(Color::WHITE, Fixed::ONE), Color::WHITE);
        assert_eq!(Color::WHITE.grayscale(Fixed::ONE), Color::new(31, 31, 31));
    }

    #[test]
    #[should_panic(expected = "Invalid green")]
    fn channel_out_of_range() {
        Color::new(0, 32, 0);
    }
}
