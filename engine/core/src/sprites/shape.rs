use crate::palettes::Bpp;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpriteShape {
    Square = 0,
    Wide = 1,
    Tall = 2,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpriteSize {
    Small = 0,
    Normal = 1,
    Big = 2,
    Huge = 3,
}

/// One of the twelve sprite dimensions the hardware supports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpriteShapeSize {
    shape: SpriteShape,
    size: SpriteSize,
}

const SIZES: [SpriteSize; 4] = [SpriteSize::Small, SpriteSize::Normal, SpriteSize::Big, SpriteSize::Huge];

impl SpriteShapeSize {
    pub const fn new(shape: SpriteShape, size: SpriteSize) -> Self {
        Self { shape, size }
    }

    pub fn from_dimensions(width: i32, height: i32) -> Option<Self> {
        [SpriteShape::Square, SpriteShape::Wide, SpriteShape::Tall]
            .into_iter()
            .flat_map(|shape| SIZES.into_iter().map(move |size| Self::new(shape, size)))
            .find(|shape_size| shape_size.width() == width && shape_size.height() == height)
    }

    pub const fn shape(&self) -> SpriteShape {
        self.shape
    }

    pub const fn size(&self) -> SpriteSize {
        self.size
    }

    pub const fn width(&self) -> i32 {
        match (self.shape, self.size) {
            (SpriteShape::Square, SpriteSize::Small) => 8,
            (SpriteShape::Square, SpriteSize::Normal) => 16,
            (SpriteShape::Square, SpriteSize::Big) => 32,
            (SpriteShape::Square, SpriteSize::Huge) => 64,
            (SpriteShape::Wide, SpriteSize::Small) => 16,
            (SpriteShape::Wide, SpriteSize::Normal) => 32,
            (SpriteShape::Wide, SpriteSize::Big) => 32,
            (SpriteShape::Wide, SpriteSize::Huge) => 64,
            (SpriteShape::Tall, SpriteSize::Small) => 8,
            (SpriteShape::Tall, SpriteSize::Normal) => 8,
            (SpriteShape::Tall, SpriteSize::Big) => 16,
            (SpriteShape::Tall, SpriteSize::Huge) => 32,
        }
    }

    pub const fn height(&self) -> i32 {
        match self.shape {
            SpriteShape::Square => self.width(),
            SpriteShape::Wide => Self::new(SpriteShape::Tall, self.size).width(),
            SpriteShape::Tall => Self::new(SpriteShape::Wide, self.size).width(),
        }
    }

    /// Tiles (4 bits per pixel blocks) one frame of the sprite takes.
    pub const fn tiles_count(&self, bpp: Bpp) -> u16 {
        let tiles = (self.width() / 8) * (self.height() / 8);
        match bpp {
            Bpp::Bpp4 => tiles as u16,
            Bpp::Bpp8 => tiles as u16 * 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_table() {
        let wide = SpriteShapeSize::new(SpriteShape::Wide, SpriteSize::Big);
        assert_eq!((wide.width(), wide.height()), (32, 16));

        let tall = SpriteShapeSize::new(SpriteShape::Tall, SpriteSize::Huge);
        assert_eq!((tall.width(), tall.height()), (32, 64));

        assert_eq!(SpriteShapeSize::from_dimensions(8, 32), Some(SpriteShapeSize::new(SpriteShape::Tall, SpriteSize::Normal)));
        assert_eq!(SpriteShapeSize::from_dimensions(24, 24), None);
    }

    #[test]
    fn tiles_per_frame() {
        let square = SpriteShapeSize::new(SpriteShape::Square, SpriteSize::Big);
        assert_eq!(square.tiles_count(Bpp::Bpp4), 16);
        assert_eq!(square.tiles_count(Bpp::Bpp8), 32);
    }
}
