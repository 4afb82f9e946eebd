use crate::affine_mats::{AffineMatHandle, DoubleSizeMode};
use crate::camera::Camera;
use crate::math::Point;
use crate::palettes::{PaletteItem, Palettes, PaletteHandle};
use crate::sprites::shape::SpriteShapeSize;
use crate::tiles::{Tiles, TilesHandle, TilesItem};

/// Everything a sprite is created with. Defaults: centered at the origin, lowest
/// BG priority (3), z-order 0, visible, no affine matrix.
pub struct SpriteBuilder {
    pub(super) shape_size: SpriteShapeSize,
    pub(super) tiles: TilesHandle,
    pub(super) palette: PaletteHandle,
    pub(super) position: Point,
    pub(super) camera: Option<Camera>,
    pub(super) bg_priority: u8,
    pub(super) z_order: i16,
    pub(super) horizontal_flip: bool,
    pub(super) vertical_flip: bool,
    pub(super) mosaic_enabled: bool,
    pub(super) blending_enabled: bool,
    pub(super) window_enabled: bool,
    pub(super) visible: bool,
    pub(super) affine_mat: Option<AffineMatHandle>,
    pub(super) double_size_mode: DoubleSizeMode,
}

impl SpriteBuilder {
    pub fn new(shape_size: SpriteShapeSize, tiles: TilesHandle, palette: PaletteHandle) -> Self {
        Self {
            shape_size,
            tiles,
            palette,
            position: Point::default(),
            camera: None,
            bg_priority: 3,
            z_order: 0,
            horizontal_flip: false,
            vertical_flip: false,
            mosaic_enabled: false,
            blending_enabled: false,
            window_enabled: false,
            visible: true,
            affine_mat: None,
            double_size_mode: DoubleSizeMode::Auto,
        }
    }

    pub fn position(mut self, position: Point) -> Self {
        self.position = position;
        self
    }

    pub fn camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn bg_priority(mut self, bg_priority: u8) -> Self {
        self.bg_priority = bg_priority;
        self
    }

    pub fn z_order(mut self, z_order: i16) -> Self {
        self.z_order = z_order;
        self
    }

    pub fn horizontal_flip(mut self, flip: bool) -> Self {
        self.horizontal_flip = flip;
        self
    }

    pub fn vertical_flip(mut self, flip: bool) -> Self {
        self.vertical_flip = flip;
        self
    }

    pub fn mosaic_enabled(mut self, enabled: bool) -> Self {
        self.mosaic_enabled = enabled;
        self
    }

    pub fn blending_enabled(mut self, enabled: bool) -> Self {
        self.blending_enabled = enabled;
        self
    }

    pub fn window_enabled(mut self, enabled: bool) -> Self {
        self.window_enabled = enabled;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn affine_mat(mut self, affine_mat: AffineMatHandle) -> Self {
        self.affine_mat = Some(affine_mat);
        self
    }

    pub fn double_size_mode(mut self, mode: DoubleSizeMode) -> Self {
        self.double_size_mode = mode;
        self
    }
}

/// Raw tiles and colors of a sprite, turned into shared tiles and palette entries
/// on demand.
#[derive(Copy, Clone, Debug)]
pub struct SpriteItem<'a> {
    shape_size: SpriteShapeSize,
    tiles: TilesItem,
    palette: PaletteItem<'a>,
}

impl<'a> SpriteItem<'a> {
    pub fn new(shape_size: SpriteShapeSize, tiles: TilesItem, palette: PaletteItem<'a>) -> Self {
        let frame_tiles = shape_size.tiles_count(palette.bpp());
        assert!(
            tiles.tiles_count() % frame_tiles == 0,
            "Invalid tiles count: {} - {}", tiles.tiles_count(), frame_tiles
        );
        Self { shape_size, tiles, palette }
    }

    pub fn shape_size(&self) -> SpriteShapeSize {
        self.shape_size
    }

    pub fn graphics_count(&self) -> u16 {
        self.tiles.tiles_count() / self.shape_size.tiles_count(self.palette.bpp())
    }

    /// Builder sharing already loaded tiles and palette when their content matches.
    pub fn builder(&self, tiles: &Tiles, palettes: &Palettes) -> SpriteBuilder {
        SpriteBuilder::new(self.shape_size, tiles.find_or_create(&self.tiles), palettes.find_or_create(&self.palette))
    }

    pub fn optional_builder(&self, tiles: &Tiles, palettes: &Palettes) -> Option<SpriteBuilder> {
        let tiles = tiles.optional_find_or_create(&self.tiles)?;
        let palette = palettes.optional_find_or_create(&self.palette)?;
        Some(SpriteBuilder::new(self.shape_size, tiles, palette))
    }
}
