//! Sprite manager.
//!
//! Sprites are records owning a tiles handle and a palette handle (plus optional
//! affine matrix and camera). Once per frame [`SpriteManager::update`] places them
//! on screen, culls the ones outside it and sorts the rest by BG priority, z-order
//! and creation order; [`SpriteManager::commit`] then writes the OAM entries whose
//! contents changed and hides the unused tail.

mod attributes;
mod builder;
mod shape;

pub use attributes::{SpriteFirstAttributes, SpriteRegularSecondAttributes, SpriteThirdAttributes};
pub use builder::{SpriteBuilder, SpriteItem};
pub use shape::{SpriteShape, SpriteShapeSize, SpriteSize};

use alloc::rc::Rc;
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use core::hash::{Hash, Hasher};

use heapless::Vec;
use log::{debug, warn};
use vbank_hw::memory::{OAM_ITEMS, OAM_ITEM_WORDS};
use vbank_hw::oam::{self, AffineMode, ObjMode};
use vbank_hw::{SCREEN_HEIGHT, SCREEN_WIDTH};

use crate::affine_mats::{AffineMatHandle, DoubleSizeMode};
use crate::camera::Camera;
use crate::config::MAX_SPRITES;
use crate::error::{Creation, Error, Result};
use crate::math::Point;
use crate::palettes::{Bpp, PaletteHandle};
use crate::tiles::TilesHandle;

struct SpriteRecord {
    usages: u16,
    creation_order: u32,
    shape_size: SpriteShapeSize,
    tiles: TilesHandle,
    palette: PaletteHandle,
    position: Point,
    camera: Option<Camera>,
    bg_priority: u8,
    z_order: i16,
    horizontal_flip: bool,
    vertical_flip: bool,
    mosaic_enabled: bool,
    blending_enabled: bool,
    window_enabled: bool,
    visible: bool,
    affine_mat: Option<AffineMatHandle>,
    double_size_mode: DoubleSizeMode,
    double_size: bool,
    hw_position: Point,
    hw_id: Option<u8>,
    attributes: [u16; 3],
    /// Attributes are stale.
    dirty: bool,
    /// Attributes were rebuilt since the last commit.
    pending: bool,
}

fn assert_tiles(shape_size: SpriteShapeSize, tiles: &TilesHandle, bpp: Bpp) {
    let required = shape_size.tiles_count(bpp);
    assert!(
        tiles.tiles_count() >= required,
        "Invalid tiles count: {} - {}", tiles.tiles_count(), required
    );
}

fn assert_bg_priority(bg_priority: u8) {
    assert!(bg_priority < 4, "Invalid BG priority: {bg_priority}");
}

impl SpriteRecord {
    fn new(builder: SpriteBuilder, creation_order: u32) -> Self {
        assert_tiles(builder.shape_size, &builder.tiles, builder.palette.bpp());
        assert_bg_priority(builder.bg_priority);

        let mut record = Self {
            usages: 1,
            creation_order,
            shape_size: builder.shape_size,
            tiles: builder.tiles,
            palette: builder.palette,
            position: builder.position,
            camera: builder.camera,
            bg_priority: builder.bg_priority,
            z_order: builder.z_order,
            horizontal_flip: builder.horizontal_flip,
            vertical_flip: builder.vertical_flip,
            mosaic_enabled: builder.mosaic_enabled,
            blending_enabled: builder.blending_enabled,
            window_enabled: builder.window_enabled,
            visible: builder.visible,
            affine_mat: builder.affine_mat,
            double_size_mode: builder.double_size_mode,
            double_size: false,
            hw_position: Point::default(),
            hw_id: None,
            attributes: [oam::HIDDEN_ATTR0, 0, 0],
            dirty: true,
            pending: false,
        };
        record.refresh();
        record.attributes = record.build_attributes();
        record
    }

    fn bpp(&self) -> Bpp {
        self.palette.bpp()
    }

    fn resolve_double_size(&self) -> bool {
        match (&self.affine_mat, self.double_size_mode) {
            (None, _) | (Some(_), DoubleSizeMode::Disabled) => false,
            (Some(_), DoubleSizeMode::Enabled) => true,
            (Some(affine_mat), DoubleSizeMode::Auto) => {
                affine_mat.double_size(self.shape_size.width(), self.shape_size.height())
            }
        }
    }

    /// Recomputes double size and the top-left corner; marks the record dirty when
    /// either changed.
    fn refresh(&mut self) {
        let double_size = self.resolve_double_size();

        let camera = self.camera.as_ref().map_or(Point::default(), Camera::position);
        let half = Point::new(self.shape_size.width() / 2, self.shape_size.height() / 2);
        let mut hw_position = self.position - camera - half;
        if double_size {
            hw_position = hw_position - half;
        }

        if double_size != self.double_size || hw_position != self.hw_position {
            self.double_size = double_size;
            self.hw_position = hw_position;
            self.dirty = true;
        }
    }

    fn box_size(&self) -> (i32, i32) {
        let scale = if self.double_size { 2 } else { 1 };
        (self.shape_size.width() * scale, self.shape_size.height() * scale)
    }

    fn on_screen(&self) -> bool {
        let (width, height) = self.box_size();
        let Point { x, y } = self.hw_position;
        x < SCREEN_WIDTH && x + width > 0 && y < SCREEN_HEIGHT && y + height > 0
    }

    fn affine_mode(&self) -> AffineMode {
        match (&self.affine_mat, self.double_size) {
            (None, _) => AffineMode::Regular,
            (Some(_), false) => AffineMode::Affine,
            (Some(_), true) => AffineMode::AffineDoubleSize,
        }
    }

    fn obj_mode(&self) -> ObjMode {
        if self.window_enabled {
            ObjMode::Window
        } else if self.blending_enabled {
            ObjMode::Blending
        } else {
            ObjMode::Normal
        }
    }

    fn build_attributes(&self) -> [u16; 3] {
        let shape = self.shape_size.shape() as u8;
        let size = self.shape_size.size() as u8;
        let Point { x, y } = self.hw_position;

        let attr0 = oam::first_attributes(y, self.affine_mode(), self.obj_mode(), self.mosaic_enabled, self.bpp() == Bpp::Bpp8, shape);
        let attr1 = match &self.affine_mat {
            Some(affine_mat) => oam::affine_second_attributes(x, affine_mat.id(), size),
            None => oam::regular_second_attributes(x, self.horizontal_flip, self.vertical_flip, size),
        };
        let attr2 = oam::third_attributes(self.tiles.start_block(), self.bg_priority, self.palette.hw_bank());
        [attr0, attr1, attr2]
    }

    fn sort_key(&self) -> (u8, i16, u32) {
        (self.bg_priority, self.z_order, self.creation_order)
    }
}

/// Read-only view of an on-screen sprite, for H-Blank effects targeting it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpriteHblankTarget {
    pub hw_id: u8,
    pub hw_position: Point,
    pub shape_size: SpriteShapeSize,
    pub bpp: Bpp,
    pub affine_mode: AffineMode,
    pub attributes: [u16; 3],
}

pub struct SpriteManager {
    records: Vec<Option<SpriteRecord>, MAX_SPRITES>,
    vacant: Vec<u16, MAX_SPRITES>,
    creation_counter: u32,
    /// Record ids in OAM order, as of the last update.
    render_order: Vec<u16, MAX_SPRITES>,
    oam_owners: [Option<u16>; OAM_ITEMS],
    last_visible_count: usize,
}

impl SpriteManager {
    pub fn new() -> Self {
        Self {
            records: (0..MAX_SPRITES).map(|_| None).collect(),
            vacant: (0..MAX_SPRITES as u16).rev().collect(),
            creation_counter: 0,
            render_order: Vec::new(),
            oam_owners: [None; OAM_ITEMS],
            // hide every entry on the first commit
            last_visible_count: OAM_ITEMS,
        }
    }

    fn record(&self, id: u16) -> &SpriteRecord {
        match self.records.get(id as usize) {
            Some(Some(record)) => record,
            _ => panic!("Invalid sprite id: {id}"),
        }
    }

    fn record_mut(&mut self, id: u16) -> &mut SpriteRecord {
        match self.records.get_mut(id as usize) {
            Some(Some(record)) => record,
            _ => panic!("Invalid sprite id: {id}"),
        }
    }

    pub(crate) fn create(&mut self, builder: SpriteBuilder) -> Result<u16> {
        let id = self.vacant.pop().ok_or(Error::SpritesExhausted)?;
        let record = SpriteRecord::new(builder, self.creation_counter);
        self.creation_counter = self.creation_counter.wrapping_add(1);
        self.records[id as usize] = Some(record);
        debug!(target: "sprites", "sprite {} created", id);
        Ok(id)
    }

    fn increase_usage(&mut self, id: u16) {
        self.record_mut(id).usages += 1;
    }

    /// Returns the record once its last usage is gone, so the caller can drop the
    /// handles it holds outside of this manager's borrow.
    fn decrease_usage(&mut self, id: u16) -> Option<SpriteRecord> {
        let record = self.record_mut(id);
        record.usages -= 1;
        if record.usages > 0 {
            return None;
        }

        let pushed = self.vacant.push(id);
        debug_assert!(pushed.is_ok());
        debug!(target: "sprites", "sprite {} destroyed", id);
        self.records[id as usize].take()
    }

    fn modify<R>(&mut self, id: u16, update: impl FnOnce(&mut SpriteRecord) -> R) -> R {
        let record = self.record_mut(id);
        record.dirty = true;
        update(record)
    }

    pub fn used_count(&self) -> usize {
        MAX_SPRITES - self.vacant.len()
    }

    pub fn available_count(&self) -> usize {
        self.vacant.len()
    }

    /// Places, culls and sorts every sprite. Doesn't touch OAM.
    pub fn update(&mut self) {
        let mut render_order: Vec<u16, MAX_SPRITES> = Vec::new();

        for (id, slot) in self.records.iter_mut().enumerate() {
            let Some(record) = slot else {
                continue;
            };

            record.refresh();
            record.hw_id = None;
            if record.dirty {
                record.attributes = record.build_attributes();
                record.dirty = false;
                record.pending = true;
            }
            if record.visible && record.on_screen() {
                let pushed = render_order.push(id as u16);
                debug_assert!(pushed.is_ok());
            }
        }

        render_order.sort_unstable_by_key(|&id| self.records[id as usize].as_ref().map(SpriteRecord::sort_key));

        if render_order.len() > OAM_ITEMS {
            warn!(target: "sprites", "{} sprites on screen, {} dropped", render_order.len(), render_order.len() - OAM_ITEMS);
            render_order.truncate(OAM_ITEMS);
        }

        for (hw_id, &id) in render_order.iter().enumerate() {
            if let Some(record) = self.records[id as usize].as_mut() {
                record.hw_id = Some(hw_id as u8);
            }
        }
        self.render_order = render_order;
    }

    /// Writes OAM entries whose owner changed or whose attributes were rebuilt by the
    /// last update, and hides the entries no longer used. Changes made after that
    /// update wait for the next one. Returns the number of entries written.
    pub fn commit(&mut self, oam_words: &mut [u16]) -> usize {
        let mut written = 0;

        for (hw_id, &id) in self.render_order.iter().enumerate() {
            let Some(record) = self.records[id as usize].as_ref() else {
                continue;
            };

            if self.oam_owners[hw_id] != Some(id) || record.pending {
                let offset = hw_id * OAM_ITEM_WORDS;
                oam_words[offset..offset + 3].copy_from_slice(&record.attributes);
                self.oam_owners[hw_id] = Some(id);
                written += 1;
            }
        }

        let visible_count = self.render_order.len();
        for hw_id in visible_count..self.last_visible_count {
            oam_words[hw_id * OAM_ITEM_WORDS] = oam::HIDDEN_ATTR0;
            self.oam_owners[hw_id] = None;
            written += 1;
        }
        self.last_visible_count = visible_count;

        for record in self.records.iter_mut().flatten() {
            record.pending = false;
        }

        if written > 0 {
            debug!(target: "sprites", "committed {} OAM entries ({} visible)", written, visible_count);
        }
        written
    }

    /// Record ids in the order they occupy OAM.
    pub fn render_order(&self) -> &[u16] {
        &self.render_order
    }

    pub fn hblank_target(&self, id: u16) -> Option<SpriteHblankTarget> {
        let record = self.records.get(id as usize)?.as_ref()?;
        Some(SpriteHblankTarget {
            hw_id: record.hw_id?,
            hw_position: record.hw_position,
            shape_size: record.shape_size,
            bpp: record.bpp(),
            affine_mode: record.affine_mode(),
            attributes: record.attributes,
        })
    }

    /// Second attribute words moving sprite `id` to `hw_x + offset` on each line.
    pub fn fill_hblank_effect_horizontal_positions(&self, id: u16, hw_x: i32, offsets: &[i16], output: &mut [u16]) {
        let attr1 = self.record(id).attributes[1];
        for (word, &offset) in output.iter_mut().zip(offsets) {
            *word = oam::with_x(attr1, hw_x + offset as i32);
        }
    }

    /// First attribute words moving sprite `id` to `hw_y + offset` on each line.
    pub fn fill_hblank_effect_vertical_positions(&self, id: u16, hw_y: i32, offsets: &[i16], output: &mut [u16]) {
        let attr0 = self.record(id).attributes[0];
        for (word, &offset) in output.iter_mut().zip(offsets) {
            *word = oam::with_y(attr0, hw_y + offset as i32);
        }
    }

    pub fn fill_hblank_effect_first_attributes(
        hw_y: i32,
        shape: SpriteShape,
        bpp: Bpp,
        affine_mode: AffineMode,
        attributes: &[SpriteFirstAttributes],
        output: &mut [u16],
    ) {
        for (word, value) in output.iter_mut().zip(attributes) {
            *word = if value.visible() {
                let mode = if value.window_enabled() {
                    ObjMode::Window
                } else if value.blending_enabled() {
                    ObjMode::Blending
                } else {
                    ObjMode::Normal
                };
                oam::first_attributes(hw_y, affine_mode, mode, value.mosaic_enabled(), bpp == Bpp::Bpp8, shape as u8)
            } else {
                oam::HIDDEN_ATTR0
            };
        }
    }

    pub fn fill_hblank_effect_regular_second_attributes(
        hw_x: i32,
        size: SpriteSize,
        attributes: &[SpriteRegularSecondAttributes],
        output: &mut [u16],
    ) {
        for (word, value) in output.iter_mut().zip(attributes) {
            *word = oam::regular_second_attributes(hw_x, value.horizontal_flip(), value.vertical_flip(), size as u8);
        }
    }

    pub fn fill_hblank_effect_third_attributes(attributes: &[SpriteThirdAttributes], output: &mut [u16]) {
        for (word, value) in output.iter_mut().zip(attributes) {
            *word = value.raw();
        }
    }
}

impl Default for SpriteManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the sprite manager.
#[derive(Clone, Default)]
pub struct Sprites(Rc<RefCell<SpriteManager>>);

impl Sprites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager(&self) -> Ref<'_, SpriteManager> {
        self.0.borrow()
    }

    pub(crate) fn manager_mut(&self) -> RefMut<'_, SpriteManager> {
        self.0.borrow_mut()
    }

    pub fn create(&self, builder: SpriteBuilder) -> SpriteHandle {
        self.try_create(builder).or_panic()
    }

    pub fn optional_create(&self, builder: SpriteBuilder) -> Option<SpriteHandle> {
        self.try_create(builder).optional("sprites")
    }

    fn try_create(&self, builder: SpriteBuilder) -> Result<SpriteHandle> {
        // checked up front so a rejected builder drops its handles outside the borrow
        if self.manager().available_count() == 0 {
            return Err(Error::SpritesExhausted);
        }

        let id = self.manager_mut().create(builder)?;
        Ok(SpriteHandle { id, sprites: self.clone() })
    }

    pub fn used_count(&self) -> usize {
        self.manager().used_count()
    }

    pub fn available_count(&self) -> usize {
        self.manager().available_count()
    }
}

/// Reference counted sprite. The sprite disappears when the last handle is dropped,
/// releasing its tiles, palette and affine matrix.
pub struct SpriteHandle {
    id: u16,
    sprites: Sprites,
}

impl SpriteHandle {
    pub fn id(&self) -> u16 {
        self.id
    }

    fn read<R>(&self, read: impl FnOnce(&SpriteRecord) -> R) -> R {
        read(self.sprites.manager().record(self.id))
    }

    fn modify<R>(&mut self, update: impl FnOnce(&mut SpriteRecord) -> R) -> R {
        self.sprites.manager_mut().modify(self.id, update)
    }

    pub fn usages(&self) -> u16 {
        self.read(|record| record.usages)
    }

    pub fn shape_size(&self) -> SpriteShapeSize {
        self.read(|record| record.shape_size)
    }

    pub fn set_shape_size(&mut self, shape_size: SpriteShapeSize) {
        self.modify(|record| {
            assert_tiles(shape_size, &record.tiles, record.bpp());
            record.shape_size = shape_size;
        });
    }

    pub fn position(&self) -> Point {
        self.read(|record| record.position)
    }

    /// Center of the sprite, relative to its camera if it has one.
    pub fn set_position(&mut self, position: Point) {
        self.modify(|record| record.position = position);
    }

    pub fn set_x(&mut self, x: i32) {
        self.modify(|record| record.position.x = x);
    }

    pub fn set_y(&mut self, y: i32) {
        self.modify(|record| record.position.y = y);
    }

    pub fn tiles(&self) -> TilesHandle {
        self.read(|record| record.tiles.clone())
    }

    pub fn set_tiles(&mut self, tiles: TilesHandle) {
        let previous = self.modify(|record| {
            assert_tiles(record.shape_size, &tiles, record.bpp());
            core::mem::replace(&mut record.tiles, tiles)
        });
        drop(previous);
    }

    pub fn palette(&self) -> PaletteHandle {
        self.read(|record| record.palette.clone())
    }

    pub fn set_palette(&mut self, palette: PaletteHandle) {
        let previous = self.modify(|record| {
            assert_tiles(record.shape_size, &record.tiles, palette.bpp());
            core::mem::replace(&mut record.palette, palette)
        });
        drop(previous);
    }

    pub fn bg_priority(&self) -> u8 {
        self.read(|record| record.bg_priority)
    }

    pub fn set_bg_priority(&mut self, bg_priority: u8) {
        assert_bg_priority(bg_priority);
        self.modify(|record| record.bg_priority = bg_priority);
    }

    pub fn z_order(&self) -> i16 {
        self.read(|record| record.z_order)
    }

    pub fn set_z_order(&mut self, z_order: i16) {
        self.modify(|record| record.z_order = z_order);
    }

    pub fn horizontal_flip(&self) -> bool {
        self.read(|record| record.horizontal_flip)
    }

    pub fn set_horizontal_flip(&mut self, flip: bool) {
        self.modify(|record| record.horizontal_flip = flip);
    }

    pub fn vertical_flip(&self) -> bool {
        self.read(|record| record.vertical_flip)
    }

    pub fn set_vertical_flip(&mut self, flip: bool) {
        self.modify(|record| record.vertical_flip = flip);
    }

    pub fn mosaic_enabled(&self) -> bool {
        self.read(|record| record.mosaic_enabled)
    }

    pub fn set_mosaic_enabled(&mut self, enabled: bool) {
        self.modify(|record| record.mosaic_enabled = enabled);
    }

    pub fn blending_enabled(&self) -> bool {
        self.read(|record| record.blending_enabled)
    }

    pub fn set_blending_enabled(&mut self, enabled: bool) {
        self.modify(|record| record.blending_enabled = enabled);
    }

    pub fn window_enabled(&self) -> bool {
        self.read(|record| record.window_enabled)
    }

    pub fn set_window_enabled(&mut self, enabled: bool) {
        self.modify(|record| record.window_enabled = enabled);
    }

    pub fn visible(&self) -> bool {
        self.read(|record| record.visible)
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.modify(|record| record.visible = visible);
    }

    pub fn affine_mat(&self) -> Option<AffineMatHandle> {
        self.read(|record| record.affine_mat.clone())
    }

    pub fn set_affine_mat(&mut self, affine_mat: Option<AffineMatHandle>) {
        let previous = self.modify(|record| core::mem::replace(&mut record.affine_mat, affine_mat));
        drop(previous);
    }

    pub fn double_size_mode(&self) -> DoubleSizeMode {
        self.read(|record| record.double_size_mode)
    }

    pub fn set_double_size_mode(&mut self, mode: DoubleSizeMode) {
        self.modify(|record| record.double_size_mode = mode);
    }

    /// As of the last update.
    pub fn double_size(&self) -> bool {
        self.read(|record| record.double_size)
    }

    pub fn camera(&self) -> Option<Camera> {
        self.read(|record| record.camera.clone())
    }

    pub fn set_camera(&mut self, camera: Option<Camera>) {
        self.modify(|record| record.camera = camera);
    }

    /// OAM entry of the sprite as of the last update; `None` when hidden or culled.
    pub fn hw_id(&self) -> Option<u8> {
        self.read(|record| record.hw_id)
    }

    pub fn on_screen(&self) -> bool {
        self.hw_id().is_some()
    }

    pub fn first_attributes(&self) -> SpriteFirstAttributes {
        self.read(|record| {
            SpriteFirstAttributes::new(record.visible, record.mosaic_enabled, record.blending_enabled, record.window_enabled)
        })
    }

    pub fn regular_second_attributes(&self) -> SpriteRegularSecondAttributes {
        self.read(|record| SpriteRegularSecondAttributes::new(record.horizontal_flip, record.vertical_flip))
    }

    pub fn third_attributes(&self) -> SpriteThirdAttributes {
        self.read(|record| {
            SpriteThirdAttributes::new(record.tiles.start_block(), record.bg_priority, record.palette.hw_bank())
        })
    }
}

impl Clone for SpriteHandle {
    fn clone(&self) -> Self {
        self.sprites.manager_mut().increase_usage(self.id);
        Self { id: self.id, sprites: self.sprites.clone() }
    }
}

impl Drop for SpriteHandle {
    fn drop(&mut self) {
        let record = self.sprites.manager_mut().decrease_usage(self.id);
        drop(record);
    }
}

impl PartialEq for SpriteHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.sprites.0, &other.sprites.0)
    }
}

impl Eq for SpriteHandle {}

impl Hash for SpriteHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SpriteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpriteHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine_mats::{AffineMatAttributes, AffineMats};
    use crate::color::Color;
    use crate::palettes::{PaletteItem, PaletteLayer, Palettes};
    use crate::tiles::{Tile, Tiles, TilesItem};

    static TILES: [Tile; 4] = [Tile([0x1111; 16]); 4];
    static COLORS: [Color; 16] = [Color::WHITE; 16];

    struct Fixture {
        tiles: Tiles,
        palettes: Palettes,
        sprites: Sprites,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tiles: Tiles::new("sprite tiles", 64),
                palettes: Palettes::new(PaletteLayer::Sprites),
                sprites: Sprites::new(),
            }
        }

        fn builder(&self) -> SpriteBuilder {
            let shape_size = SpriteShapeSize::new(SpriteShape::Square, SpriteSize::Normal);
            let item = SpriteItem::new(shape_size, TilesItem::from_static(&TILES), PaletteItem::new(&COLORS, Bpp::Bpp4));
            item.builder(&self.tiles, &self.palettes)
        }

        fn commit(&self) -> (usize, alloc::boxed::Box<[u16; vbank_hw::memory::OAM_WORDS]>) {
            let mut oam_words = alloc::boxed::Box::new([0u16; vbank_hw::memory::OAM_WORDS]);
            self.sprites.manager_mut().update();
            let written = self.sprites.manager_mut().commit(&mut oam_words[..]);
            (written, oam_words)
        }
    }

    #[test]
    fn sprites_share_tiles_and_palette() {
        let fixture = Fixture::new();
        let a = fixture.sprites.create(fixture.builder());
        let b = fixture.sprites.create(fixture.builder());
        assert_ne!(a, b);
        assert_eq!(a.tiles(), b.tiles());
        assert_eq!(a.palette().usages(), 3);

        drop(a);
        drop(b);
        assert_eq!(fixture.tiles.used_tiles_count(), 0);
        assert_eq!(fixture.palettes.used_slots_count(), 0);
        assert_eq!(fixture.sprites.used_count(), 0);
    }

    #[test]
    fn position_is_the_center() {
        let fixture = Fixture::new();
        let sprite = fixture.sprites.create(fixture.builder().position(Point::new(100, 50)));
        let (_, oam_words) = fixture.commit();

        assert_eq!(sprite.hw_id(), Some(0));
        assert_eq!(oam_words[0] & 0xFF, 42);
        assert_eq!(oam_words[1] & 0x1FF, 92);
    }

    #[test]
    fn camera_moves_attached_sprites() {
        let fixture = Fixture::new();
        let camera = Camera::new(Point::new(0, 0));
        let sprite = fixture.sprites.create(fixture.builder().position(Point::new(20, 20)).camera(camera.clone()));
        fixture.commit();
        assert!(sprite.on_screen());

        camera.set_x(200);
        fixture.commit();
        assert!(!sprite.on_screen());
    }

    #[test]
    fn culled_and_hidden_sprites_leave_oam() {
        let fixture = Fixture::new();
        let mut sprite = fixture.sprites.create(fixture.builder().position(Point::new(20, 20)));
        let (written, _) = fixture.commit();
        assert_eq!(written, OAM_ITEMS);

        sprite.set_visible(false);
        let (written, oam_words) = fixture.commit();
        assert_eq!(written, 1);
        assert_eq!(oam_words[0], oam::HIDDEN_ATTR0);
        assert_eq!(sprite.hw_id(), None);
    }

    #[test]
    fn unchanged_sprites_are_not_rewritten() {
        let fixture = Fixture::new();
        let mut sprite = fixture.sprites.create(fixture.builder().position(Point::new(20, 20)));
        fixture.commit();

        let (written, _) = fixture.commit();
        assert_eq!(written, 0);

        sprite.set_horizontal_flip(true);
        let (written, oam_words) = fixture.commit();
        assert_eq!(written, 1);
        assert_ne!(oam_words[1] & 1 << 12, 0);
    }

    #[test]
    fn changes_between_update_and_commit_reach_the_next_frame() {
        let fixture = Fixture::new();
        let mut sprite = fixture.sprites.create(fixture.builder().position(Point::new(20, 20)));
        let mut oam_words = alloc::boxed::Box::new([0u16; vbank_hw::memory::OAM_WORDS]);

        fixture.sprites.manager_mut().update();
        sprite.set_horizontal_flip(true);
        fixture.sprites.manager_mut().commit(&mut oam_words[..]);
        assert_eq!(oam_words[1] & 1 << 12, 0);

        fixture.sprites.manager_mut().update();
        assert_eq!(fixture.sprites.manager_mut().commit(&mut oam_words[..]), 1);
        assert_ne!(oam_words[1] & 1 << 12, 0);
    }

    #[test]
    fn auto_double_size_follows_the_matrix() {
        let fixture = Fixture::new();
        let mats = AffineMats::new();
        let mut mat = mats.create(AffineMatAttributes::default());
        let sprite = fixture.sprites.create(fixture.builder().position(Point::new(50, 50)).affine_mat(mat.clone()));

        let (_, oam_words) = fixture.commit();
        assert!(!sprite.double_size());
        assert_eq!(oam::affine_mode(oam_words[0]), AffineMode::Affine);

        mat.set_rotation_angle(45);
        let (_, oam_words) = fixture.commit();
        assert!(sprite.double_size());
        assert_eq!(oam::affine_mode(oam_words[0]), AffineMode::AffineDoubleSize);
        assert_eq!(oam_words[0] & 0xFF, 50 - 16);
    }

    #[test]
    fn hblank_fills_are_pure() {
        let fixture = Fixture::new();
        let sprite = fixture.sprites.create(fixture.builder().position(Point::new(100, 50)));
        fixture.commit();

        let manager = fixture.sprites.manager();
        let target = manager.hblank_target(sprite.id()).unwrap();
        let mut output = [0u16; 3];
        manager.fill_hblank_effect_horizontal_positions(sprite.id(), target.hw_position.x, &[0, 1, -1], &mut output);
        assert_eq!(output.map(|word| word & 0x1FF), [92, 93, 91]);
        assert_eq!(output[0], target.attributes[1]);
        assert_eq!(manager.hblank_target(sprite.id()), Some(target));
    }

    #[test]
    fn exhaustion() {
        let fixture = Fixture::new();
        let all: alloc::vec::Vec<_> = (0..MAX_SPRITES).map(|_| fixture.sprites.create(fixture.builder())).collect();
        assert!(fixture.sprites.optional_create(fixture.builder()).is_none());
        assert_eq!(fixture.sprites.used_count(), MAX_SPRITES);
        assert_eq!(all[0].palette().usages(), MAX_SPRITES as u16 + 1);
    }
}
