//! Palette banks.
//!
//! Each bank (BG, sprites) is 256 colors of palette RAM seen two ways: sixteen
//! 4 bits per pixel slots of 16 colors, or a single 8 bits per pixel palette of up to
//! 256 colors starting at color 0. Both views are separate pools and separate dedup
//! domains; while an 8 bits per pixel palette lives, the 4 bits per pixel slots it
//! covers are reserved.

use alloc::rc::Rc;
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use core::hash::{Hash, Hasher};

use heapless::Vec;
use log::debug;
use vbank_hw::memory::{PALETTE_COLORS, PALETTE_SLOTS, PALETTE_SLOT_COLORS};

use crate::color::Color;
use crate::config::MAX_PALETTE_ITEMS;
use crate::error::{Creation, Error, Result};
use crate::math::Fixed;
use crate::pool::{content_hash, ContentPool, PoolPayload};

/// Pixel bit depth of tiles and palettes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Bpp {
    Bpp4,
    Bpp8,
}

/// Which palette RAM bank a [`Palettes`] manager owns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PaletteLayer {
    Bg,
    Sprites,
}

impl PaletteLayer {
    fn log_target(self) -> &'static str {
        match self {
            PaletteLayer::Bg => "palettes::bg",
            PaletteLayer::Sprites => "palettes::sprites",
        }
    }
}

/// Colors to find or create a palette with.
#[derive(Copy, Clone, Debug)]
pub struct PaletteItem<'a> {
    colors: &'a [Color],
    bpp: Bpp,
}

impl<'a> PaletteItem<'a> {
    pub fn new(colors: &'a [Color], bpp: Bpp) -> Self {
        let count = colors.len();
        match bpp {
            Bpp::Bpp4 => assert!(
                count > 0 && count <= PALETTE_SLOT_COLORS,
                "Invalid colors count: {count}"
            ),
            Bpp::Bpp8 => assert!(
                count >= PALETTE_SLOT_COLORS && count <= PALETTE_COLORS && count % PALETTE_SLOT_COLORS == 0,
                "Invalid colors count: {count}"
            ),
        }

        Self { colors, bpp }
    }

    pub fn colors(&self) -> &'a [Color] {
        self.colors
    }

    pub fn bpp(&self) -> Bpp {
        self.bpp
    }

    fn hash(&self) -> u32 {
        content_hash(bytemuck::cast_slice(self.colors))
    }

    fn slots_count(&self) -> u16 {
        self.colors.len().div_ceil(PALETTE_SLOT_COLORS) as u16
    }
}

/// Color transformations applied when a palette is copied to palette RAM, in order:
/// inversion, grayscale, fade.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PaletteEffects {
    pub inverted: bool,
    pub grayscale_intensity: Fixed,
    pub fade_color: Color,
    pub fade_intensity: Fixed,
}

impl PaletteEffects {
    fn apply(&self, colors: &mut [Color]) {
        if self.inverted {
            colors.iter_mut().for_each(|color| *color = color.inverted());
        }
        if self.grayscale_intensity != Fixed::ZERO {
            colors.iter_mut().for_each(|color| *color = color.grayscale(self.grayscale_intensity));
        }
        if self.fade_intensity != Fixed::ZERO {
            colors.iter_mut().for_each(|color| *color = color.blend(self.fade_color, self.fade_intensity));
        }
    }
}

fn assert_intensity(intensity: Fixed) {
    assert!(intensity.is_unit(), "Invalid intensity: {intensity:?}");
}

struct PaletteEntry {
    colors: Vec<Color, PALETTE_COLORS>,
    effects: PaletteEffects,
    rotate_count: i16,
}

impl PaletteEntry {
    fn new(colors: &[Color]) -> Self {
        let colors = match Vec::from_slice(colors) {
            Ok(colors) => colors,
            Err(()) => panic!("Invalid colors count: {}", colors.len()),
        };
        Self { colors, effects: PaletteEffects::default(), rotate_count: 0 }
    }

    fn render(&self, global: &PaletteEffects, output: &mut [u16]) {
        let mut colors = self.colors.clone();
        if self.rotate_count != 0 && colors.len() > 2 {
            let rotation = (self.rotate_count as i32).rem_euclid(colors.len() as i32 - 1);
            colors[1..].rotate_left(rotation as usize);
        }

        self.effects.apply(&mut colors);
        global.apply(&mut colors);

        for (word, color) in output.iter_mut().zip(colors.iter()) {
            *word = color.raw();
        }
    }
}

impl PoolPayload for PaletteEntry {
    fn same_content(&self, other: &Self) -> bool {
        self.colors == other.colors
    }
}

pub struct PaletteBank {
    layer: PaletteLayer,
    bpp4: ContentPool<PaletteEntry, MAX_PALETTE_ITEMS>,
    bpp8: ContentPool<PaletteEntry, 1>,
    global: PaletteEffects,
}

impl PaletteBank {
    pub fn new(layer: PaletteLayer) -> Self {
        let name = match layer {
            PaletteLayer::Bg => "BG palettes",
            PaletteLayer::Sprites => "sprite palettes",
        };

        Self {
            layer,
            bpp4: ContentPool::new(name, PALETTE_SLOTS as u16),
            bpp8: ContentPool::new(name, 1),
            global: PaletteEffects::default(),
        }
    }

    pub fn layer(&self) -> PaletteLayer {
        self.layer
    }

    fn pool(&self, bpp: Bpp) -> &dyn PalettePool {
        match bpp {
            Bpp::Bpp4 => &self.bpp4,
            Bpp::Bpp8 => &self.bpp8,
        }
    }

    fn pool_mut(&mut self, bpp: Bpp) -> &mut dyn PalettePool {
        match bpp {
            Bpp::Bpp4 => &mut self.bpp4,
            Bpp::Bpp8 => &mut self.bpp8,
        }
    }

    pub fn find(&self, item: &PaletteItem) -> Option<u16> {
        let entry = PaletteEntry::new(item.colors);
        match item.bpp {
            Bpp::Bpp4 => self.bpp4.find(item.hash(), &entry),
            Bpp::Bpp8 => self.bpp8.find(item.hash(), &entry),
        }
    }

    pub fn create(&mut self, item: &PaletteItem, allow_dedup: bool) -> Result<u16> {
        let hash = item.hash();
        let entry = PaletteEntry::new(item.colors);

        let id = match item.bpp {
            Bpp::Bpp4 => self.bpp4.create(1, hash, entry, allow_dedup)?,
            Bpp::Bpp8 => {
                if allow_dedup {
                    if let Some(id) = self.bpp8.find(hash, &entry) {
                        self.bpp8.increase_usage(id);
                        return Ok(id);
                    }
                }

                let slots = item.slots_count();
                let exhausted = Error::PoolExhausted { pool: self.bpp8.name(), blocks: slots };
                if self.bpp8.available_blocks_count() == 0 || !self.bpp4.reserve_front(slots) {
                    return Err(exhausted);
                }

                match self.bpp8.create(1, hash, entry, false) {
                    Ok(id) => id,
                    Err(error) => {
                        self.bpp4.release_reserved();
                        return Err(error);
                    }
                }
            }
        };

        debug!(target: self.layer.log_target(), "{:?} palette {} ({} colors)", item.bpp, id, item.colors.len());
        Ok(id)
    }

    pub fn increase_usage(&mut self, bpp: Bpp, id: u16) {
        self.pool_mut(bpp).increase_usage(id);
    }

    pub fn decrease_usage(&mut self, bpp: Bpp, id: u16) {
        let released = self.pool_mut(bpp).decrease_usage(id);
        if released && bpp == Bpp::Bpp8 {
            self.bpp4.release_reserved();
        }
    }

    pub fn usages(&self, bpp: Bpp, id: u16) -> u16 {
        self.pool(bpp).usages(id)
    }

    /// Palette slot (the `palette` field of map cells and sprite attributes).
    /// Always 0 for 8 bits per pixel palettes.
    pub fn hw_bank(&self, bpp: Bpp, id: u16) -> u8 {
        match bpp {
            Bpp::Bpp4 => self.bpp4.start_block(id) as u8,
            Bpp::Bpp8 => 0,
        }
    }

    /// Index of `color_index` of the given palette inside palette RAM.
    pub fn color_address_index(&self, bpp: Bpp, id: u16, color_index: usize) -> usize {
        self.hw_bank(bpp, id) as usize * PALETTE_SLOT_COLORS + color_index
    }

    pub fn colors(&self, bpp: Bpp, id: u16) -> &[Color] {
        &self.pool(bpp).payload(id).colors
    }

    pub fn set_colors(&mut self, bpp: Bpp, id: u16, item: &PaletteItem) {
        assert!(item.bpp == bpp, "Invalid bpp: {:?}", item.bpp);
        assert!(
            item.colors.len() == self.colors(bpp, id).len(),
            "Invalid colors count: {} - {}", item.colors.len(), self.colors(bpp, id).len()
        );

        let hash = item.hash();
        self.pool_mut(bpp).update(id, &mut |entry| {
            entry.colors.clear();
            let extended = entry.colors.extend_from_slice(item.colors);
            debug_assert!(extended.is_ok());
        });
        self.pool_mut(bpp).rehash(id, hash);
    }

    pub fn effects(&self, bpp: Bpp, id: u16) -> PaletteEffects {
        self.pool(bpp).payload(id).effects
    }

    pub fn set_inverted(&mut self, bpp: Bpp, id: u16, inverted: bool) {
        self.pool_mut(bpp).update(id, &mut |entry| entry.effects.inverted = inverted);
    }

    pub fn set_grayscale_intensity(&mut self, bpp: Bpp, id: u16, intensity: Fixed) {
        assert_intensity(intensity);
        self.pool_mut(bpp).update(id, &mut |entry| entry.effects.grayscale_intensity = intensity);
    }

    pub fn set_fade(&mut self, bpp: Bpp, id: u16, color: Color, intensity: Fixed) {
        assert_intensity(intensity);
        self.pool_mut(bpp).update(id, &mut |entry| {
            entry.effects.fade_color = color;
            entry.effects.fade_intensity = intensity;
        });
    }

    pub fn set_fade_color(&mut self, bpp: Bpp, id: u16, color: Color) {
        self.pool_mut(bpp).update(id, &mut |entry| entry.effects.fade_color = color);
    }

    pub fn set_fade_intensity(&mut self, bpp: Bpp, id: u16, intensity: Fixed) {
        assert_intensity(intensity);
        self.pool_mut(bpp).update(id, &mut |entry| entry.effects.fade_intensity = intensity);
    }

    pub fn rotate_count(&self, bpp: Bpp, id: u16) -> i16 {
        self.pool(bpp).payload(id).rotate_count
    }

    /// Rotates colors `1..n` left by `count` (color 0 stays put).
    pub fn set_rotate_count(&mut self, bpp: Bpp, id: u16, count: i16) {
        let rotatable = self.colors(bpp, id).len() as i32 - 1;
        assert!(
            (count as i32).abs() < rotatable.max(1),
            "Invalid rotate count: {count} - {rotatable}"
        );
        self.pool_mut(bpp).update(id, &mut |entry| entry.rotate_count = count);
    }

    pub fn global_effects(&self) -> PaletteEffects {
        self.global
    }

    /// Effects applied to every palette of the bank, after their own.
    pub fn set_global_effects(&mut self, effects: PaletteEffects) {
        assert_intensity(effects.grayscale_intensity);
        assert_intensity(effects.fade_intensity);

        if effects != self.global {
            self.global = effects;
            self.bpp4.mark_all_dirty();
            self.bpp8.mark_all_dirty();
        }
    }

    /// 4 bits per pixel slots taken by palettes of either depth.
    pub fn used_slots_count(&self) -> u16 {
        self.bpp4.used_blocks_count()
    }

    pub fn available_slots_count(&self) -> u16 {
        self.bpp4.available_blocks_count()
    }

    pub fn used_palettes_count(&self) -> u16 {
        self.bpp4.used_items_count() + self.bpp8.used_items_count()
    }

    /// Copies dirty palettes to palette RAM. Returns the number of palettes written.
    pub fn commit(&mut self, ram: &mut [u16]) -> usize {
        let global = self.global;
        let mut written = self.bpp8.commit(|_, _, _, entry| entry.render(&global, ram));
        written += self.bpp4.commit(|_, start, _, entry| {
            let offset = start as usize * PALETTE_SLOT_COLORS;
            entry.render(&global, &mut ram[offset..offset + PALETTE_SLOT_COLORS]);
        });

        if written > 0 {
            debug!(target: self.layer.log_target(), "committed {} palettes", written);
        }
        written
    }
}

/// Object-safe view over both palette pools, so per-palette operations don't have
/// to match on the bit depth.
trait PalettePool {
    fn increase_usage(&mut self, id: u16);
    fn decrease_usage(&mut self, id: u16) -> bool;
    fn usages(&self, id: u16) -> u16;
    fn payload(&self, id: u16) -> &PaletteEntry;
    fn update(&mut self, id: u16, update: &mut dyn FnMut(&mut PaletteEntry));
    fn rehash(&mut self, id: u16, hash: u32);
}

impl<const ITEMS: usize> PalettePool for ContentPool<PaletteEntry, ITEMS> {
    fn increase_usage(&mut self, id: u16) {
        ContentPool::increase_usage(self, id)
    }

    fn decrease_usage(&mut self, id: u16) -> bool {
        ContentPool::decrease_usage(self, id)
    }

    fn usages(&self, id: u16) -> u16 {
        ContentPool::usages(self, id)
    }

    fn payload(&self, id: u16) -> &PaletteEntry {
        ContentPool::payload(self, id)
    }

    fn update(&mut self, id: u16, update: &mut dyn FnMut(&mut PaletteEntry)) {
        self.update_payload(id, update)
    }

    fn rehash(&mut self, id: u16, hash: u32) {
        self.set_hash(id, hash)
    }
}

/// Shared handle to a palette bank.
#[derive(Clone)]
pub struct Palettes(Rc<RefCell<PaletteBank>>);

impl Palettes {
    pub fn new(layer: PaletteLayer) -> Self {
        Self(Rc::new(RefCell::new(PaletteBank::new(layer))))
    }

    pub fn bank(&self) -> Ref<'_, PaletteBank> {
        self.0.borrow()
    }

    pub(crate) fn bank_mut(&self) -> RefMut<'_, PaletteBank> {
        self.0.borrow_mut()
    }

    pub fn layer(&self) -> PaletteLayer {
        self.bank().layer()
    }

    fn handle(&self, bpp: Bpp, id: u16) -> PaletteHandle {
        PaletteHandle { bpp, id, palettes: self.clone() }
    }

    /// Existing palette with the same colors and depth, if any.
    pub fn find(&self, item: &PaletteItem) -> Option<PaletteHandle> {
        let id = self.bank().find(item)?;
        self.bank_mut().increase_usage(item.bpp, id);
        Some(self.handle(item.bpp, id))
    }

    pub fn find_or_create(&self, item: &PaletteItem) -> PaletteHandle {
        self.try_create(item, true).or_panic()
    }

    pub fn optional_find_or_create(&self, item: &PaletteItem) -> Option<PaletteHandle> {
        self.try_create(item, true).optional(self.layer().log_target())
    }

    /// New palette even when an equal one already exists.
    pub fn create(&self, item: &PaletteItem) -> PaletteHandle {
        self.try_create(item, false).or_panic()
    }

    pub fn optional_create(&self, item: &PaletteItem) -> Option<PaletteHandle> {
        self.try_create(item, false).optional(self.layer().log_target())
    }

    fn try_create(&self, item: &PaletteItem, allow_dedup: bool) -> Result<PaletteHandle> {
        let id = self.bank_mut().create(item, allow_dedup)?;
        Ok(self.handle(item.bpp, id))
    }

    pub fn used_slots_count(&self) -> u16 {
        self.bank().used_slots_count()
    }

    pub fn available_slots_count(&self) -> u16 {
        self.bank().available_slots_count()
    }

    pub fn global_effects(&self) -> PaletteEffects {
        self.bank().global_effects()
    }

    pub fn set_global_effects(&self, effects: PaletteEffects) {
        self.bank_mut().set_global_effects(effects);
    }

    fn same_bank(&self, other: &Palettes) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Reference counted palette. Cloning shares the palette; the last drop frees it.
pub struct PaletteHandle {
    bpp: Bpp,
    id: u16,
    palettes: Palettes,
}

impl PaletteHandle {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn bpp(&self) -> Bpp {
        self.bpp
    }

    pub fn layer(&self) -> PaletteLayer {
        self.palettes.layer()
    }

    pub fn hw_bank(&self) -> u8 {
        self.palettes.bank().hw_bank(self.bpp, self.id)
    }

    pub fn usages(&self) -> u16 {
        self.palettes.bank().usages(self.bpp, self.id)
    }

    pub fn colors_count(&self) -> usize {
        self.palettes.bank().colors(self.bpp, self.id).len()
    }

    pub fn colors(&self) -> Vec<Color, PALETTE_COLORS> {
        let bank = self.palettes.bank();
        let mut colors = Vec::new();
        let extended = colors.extend_from_slice(bank.colors(self.bpp, self.id));
        debug_assert!(extended.is_ok());
        colors
    }

    /// Replaces the colors (same count, same depth).
    pub fn set_colors(&mut self, item: &PaletteItem) {
        self.palettes.bank_mut().set_colors(self.bpp, self.id, item);
    }

    pub fn inverted(&self) -> bool {
        self.palettes.bank().effects(self.bpp, self.id).inverted
    }

    pub fn set_inverted(&mut self, inverted: bool) {
        self.palettes.bank_mut().set_inverted(self.bpp, self.id, inverted);
    }

    pub fn grayscale_intensity(&self) -> Fixed {
        self.palettes.bank().effects(self.bpp, self.id).grayscale_intensity
    }

    pub fn set_grayscale_intensity(&mut self, intensity: Fixed) {
        self.palettes.bank_mut().set_grayscale_intensity(self.bpp, self.id, intensity);
    }

    pub fn fade_color(&self) -> Color {
        self.palettes.bank().effects(self.bpp, self.id).fade_color
    }

    pub fn fade_intensity(&self) -> Fixed {
        self.palettes.bank().effects(self.bpp, self.id).fade_intensity
    }

    pub fn set_fade(&mut self, color: Color, intensity: Fixed) {
        self.palettes.bank_mut().set_fade(self.bpp, self.id, color, intensity);
    }

    pub fn set_fade_color(&mut self, color: Color) {
        self.palettes.bank_mut().set_fade_color(self.bpp, self.id, color);
    }

    pub fn set_fade_intensity(&mut self, intensity: Fixed) {
        self.palettes.bank_mut().set_fade_intensity(self.bpp, self.id, intensity);
    }

    pub fn rotate_count(&self) -> i16 {
        self.palettes.bank().rotate_count(self.bpp, self.id)
    }

    pub fn set_rotate_count(&mut self, count: i16) {
        self.palettes.bank_mut().set_rotate_count(self.bpp, self.id, count);
    }
}

impl Clone for PaletteHandle {
    fn clone(&self) -> Self {
        self.palettes.bank_mut().increase_usage(self.bpp, self.id);
        Self { bpp: self.bpp, id: self.id, palettes: self.palettes.clone() }
    }
}

impl Drop for PaletteHandle {
    fn drop(&mut self) {
        self.palettes.bank_mut().decrease_usage(self.bpp, self.id);
    }
}

impl PartialEq for PaletteHandle {
    fn eq(&self, other: &Self) -> bool {
        self.bpp == other.bpp && self.id == other.id && self.palettes.same_bank(&other.palettes)
    }
}

impl Eq for PaletteHandle {}

impl Hash for PaletteHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bpp.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for PaletteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaletteHandle").field("bpp", &self.bpp).field("id", &self.id).finish()
    }
}
