use core::marker::PhantomData;

use bytemuck::Pod;
use vbank_hw::memory::{BG_PALETTE_ADDRESS, SPRITE_PALETTE_ADDRESS};
use vbank_hw::oam::{self, AffineMode};

use super::{EffectTarget, HblankContext, HblankEffectHandler, HblankEffectId, HblankEffects};
use crate::color::Color;
use crate::error::{Creation, Result};
use crate::palettes::{PaletteHandle, PaletteLayer};
use crate::source::SourceRef;
use crate::sprites::{
    SpriteFirstAttributes, SpriteHandle, SpriteHblankTarget, SpriteManager, SpriteRegularSecondAttributes,
    SpriteThirdAttributes,
};

struct PaletteColorHandler {
    base_address: u32,
}

impl HblankEffectHandler for PaletteColorHandler {
    fn setup_target(&self, _: u32, _: &HblankContext, last_value: &mut u32) {
        *last_value = 0;
    }

    fn target_visible(&self, _: u32, _: &HblankContext) -> bool {
        true
    }

    fn target_updated(&self, _: u32, _: &HblankContext, _: &mut u32) -> bool {
        false
    }

    fn output_register(&self, target_id: u32, _: &HblankContext) -> u32 {
        self.base_address + target_id * 2
    }

    fn write_output_values(&self, _: u32, _: &HblankContext, input: &[u16], output: &mut [u16]) {
        output.copy_from_slice(input);
    }
}

static BG_PALETTE_COLOR: PaletteColorHandler = PaletteColorHandler { base_address: BG_PALETTE_ADDRESS };
static SPRITE_PALETTE_COLOR: PaletteColorHandler = PaletteColorHandler { base_address: SPRITE_PALETTE_ADDRESS };

/// Sprite effects all write one attribute word of the sprite's current OAM entry.
/// The memo packs that entry index with the word committed for it, so any change of
/// either restages the values.
fn sprite_memo(ctx: &HblankContext, target_id: u32, word: usize) -> u32 {
    match ctx.sprites.hblank_target(target_id as u16) {
        Some(target) => (target.hw_id as u32) << 16 | target.attributes[word] as u32,
        None => u32::MAX,
    }
}

fn sprite_target(ctx: &HblankContext, target_id: u32) -> Option<SpriteHblankTarget> {
    ctx.sprites.hblank_target(target_id as u16)
}

/// Sprite effect writing attribute word `WORD`.
trait SpriteWord {
    const WORD: usize;

    fn visible(_target: &SpriteHblankTarget) -> bool {
        true
    }

    fn fill(ctx: &HblankContext, target_id: u32, target: &SpriteHblankTarget, input: &[u16], output: &mut [u16]);
}

struct SpriteWordEffect<T>(PhantomData<T>);

impl<T: SpriteWord> HblankEffectHandler for SpriteWordEffect<T> {
    fn setup_target(&self, target_id: u32, ctx: &HblankContext, last_value: &mut u32) {
        *last_value = sprite_memo(ctx, target_id, T::WORD);
    }

    fn target_visible(&self, target_id: u32, ctx: &HblankContext) -> bool {
        sprite_target(ctx, target_id).is_some_and(|target| T::visible(&target))
    }

    fn target_updated(&self, target_id: u32, ctx: &HblankContext, last_value: &mut u32) -> bool {
        let memo = sprite_memo(ctx, target_id, T::WORD);
        let updated = memo != *last_value;
        *last_value = memo;
        updated
    }

    fn output_register(&self, target_id: u32, ctx: &HblankContext) -> u32 {
        let hw_id = sprite_target(ctx, target_id).map_or(0, |target| target.hw_id);
        oam::attribute_address(hw_id as usize, T::WORD)
    }

    fn write_output_values(&self, target_id: u32, ctx: &HblankContext, input: &[u16], output: &mut [u16]) {
        if let Some(target) = sprite_target(ctx, target_id) {
            T::fill(ctx, target_id, &target, input, output);
        }
    }
}

struct HorizontalPosition;

impl SpriteWord for HorizontalPosition {
    const WORD: usize = 1;

    fn fill(ctx: &HblankContext, target_id: u32, target: &SpriteHblankTarget, input: &[u16], output: &mut [u16]) {
        let offsets: &[i16] = bytemuck::cast_slice(input);
        ctx.sprites.fill_hblank_effect_horizontal_positions(target_id as u16, target.hw_position.x, offsets, output);
    }
}

struct VerticalPosition;

impl SpriteWord for VerticalPosition {
    const WORD: usize = 0;

    fn fill(ctx: &HblankContext, target_id: u32, target: &SpriteHblankTarget, input: &[u16], output: &mut [u16]) {
        let offsets: &[i16] = bytemuck::cast_slice(input);
        ctx.sprites.fill_hblank_effect_vertical_positions(target_id as u16, target.hw_position.y, offsets, output);
    }
}

struct FirstAttributes;

impl SpriteWord for FirstAttributes {
    const WORD: usize = 0;

    fn fill(_: &HblankContext, _: u32, target: &SpriteHblankTarget, input: &[u16], output: &mut [u16]) {
        SpriteManager::fill_hblank_effect_first_attributes(
            target.hw_position.y,
            target.shape_size.shape(),
            target.bpp,
            target.affine_mode,
            bytemuck::cast_slice(input),
            output,
        );
    }
}

struct RegularSecondAttributes;

impl SpriteWord for RegularSecondAttributes {
    const WORD: usize = 1;

    // affine sprites keep their matrix index in this word
    fn visible(target: &SpriteHblankTarget) -> bool {
        target.affine_mode == AffineMode::Regular
    }

    fn fill(_: &HblankContext, _: u32, target: &SpriteHblankTarget, input: &[u16], output: &mut [u16]) {
        SpriteManager::fill_hblank_effect_regular_second_attributes(
            target.hw_position.x,
            target.shape_size.size(),
            bytemuck::cast_slice(input),
            output,
        );
    }
}

struct ThirdAttributes;

impl SpriteWord for ThirdAttributes {
    const WORD: usize = 2;

    fn fill(_: &HblankContext, _: u32, _: &SpriteHblankTarget, input: &[u16], output: &mut [u16]) {
        SpriteManager::fill_hblank_effect_third_attributes(bytemuck::cast_slice(input), output);
    }
}

static HORIZONTAL_POSITION: SpriteWordEffect<HorizontalPosition> = SpriteWordEffect(PhantomData);
static VERTICAL_POSITION: SpriteWordEffect<VerticalPosition> = SpriteWordEffect(PhantomData);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpriteAxis {
    Horizontal,
    Vertical,
}

/// Per-scanline sprite attribute value types.
pub trait SpriteAttributesValue: Pod {
    #[doc(hidden)]
    const HANDLER: &'static dyn HblankEffectHandler;
}

impl SpriteAttributesValue for SpriteFirstAttributes {
    const HANDLER: &'static dyn HblankEffectHandler = &SpriteWordEffect::<FirstAttributes>(PhantomData);
}

impl SpriteAttributesValue for SpriteRegularSecondAttributes {
    const HANDLER: &'static dyn HblankEffectHandler = &SpriteWordEffect::<RegularSecondAttributes>(PhantomData);
}

impl SpriteAttributesValue for SpriteThirdAttributes {
    const HANDLER: &'static dyn HblankEffectHandler = &SpriteWordEffect::<ThirdAttributes>(PhantomData);
}

impl HblankEffects {
    /// Changes color `color_index` of `palette` on every scanline.
    pub fn create_palette_color(
        &mut self,
        palette: &PaletteHandle,
        color_index: usize,
        colors: SourceRef<Color>,
    ) -> HblankEffectId {
        self.try_create_palette_color(palette, color_index, colors).or_panic()
    }

    pub fn optional_create_palette_color(
        &mut self,
        palette: &PaletteHandle,
        color_index: usize,
        colors: SourceRef<Color>,
    ) -> Option<HblankEffectId> {
        self.try_create_palette_color(palette, color_index, colors).optional("hblank")
    }

    fn try_create_palette_color(
        &mut self,
        palette: &PaletteHandle,
        color_index: usize,
        colors: SourceRef<Color>,
    ) -> Result<HblankEffectId> {
        assert!(color_index < palette.colors_count(), "Invalid color index: {color_index}");

        let target_id = palette.hw_bank() as u32 * 16 + color_index as u32;
        let handler: &'static dyn HblankEffectHandler = match palette.layer() {
            PaletteLayer::Bg => &BG_PALETTE_COLOR,
            PaletteLayer::Sprites => &SPRITE_PALETTE_COLOR,
        };
        self.try_create(target_id, EffectTarget::Palette(palette.clone()), handler, colors.cast())
    }

    /// Offsets the sprite along `axis` on every scanline.
    pub fn create_sprite_position(&mut self, sprite: &SpriteHandle, axis: SpriteAxis, offsets: SourceRef<i16>) -> HblankEffectId {
        self.try_create_sprite_position(sprite, axis, offsets).or_panic()
    }

    pub fn optional_create_sprite_position(
        &mut self,
        sprite: &SpriteHandle,
        axis: SpriteAxis,
        offsets: SourceRef<i16>,
    ) -> Option<HblankEffectId> {
        self.try_create_sprite_position(sprite, axis, offsets).optional("hblank")
    }

    fn try_create_sprite_position(
        &mut self,
        sprite: &SpriteHandle,
        axis: SpriteAxis,
        offsets: SourceRef<i16>,
    ) -> Result<HblankEffectId> {
        let handler: &'static dyn HblankEffectHandler = match axis {
            SpriteAxis::Horizontal => &HORIZONTAL_POSITION,
            SpriteAxis::Vertical => &VERTICAL_POSITION,
        };
        self.try_create(sprite.id() as u32, EffectTarget::Sprite(sprite.clone()), handler, offsets.cast())
    }

    /// Replaces one attribute word of the sprite on every scanline.
    pub fn create_sprite_attributes<A: SpriteAttributesValue>(
        &mut self,
        sprite: &SpriteHandle,
        attributes: SourceRef<A>,
    ) -> HblankEffectId {
        self.try_create_sprite_attributes(sprite, attributes).or_panic()
    }

    pub fn optional_create_sprite_attributes<A: SpriteAttributesValue>(
        &mut self,
        sprite: &SpriteHandle,
        attributes: SourceRef<A>,
    ) -> Option<HblankEffectId> {
        self.try_create_sprite_attributes(sprite, attributes).optional("hblank")
    }

    fn try_create_sprite_attributes<A: SpriteAttributesValue>(
        &mut self,
        sprite: &SpriteHandle,
        attributes: SourceRef<A>,
    ) -> Result<HblankEffectId> {
        self.try_create(sprite.id() as u32, EffectTarget::Sprite(sprite.clone()), A::HANDLER, attributes.cast())
    }
}
