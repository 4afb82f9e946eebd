use vbank_core::hblank::HBLANK_LINES;
use vbank_core::hw::memory::{OAM_ITEM_WORDS, SPRITE_PALETTE_ADDRESS};
use vbank_core::hw::oam;
use vbank_core::sprites::SpriteThirdAttributes;
use vbank_core::{
    Bpp, Color, Engine, Fixed, PaletteItem, Point, SourceRef, SpriteAxis, SpriteBuilder, SpriteItem, SpriteShape,
    SpriteShapeSize, SpriteSize, Tile, TilesItem,
};

static TILES: [Tile; 4] = [Tile([0x1111; 16]); 4];
static COLORS: [Color; 16] = [Color::from_raw(0x001F); 16];

static RAMP: [Color; 16] = {
    let mut colors = [Color::BLACK; 16];
    let mut index = 0;
    while index < 16 {
        colors[index] = Color::from_raw(index as u16 * 2);
        index += 1;
    }
    colors
};

static GRADIENT: [Color; HBLANK_LINES] = {
    let mut colors = [Color::BLACK; HBLANK_LINES];
    let mut line = 0;
    while line < HBLANK_LINES {
        colors[line] = Color::from_raw((line % 32) as u16);
        line += 1;
    }
    colors
};
static WAVE: [i16; HBLANK_LINES / 2] = {
    let mut offsets = [0; HBLANK_LINES / 2];
    let mut pair = 0;
    while pair < HBLANK_LINES / 2 {
        offsets[pair] = (pair % 8) as i16 - 4;
        pair += 1;
    }
    offsets
};

fn sprite_item() -> SpriteItem<'static> {
    let shape_size = SpriteShapeSize::new(SpriteShape::Square, SpriteSize::Normal);
    SpriteItem::new(shape_size, TilesItem::from_static(&TILES), PaletteItem::new(&COLORS, Bpp::Bpp4))
}

fn builder(engine: &Engine) -> SpriteBuilder {
    sprite_item().builder(&engine.sprite_tiles, &engine.sprite_palettes)
}

fn frame(engine: &mut Engine) {
    engine.update();
    engine.commit();
    engine.vblank();
}

#[test]
fn shared_palette_effects_reach_every_sprite() {
    let mut engine = Engine::default();
    let first = engine.sprites.create(builder(&engine).position(Point::new(40, 40)));
    let second = engine.sprites.create(builder(&engine).position(Point::new(80, 40)));
    assert_eq!(first.palette(), second.palette());
    frame(&mut engine);

    let mut palette = first.palette();
    palette.set_fade(Color::WHITE, Fixed::ONE);
    frame(&mut engine);

    for sprite in [&first, &second] {
        let bank = sprite.palette().hw_bank() as usize;
        let colors = &engine.memory.sprite_palette[bank * 16..bank * 16 + 16];
        assert!(colors.iter().all(|&color| color == Color::WHITE.raw()));
    }

    palette.set_fade_intensity(Fixed::ZERO);
    palette.set_inverted(true);
    frame(&mut engine);
    let bank = second.palette().hw_bank() as usize;
    assert_eq!(engine.memory.sprite_palette[bank * 16], Color::from_raw(0x001F).inverted().raw());
}

#[test]
fn shared_palette_rotation_and_grayscale_reach_every_sprite() {
    let mut engine = Engine::default();
    let shape_size = SpriteShapeSize::new(SpriteShape::Square, SpriteSize::Normal);
    let item = SpriteItem::new(shape_size, TilesItem::from_static(&TILES), PaletteItem::new(&RAMP, Bpp::Bpp4));
    let first = engine.sprites.create(item.builder(&engine.sprite_tiles, &engine.sprite_palettes).position(Point::new(40, 40)));
    let second = engine.sprites.create(item.builder(&engine.sprite_tiles, &engine.sprite_palettes).position(Point::new(80, 40)));
    assert_eq!(first.palette(), second.palette());

    let mut palette = second.palette();
    palette.set_rotate_count(1);
    frame(&mut engine);
    for sprite in [&first, &second] {
        let bank = sprite.palette().hw_bank() as usize;
        let colors = &engine.memory.sprite_palette[bank * 16..bank * 16 + 16];
        assert_eq!(colors[0], RAMP[0].raw());
        assert_eq!(colors[1], RAMP[2].raw());
        assert_eq!(colors[15], RAMP[1].raw());
    }

    palette.set_rotate_count(0);
    palette.set_grayscale_intensity(Fixed::ONE);
    frame(&mut engine);
    for sprite in [&first, &second] {
        let bank = sprite.palette().hw_bank() as usize;
        let colors = &engine.memory.sprite_palette[bank * 16..bank * 16 + 16];
        for (index, &color) in colors.iter().enumerate() {
            assert_eq!(color, RAMP[index].grayscale(Fixed::ONE).raw());
        }
        assert_ne!(colors[15], RAMP[15].raw());
    }
}

#[test]
fn sprites_are_ordered_by_priority_then_z_order_then_creation() {
    let mut engine = Engine::default();
    let s0 = engine.sprites.create(builder(&engine).position(Point::new(20, 20)).bg_priority(2).z_order(0));
    let s1 = engine.sprites.create(builder(&engine).position(Point::new(40, 20)).bg_priority(1).z_order(0));
    let s2 = engine.sprites.create(builder(&engine).position(Point::new(60, 20)).bg_priority(2).z_order(1));
    frame(&mut engine);

    assert_eq!(engine.sprites.manager().render_order(), &[s1.id(), s0.id(), s2.id()]);
    assert_eq!((s1.hw_id(), s0.hw_id(), s2.hw_id()), (Some(0), Some(1), Some(2)));

    let x_of = |hw_id: usize| engine.memory.oam[hw_id * OAM_ITEM_WORDS + 1] & 0x1FF;
    assert_eq!((x_of(0), x_of(1), x_of(2)), (32, 12, 52));
    assert_eq!(engine.memory.oam[3 * OAM_ITEM_WORDS], oam::HIDDEN_ATTR0);
}

#[test]
fn destroyed_sprite_entry_is_hidden() {
    let mut engine = Engine::default();
    let first = engine.sprites.create(builder(&engine).position(Point::new(20, 20)));
    let second = engine.sprites.create(builder(&engine).position(Point::new(40, 20)).z_order(1));
    frame(&mut engine);
    assert_eq!(second.hw_id(), Some(1));

    drop(first);
    frame(&mut engine);
    assert_eq!(second.hw_id(), Some(0));
    assert_eq!(engine.memory.oam[OAM_ITEM_WORDS], oam::HIDDEN_ATTR0);
    assert_eq!(engine.memory.oam[1] & 0x1FF, 32);
    assert_eq!(engine.sprites.used_count(), 1);
}

#[test]
fn palette_color_effect_writes_each_scanline() {
    let mut engine = Engine::default();
    let sprite = engine.sprites.create(builder(&engine).position(Point::new(20, 20)));
    let palette = sprite.palette();
    let effect = engine.hblank_effects.create_palette_color(&palette, 1, SourceRef::from_static(&GRADIENT));
    frame(&mut engine);

    let register = SPRITE_PALETTE_ADDRESS + (palette.hw_bank() as u32 * 16 + 1) * 2;
    assert_eq!(engine.hblank_effects.armed_register(effect), Some(register));

    engine.hblank_effects.apply_scanline(37, &mut engine.memory);
    let index = palette.hw_bank() as usize * 16 + 1;
    assert_eq!(engine.memory.sprite_palette[index], 5);
}

#[test]
fn sprite_position_effect_follows_the_sprite() {
    let mut engine = Engine::default();
    let mut sprite = engine.sprites.create(builder(&engine).position(Point::new(100, 50)));
    let effect = engine.hblank_effects.create_sprite_position(&sprite, SpriteAxis::Horizontal, SourceRef::from_static(&WAVE));
    frame(&mut engine);

    let values = engine.hblank_effects.front_values(effect).unwrap();
    assert_eq!(values[0] & 0x1FF, 92 - 4);
    assert_eq!(values[1] & 0x1FF, 92 - 4);
    assert_eq!(values[2] & 0x1FF, 92 - 3);
    assert_eq!(engine.hblank_effects.armed_register(effect), Some(oam::attribute_address(0, 1)));

    sprite.set_x(110);
    frame(&mut engine);
    let values = engine.hblank_effects.front_values(effect).unwrap();
    assert_eq!(values[0] & 0x1FF, 102 - 4);

    sprite.set_visible(false);
    frame(&mut engine);
    assert_eq!(engine.hblank_effects.armed_register(effect), None);
}

#[test]
fn sprite_attributes_effect_keeps_the_sprite_alive() {
    static THIRD: [SpriteThirdAttributes; HBLANK_LINES] = [SpriteThirdAttributes::from_raw(0x2005); HBLANK_LINES];

    let mut engine = Engine::default();
    let sprite = engine.sprites.create(builder(&engine).position(Point::new(20, 20)));
    let effect = engine.hblank_effects.create_sprite_attributes(&sprite, SourceRef::from_static(&THIRD));
    drop(sprite);
    assert_eq!(engine.sprites.used_count(), 1);

    frame(&mut engine);
    assert_eq!(engine.hblank_effects.front_values(effect).unwrap()[80], 0x2005);

    engine.hblank_effects.destroy(effect);
    assert_eq!(engine.sprites.used_count(), 0);
}

#[test]
fn destroying_an_effect_keeps_the_others() {
    let mut engine = Engine::default();
    let sprite = engine.sprites.create(builder(&engine).position(Point::new(20, 20)));
    let palette = sprite.palette();

    let first = engine.hblank_effects.create_palette_color(&palette, 1, SourceRef::from_static(&GRADIENT));
    let second = engine.hblank_effects.create_palette_color(&palette, 2, SourceRef::from_static(&GRADIENT));
    let third = engine.hblank_effects.create_sprite_position(&sprite, SpriteAxis::Vertical, SourceRef::from_static(&WAVE));
    frame(&mut engine);

    let second_target = engine.hblank_effects.target_id(second);
    let third_values = *engine.hblank_effects.front_values(third).unwrap();

    engine.hblank_effects.destroy(first);
    frame(&mut engine);

    assert_eq!(engine.hblank_effects.target_id(second), second_target);
    assert_eq!(*engine.hblank_effects.front_values(third).unwrap(), third_values);
    assert_eq!(engine.hblank_effects.front_values(first), None);
    assert_eq!(engine.hblank_effects.used_count(), 2);
}
