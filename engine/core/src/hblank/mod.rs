//! H-Blank effect scheduler.
//!
//! An effect writes one 16-bit value into one hardware register at the start of every
//! scanline. Registrations pair a target (palette color, sprite) with a handler that
//! knows where the target lives and how to turn the source values into register
//! values. Values are staged in a back buffer during commit and become active on the
//! next vertical blank.

mod handlers;

pub use handlers::{SpriteAttributesValue, SpriteAxis};

use alloc::boxed::Box;
use core::fmt;

use log::debug;
use vbank_hw::memory::VideoMemory;

use crate::config::MAX_HBLANK_EFFECTS;
use crate::error::{Creation, Error, Result};
use crate::palettes::{PaletteBank, PaletteHandle};
use crate::source::SourceRef;
use crate::sprites::{SpriteHandle, SpriteManager};

/// Scanlines per frame.
pub const HBLANK_LINES: usize = vbank_hw::SCREEN_HEIGHT as usize;

/// Managers a handler may look at while resolving its target.
#[derive(Copy, Clone)]
pub struct HblankContext<'a> {
    pub sprites: &'a SpriteManager,
    pub bg_palettes: &'a PaletteBank,
    pub sprite_palettes: &'a PaletteBank,
}

/// How an H-Blank effect reaches its target.
pub trait HblankEffectHandler {
    /// Called once, on the first update after creation or after the values change.
    fn setup_target(&self, target_id: u32, ctx: &HblankContext, last_value: &mut u32);

    fn target_visible(&self, target_id: u32, ctx: &HblankContext) -> bool;

    /// Whether the staged values are stale; `last_value` is the handler's own memo.
    fn target_updated(&self, target_id: u32, ctx: &HblankContext, last_value: &mut u32) -> bool;

    /// Bus address written at each scanline. Only asked for visible targets.
    fn output_register(&self, target_id: u32, ctx: &HblankContext) -> u32;

    /// Converts one value per scanline into register values.
    fn write_output_values(&self, target_id: u32, ctx: &HblankContext, input: &[u16], output: &mut [u16]);
}

/// Keeps the target of an effect alive for as long as the effect is registered.
pub enum EffectTarget {
    Register,
    Palette(PaletteHandle),
    Sprite(SpriteHandle),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HblankEffectId(u8);

impl HblankEffectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct Registration {
    target_id: u32,
    // never read, only held
    _target: EffectTarget,
    handler: &'static dyn HblankEffectHandler,
    values: SourceRef<u16>,
    last_value: u32,
    setup_pending: bool,
    visible: bool,
    output_register: u32,
    /// Back buffers still holding stale values.
    refresh: u8,
}

fn assert_values(values: &SourceRef<u16>) {
    let len = values.len();
    assert!(len == HBLANK_LINES || len == HBLANK_LINES / 2, "Invalid values count: {len}");
}

pub struct HblankEffects {
    registrations: [Option<Registration>; MAX_HBLANK_EFFECTS],
    buffers: Box<[[[u16; HBLANK_LINES]; MAX_HBLANK_EFFECTS]; 2]>,
    armed: [[Option<u32>; MAX_HBLANK_EFFECTS]; 2],
    back: usize,
}

impl HblankEffects {
    pub fn new() -> Self {
        Self {
            registrations: core::array::from_fn(|_| None),
            buffers: Box::new([[[0; HBLANK_LINES]; MAX_HBLANK_EFFECTS]; 2]),
            armed: [[None; MAX_HBLANK_EFFECTS]; 2],
            back: 0,
        }
    }

    fn registration(&self, id: HblankEffectId) -> &Registration {
        match self.registrations.get(id.index()) {
            Some(Some(registration)) => registration,
            _ => panic!("Invalid H-Blank effect id: {}", id.0),
        }
    }

    fn registration_mut(&mut self, id: HblankEffectId) -> &mut Registration {
        match self.registrations.get_mut(id.index()) {
            Some(Some(registration)) => registration,
            _ => panic!("Invalid H-Blank effect id: {}", id.0),
        }
    }

    /// Registers an effect. `values` holds one value per scanline, or one per pair of
    /// scanlines.
    pub fn create(
        &mut self,
        target_id: u32,
        target: EffectTarget,
        handler: &'static dyn HblankEffectHandler,
        values: SourceRef<u16>,
    ) -> HblankEffectId {
        self.try_create(target_id, target, handler, values).or_panic()
    }

    pub fn optional_create(
        &mut self,
        target_id: u32,
        target: EffectTarget,
        handler: &'static dyn HblankEffectHandler,
        values: SourceRef<u16>,
    ) -> Option<HblankEffectId> {
        self.try_create(target_id, target, handler, values).optional("hblank")
    }

    pub(crate) fn try_create(
        &mut self,
        target_id: u32,
        target: EffectTarget,
        handler: &'static dyn HblankEffectHandler,
        values: SourceRef<u16>,
    ) -> Result<HblankEffectId> {
        assert_values(&values);

        let index = self
            .registrations
            .iter()
            .position(Option::is_none)
            .ok_or(Error::HblankEffectsExhausted)?;

        self.registrations[index] = Some(Registration {
            target_id,
            _target: target,
            handler,
            values,
            last_value: 0,
            setup_pending: true,
            visible: false,
            output_register: 0,
            refresh: 2,
        });
        debug!(target: "hblank", "effect {} created for target {}", index, target_id);
        Ok(HblankEffectId(index as u8))
    }

    /// Unregisters an effect; its register stops being written from the next scanline.
    pub fn destroy(&mut self, id: HblankEffectId) {
        let registration = self.registrations[id.index()].take();
        assert!(registration.is_some(), "Invalid H-Blank effect id: {}", id.0);

        for armed in &mut self.armed {
            armed[id.index()] = None;
        }
        debug!(target: "hblank", "effect {} destroyed", id.0);
    }

    pub fn target_id(&self, id: HblankEffectId) -> u32 {
        self.registration(id).target_id
    }

    pub fn values_ref(&self, id: HblankEffectId) -> SourceRef<u16> {
        self.registration(id).values
    }

    pub fn set_values_ref(&mut self, id: HblankEffectId, values: SourceRef<u16>) {
        assert_values(&values);

        let registration = self.registration_mut(id);
        registration.values = values;
        registration.setup_pending = true;
        registration.refresh = 2;
    }

    /// Stages the current contents of the values buffer again.
    pub fn reload_values_ref(&mut self, id: HblankEffectId) {
        self.registration_mut(id).refresh = 2;
    }

    /// Resolves targets. Doesn't touch any buffer.
    pub fn update(&mut self, ctx: &HblankContext) {
        for registration in self.registrations.iter_mut().flatten() {
            let handler = registration.handler;
            let target_id = registration.target_id;

            if registration.setup_pending {
                handler.setup_target(target_id, ctx, &mut registration.last_value);
                registration.setup_pending = false;
            } else if handler.target_updated(target_id, ctx, &mut registration.last_value) {
                registration.refresh = 2;
            }

            registration.visible = handler.target_visible(target_id, ctx);
            if registration.visible {
                registration.output_register = handler.output_register(target_id, ctx);
            }
        }
    }

    /// Stages the values of every visible effect in the back buffer. Returns the
    /// number of effects written.
    pub fn commit(&mut self, ctx: &HblankContext) -> usize {
        let back = self.back;
        let mut written = 0;
        let mut input = [0u16; HBLANK_LINES];

        for (index, slot) in self.registrations.iter_mut().enumerate() {
            let Some(registration) = slot else {
                self.armed[back][index] = None;
                continue;
            };

            if !registration.visible {
                self.armed[back][index] = None;
                continue;
            }

            let register = registration.output_register;
            if registration.refresh == 0 && self.armed[back][index] == Some(register) {
                continue;
            }

            let values = registration.values.as_slice();
            if values.len() == HBLANK_LINES {
                input.copy_from_slice(values);
            } else {
                for (pair, &value) in input.chunks_exact_mut(2).zip(values) {
                    pair.fill(value);
                }
            }

            let output = &mut self.buffers[back][index];
            registration.handler.write_output_values(registration.target_id, ctx, &input, output);
            self.armed[back][index] = Some(register);
            registration.refresh = registration.refresh.saturating_sub(1);
            written += 1;
        }

        if written > 0 {
            debug!(target: "hblank", "staged {} effects", written);
        }
        written
    }

    /// Swaps buffers: what was staged becomes active.
    pub fn vblank(&mut self) {
        self.back ^= 1;
    }

    /// Register values active this frame.
    pub fn front_values(&self, id: HblankEffectId) -> Option<&[u16; HBLANK_LINES]> {
        let front = self.back ^ 1;
        self.armed[front][id.index()]?;
        Some(&self.buffers[front][id.index()])
    }

    pub fn armed_register(&self, id: HblankEffectId) -> Option<u32> {
        self.armed[self.back ^ 1][id.index()]
    }

    /// Performs the writes of the H-Blank preceding `line`.
    pub fn apply_scanline(&self, line: usize, memory: &mut VideoMemory) {
        assert!(line < HBLANK_LINES, "Invalid scanline: {line}");

        let front = self.back ^ 1;
        for (index, armed) in self.armed[front].iter().enumerate() {
            if let Some(register) = *armed {
                memory.write(register, self.buffers[front][index][line]);
            }
        }
    }

    pub fn used_count(&self) -> usize {
        self.registrations.iter().filter(|registration| registration.is_some()).count()
    }

    pub fn available_count(&self) -> usize {
        MAX_HBLANK_EFFECTS - self.used_count()
    }
}

impl Default for HblankEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HblankEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HblankEffects")
            .field("used", &self.used_count())
            .field("back", &self.back)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palettes::PaletteLayer;

    /// Writes `value + target_id` to register `0x0500_0000 + 2 * target_id`.
    struct OffsetHandler;

    impl HblankEffectHandler for OffsetHandler {
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
            0x0500_0000 + target_id * 2
        }

        fn write_output_values(&self, target_id: u32, _: &HblankContext, input: &[u16], output: &mut [u16]) {
            for (output, input) in output.iter_mut().zip(input) {
                *output = input + target_id as u16;
            }
        }
    }

    static HANDLER: OffsetHandler = OffsetHandler;
    static RAMP: [u16; HBLANK_LINES] = {
        let mut values = [0; HBLANK_LINES];
        let mut line = 0;
        while line < HBLANK_LINES {
            values[line] = line as u16;
            line += 1;
        }
        values
    };
    static HALF: [u16; HBLANK_LINES / 2] = [7; HBLANK_LINES / 2];

    fn frame(effects: &mut HblankEffects) -> usize {
        let sprites = SpriteManager::new();
        let bg_palettes = PaletteBank::new(PaletteLayer::Bg);
        let sprite_palettes = PaletteBank::new(PaletteLayer::Sprites);
        let ctx = HblankContext { sprites: &sprites, bg_palettes: &bg_palettes, sprite_palettes: &sprite_palettes };

        effects.update(&ctx);
        let written = effects.commit(&ctx);
        effects.vblank();
        written
    }

    #[test]
    fn values_become_active_after_vblank() {
        let mut effects = HblankEffects::new();
        let id = effects.create(3, EffectTarget::Register, &HANDLER, SourceRef::from_static(&RAMP));
        assert_eq!(effects.front_values(id), None);

        assert_eq!(frame(&mut effects), 1);
        let values = effects.front_values(id).unwrap();
        assert_eq!(values[0], 3);
        assert_eq!(values[159], 162);
        assert_eq!(effects.armed_register(id), Some(0x0500_0006));
    }

    #[test]
    fn half_height_values_are_expanded() {
        let mut effects = HblankEffects::new();
        let id = effects.create(0, EffectTarget::Register, &HANDLER, SourceRef::from_static(&HALF));
        frame(&mut effects);
        assert!(effects.front_values(id).unwrap().iter().all(|&value| value == 7));
    }

    #[test]
    fn unchanged_effects_are_staged_twice() {
        let mut effects = HblankEffects::new();
        let id = effects.create(0, EffectTarget::Register, &HANDLER, SourceRef::from_static(&RAMP));
        assert_eq!(frame(&mut effects), 1);
        assert_eq!(frame(&mut effects), 1);
        assert_eq!(frame(&mut effects), 0);

        effects.reload_values_ref(id);
        assert_eq!(frame(&mut effects), 1);
    }

    #[test]
    fn destroy_keeps_other_effects() {
        let mut effects = HblankEffects::new();
        let first = effects.create(1, EffectTarget::Register, &HANDLER, SourceRef::from_static(&RAMP));
        let second = effects.create(2, EffectTarget::Register, &HANDLER, SourceRef::from_static(&RAMP));
        frame(&mut effects);

        effects.destroy(first);
        assert_eq!(effects.armed_register(first), None);
        assert_eq!(effects.target_id(second), 2);
        assert_eq!(effects.front_values(second).unwrap()[10], 12);

        let third = effects.create(5, EffectTarget::Register, &HANDLER, SourceRef::from_static(&HALF));
        assert_eq!(third, first);
        assert_eq!(effects.target_id(second), 2);
    }

    #[test]
    fn capacity() {
        let mut effects = HblankEffects::new();
        for target_id in 0..MAX_HBLANK_EFFECTS as u32 {
            effects.create(target_id, EffectTarget::Register, &HANDLER, SourceRef::from_static(&RAMP));
        }
        assert_eq!(effects.available_count(), 0);
        assert!(effects
            .optional_create(9, EffectTarget::Register, &HANDLER, SourceRef::from_static(&RAMP))
            .is_none());
        assert_eq!(effects.used_count(), MAX_HBLANK_EFFECTS);
    }

    #[test]
    #[should_panic(expected = "Invalid values count")]
    fn wrong_values_count() {
        static SHORT: [u16; 10] = [0; 10];
        let mut effects = HblankEffects::new();
        effects.create(0, EffectTarget::Register, &HANDLER, SourceRef::from_static(&SHORT));
    }

    #[test]
    fn apply_scanline_writes_registers() {
        let mut effects = HblankEffects::new();
        effects.create(4, EffectTarget::Register, &HANDLER, SourceRef::from_static(&RAMP));
        frame(&mut effects);

        let mut memory = VideoMemory::new();
        effects.apply_scanline(20, &mut memory);
        assert_eq!(memory.bg_palette[4], 24);
    }
}
