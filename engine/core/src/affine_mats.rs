//! Sprite affine matrices.
//!
//! The hardware has 32 matrices, stored as 8.8 fixed point parameters in the fourth
//! word of OAM entries. Sprites refer to them by index; a matrix lives as long as
//! some handle does.

use alloc::rc::Rc;
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use core::hash::{Hash, Hasher};

use log::debug;
use vbank_hw::oam;

use crate::config::MAX_AFFINE_MATS;
use crate::error::{Creation, Error, Result};
use crate::math::Fixed;

const QUARTER_SINE: [i32; 91] = [
    0, 71, 143, 214, 286, 357, 428, 499, 570, 641,
    711, 782, 852, 921, 991, 1060, 1129, 1198, 1266, 1334,
    1401, 1468, 1534, 1600, 1666, 1731, 1796, 1860, 1923, 1986,
    2048, 2110, 2171, 2231, 2290, 2349, 2408, 2465, 2522, 2578,
    2633, 2687, 2741, 2793, 2845, 2896, 2946, 2996, 3044, 3091,
    3138, 3183, 3228, 3271, 3314, 3355, 3396, 3435, 3474, 3511,
    3547, 3582, 3617, 3650, 3681, 3712, 3742, 3770, 3798, 3824,
    3849, 3873, 3896, 3917, 3937, 3956, 3974, 3991, 4006, 4021,
    4034, 4046, 4056, 4065, 4074, 4080, 4086, 4090, 4094, 4095,
    4096,
];

fn sin(degrees: u16) -> Fixed {
    let degrees = (degrees % 360) as usize;
    let raw = match degrees {
        0..=90 => QUARTER_SINE[degrees],
        91..=180 => QUARTER_SINE[180 - degrees],
        181..=270 => -QUARTER_SINE[degrees - 180],
        _ => -QUARTER_SINE[360 - degrees],
    };
    Fixed::from_raw(raw)
}

fn cos(degrees: u16) -> Fixed {
    sin((degrees % 360) + 90)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DoubleSizeMode {
    /// Doubled when the transformed sprite would not fit in its regular box.
    Auto,
    Enabled,
    Disabled,
}

/// Rotation, scale and flips of an affine matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AffineMatAttributes {
    rotation_angle: u16,
    scale_x: Fixed,
    scale_y: Fixed,
    horizontal_flip: bool,
    vertical_flip: bool,
}

impl Default for AffineMatAttributes {
    fn default() -> Self {
        Self {
            rotation_angle: 0,
            scale_x: Fixed::ONE,
            scale_y: Fixed::ONE,
            horizontal_flip: false,
            vertical_flip: false,
        }
    }
}

impl AffineMatAttributes {
    pub fn rotation_angle(&self) -> u16 {
        self.rotation_angle
    }

    /// Counterclockwise rotation in degrees, `[0, 360)`.
    pub fn set_rotation_angle(&mut self, degrees: u16) {
        assert!(degrees < 360, "Invalid rotation angle: {degrees}");
        self.rotation_angle = degrees;
    }

    pub fn scale_x(&self) -> Fixed {
        self.scale_x
    }

    pub fn scale_y(&self) -> Fixed {
        self.scale_y
    }

    pub fn set_scale(&mut self, scale: Fixed) {
        self.set_scale_x(scale);
        self.set_scale_y(scale);
    }

    pub fn set_scale_x(&mut self, scale: Fixed) {
        assert!(scale > Fixed::ZERO, "Invalid scale x: {scale:?}");
        self.scale_x = scale;
    }

    pub fn set_scale_y(&mut self, scale: Fixed) {
        assert!(scale > Fixed::ZERO, "Invalid scale y: {scale:?}");
        self.scale_y = scale;
    }

    pub fn horizontal_flip(&self) -> bool {
        self.horizontal_flip
    }

    pub fn set_horizontal_flip(&mut self, flip: bool) {
        self.horizontal_flip = flip;
    }

    pub fn vertical_flip(&self) -> bool {
        self.vertical_flip
    }

    pub fn set_vertical_flip(&mut self, flip: bool) {
        self.vertical_flip = flip;
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Screen to texture matrix as 8.8 parameters `[pa, pb, pc, pd]`.
    pub fn parameters(&self) -> [i16; 4] {
        let sin = sin(self.rotation_angle);
        let cos = cos(self.rotation_angle);

        let mut pa = cos / self.scale_x;
        let mut pb = sin / self.scale_x;
        let mut pc = -sin / self.scale_y;
        let mut pd = cos / self.scale_y;

        if self.horizontal_flip {
            pa = -pa;
            pb = -pb;
        }
        if self.vertical_flip {
            pc = -pc;
            pd = -pd;
        }

        [pa, pb, pc, pd].map(|value| value.with_fraction_bits(8).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
    }

    /// Whether a `width`×`height` sprite drawn with this matrix spills out of its box.
    pub fn double_size(&self, width: i32, height: i32) -> bool {
        let sin = sin(self.rotation_angle).abs();
        let cos = cos(self.rotation_angle).abs();

        let transformed_width = (self.scale_x * cos).mul_int(width) + (self.scale_y * sin).mul_int(height);
        let transformed_height = (self.scale_x * sin).mul_int(width) + (self.scale_y * cos).mul_int(height);

        transformed_width > Fixed::ONE.mul_int(width) || transformed_height > Fixed::ONE.mul_int(height)
    }
}

#[derive(Copy, Clone)]
struct AffineMatEntry {
    usages: u16,
    attributes: AffineMatAttributes,
    dirty: bool,
}

pub struct AffineMatsManager {
    entries: [Option<AffineMatEntry>; MAX_AFFINE_MATS],
}

impl AffineMatsManager {
    pub fn new() -> Self {
        Self { entries: [None; MAX_AFFINE_MATS] }
    }

    fn entry(&self, id: u8) -> &AffineMatEntry {
        match self.entries.get(id as usize) {
            Some(Some(entry)) => entry,
            _ => panic!("Invalid affine mat id: {id}"),
        }
    }

    fn entry_mut(&mut self, id: u8) -> &mut AffineMatEntry {
        match self.entries.get_mut(id as usize) {
            Some(Some(entry)) => entry,
            _ => panic!("Invalid affine mat id: {id}"),
        }
    }

    pub fn create(&mut self, attributes: AffineMatAttributes) -> Result<u8> {
        let id = self.entries.iter().position(Option::is_none).ok_or(Error::AffineMatsExhausted)?;
        self.entries[id] = Some(AffineMatEntry { usages: 1, attributes, dirty: true });
        debug!(target: "affine_mats", "affine mat {} created", id);
        Ok(id as u8)
    }

    pub fn increase_usage(&mut self, id: u8) {
        self.entry_mut(id).usages += 1;
    }

    pub fn decrease_usage(&mut self, id: u8) {
        let entry = self.entry_mut(id);
        entry.usages -= 1;
        if entry.usages == 0 {
            self.entries[id as usize] = None;
            debug!(target: "affine_mats", "affine mat {} released", id);
        }
    }

    pub fn usages(&self, id: u8) -> u16 {
        self.entry(id).usages
    }

    pub fn attributes(&self, id: u8) -> AffineMatAttributes {
        self.entry(id).attributes
    }

    pub fn set_attributes(&mut self, id: u8, attributes: AffineMatAttributes) {
        let entry = self.entry_mut(id);
        if entry.attributes != attributes {
            entry.attributes = attributes;
            entry.dirty = true;
        }
    }

    pub fn used_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn available_count(&self) -> usize {
        MAX_AFFINE_MATS - self.used_count()
    }

    /// Writes dirty matrices to OAM. Returns the number of matrices written.
    pub fn commit(&mut self, oam_words: &mut [u16]) -> usize {
        let mut written = 0;
        for (id, entry) in self.entries.iter_mut().enumerate() {
            let Some(entry) = entry.as_mut().filter(|entry| entry.dirty) else {
                continue;
            };

            for (parameter, value) in entry.attributes.parameters().into_iter().enumerate() {
                oam_words[oam::affine_parameter_index(id, parameter)] = value as u16;
            }
            entry.dirty = false;
            written += 1;
        }

        if written > 0 {
            debug!(target: "affine_mats", "committed {} affine mats", written);
        }
        written
    }
}

impl Default for AffineMatsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the affine matrix table.
#[derive(Clone, Default)]
pub struct AffineMats(Rc<RefCell<AffineMatsManager>>);

impl AffineMats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager(&self) -> Ref<'_, AffineMatsManager> {
        self.0.borrow()
    }

    pub(crate) fn manager_mut(&self) -> RefMut<'_, AffineMatsManager> {
        self.0.borrow_mut()
    }

    pub fn create(&self, attributes: AffineMatAttributes) -> AffineMatHandle {
        self.try_create(attributes).or_panic()
    }

    pub fn optional_create(&self, attributes: AffineMatAttributes) -> Option<AffineMatHandle> {
        self.try_create(attributes).optional("affine_mats")
    }

    fn try_create(&self, attributes: AffineMatAttributes) -> Result<AffineMatHandle> {
        let id = self.manager_mut().create(attributes)?;
        Ok(AffineMatHandle { id, mats: self.clone() })
    }

    pub fn used_count(&self) -> usize {
        self.manager().used_count()
    }

    pub fn available_count(&self) -> usize {
        self.manager().available_count()
    }
}

pub struct AffineMatHandle {
    id: u8,
    mats: AffineMats,
}

impl AffineMatHandle {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn usages(&self) -> u16 {
        self.mats.manager().usages(self.id)
    }

    pub fn attributes(&self) -> AffineMatAttributes {
        self.mats.manager().attributes(self.id)
    }

    pub fn set_attributes(&mut self, attributes: AffineMatAttributes) {
        self.mats.manager_mut().set_attributes(self.id, attributes);
    }

    fn update(&mut self, update: impl FnOnce(&mut AffineMatAttributes)) {
        let mut attributes = self.attributes();
        update(&mut attributes);
        self.set_attributes(attributes);
    }

    pub fn set_rotation_angle(&mut self, degrees: u16) {
        self.update(|attributes| attributes.set_rotation_angle(degrees));
    }

    pub fn set_scale(&mut self, scale: Fixed) {
        self.update(|attributes| attributes.set_scale(scale));
    }

    pub fn set_scale_x(&mut self, scale: Fixed) {
        self.update(|attributes| attributes.set_scale_x(scale));
    }

    pub fn set_scale_y(&mut self, scale: Fixed) {
        self.update(|attributes| attributes.set_scale_y(scale));
    }

    pub fn set_horizontal_flip(&mut self, flip: bool) {
        self.update(|attributes| attributes.set_horizontal_flip(flip));
    }

    pub fn set_vertical_flip(&mut self, flip: bool) {
        self.update(|attributes| attributes.set_vertical_flip(flip));
    }

    pub fn is_identity(&self) -> bool {
        self.attributes().is_identity()
    }

    pub fn double_size(&self, width: i32, height: i32) -> bool {
        self.attributes().double_size(width, height)
    }
}

impl Clone for AffineMatHandle {
    fn clone(&self) -> Self {
        self.mats.manager_mut().increase_usage(self.id);
        Self { id: self.id, mats: self.mats.clone() }
    }
}

impl Drop for AffineMatHandle {
    fn drop(&mut self) {
        self.mats.manager_mut().decrease_usage(self.id);
    }
}

impl PartialEq for AffineMatHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.mats.0, &other.mats.0)
    }
}

impl Eq for AffineMatHandle {}

impl Hash for AffineMatHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for AffineMatHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffineMatHandle").field("id", &self.id).finish()
    }
}
