use alloc::rc::Rc;
use core::cell::Cell;

use crate::math::Point;

/// Shared viewpoint. Sprites attached to a camera are drawn relative to its position;
/// every clone moves together.
#[derive(Clone, Debug, Default)]
pub struct Camera(Rc<Cell<Point>>);

impl Camera {
    pub fn new(position: Point) -> Self {
        Self(Rc::new(Cell::new(position)))
    }

    pub fn position(&self) -> Point {
        self.0.get()
    }

    pub fn set_position(&self, position: Point) {
        self.0.set(position);
    }

    pub fn set_x(&self, x: i32) {
        self.0.set(Point::new(x, self.position().y));
    }

    pub fn set_y(&self, y: i32) {
        self.0.set(Point::new(self.position().x, y));
    }
}

impl PartialEq for Camera {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Camera {}
