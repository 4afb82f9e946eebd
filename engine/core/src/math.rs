use core::fmt;
use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Signed fixed point number with 12 fraction bits.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(i32);

impl Fixed {
    pub const FRACTION_BITS: u32 = 12;
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(1 << Self::FRACTION_BITS);

    pub const fn from_raw(raw: i32) -> Self {
        Fixed(raw)
    }

    pub const fn from_int(value: i32) -> Self {
        Fixed(value << Self::FRACTION_BITS)
    }

    pub const fn from_ratio(numerator: i32, denominator: i32) -> Self {
        Fixed(((numerator as i64) << Self::FRACTION_BITS).wrapping_div(denominator as i64) as i32)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Integer part, rounded towards negative infinity.
    pub const fn integer(self) -> i32 {
        self.0 >> Self::FRACTION_BITS
    }

    pub const fn abs(self) -> Self {
        Fixed(self.0.abs())
    }

    /// Whether the value lies in `[0, 1]`.
    pub fn is_unit(self) -> bool {
        self >= Self::ZERO && self <= Self::ONE
    }

    /// Raw value with `bits` fraction bits instead of 12.
    pub const fn with_fraction_bits(self, bits: u32) -> i32 {
        if bits >= Self::FRACTION_BITS {
            self.0 << (bits - Self::FRACTION_BITS)
        } else {
            self.0 >> (Self::FRACTION_BITS - bits)
        }
    }

    /// `self * value`, as a raw fixed point number wide enough not to overflow.
    pub const fn mul_int(self, value: i32) -> i64 {
        self.0 as i64 * value as i64
    }
}

impl From<i32> for Fixed {
    fn from(value: i32) -> Self {
        Fixed::from_int(value)
    }
}

impl Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 + rhs.0)
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Fixed) {
        self.0 += rhs.0;
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 - rhs.0)
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Fixed) {
        self.0 -= rhs.0;
    }
}

impl Neg for Fixed {
    type Output = Fixed;
    fn neg(self) -> Fixed {
        Fixed(-self.0)
    }
}

impl Mul for Fixed {
    type Output = Fixed;
    fn mul(self, rhs: Fixed) -> Fixed {
        Fixed(((self.0 as i64 * rhs.0 as i64) >> Self::FRACTION_BITS) as i32)
    }
}

impl Div for Fixed {
    type Output = Fixed;
    fn div(self, rhs: Fixed) -> Fixed {
        assert!(rhs.0 != 0, "Division by zero");
        Fixed((((self.0 as i64) << Self::FRACTION_BITS) / rhs.0 as i64) as i32)
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({}/{})", self.0, 1 << Self::FRACTION_BITS)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_arithmetic() {
        let half = Fixed::from_ratio(1, 2);
        assert_eq!(half + half, Fixed::ONE);
        assert_eq!(half * Fixed::from_int(6), Fixed::from_int(3));
        assert_eq!(Fixed::ONE / half, Fixed::from_int(2));
        assert_eq!(Fixed::from_ratio(-3, 2).integer(), -2);
        assert_eq!(Fixed::ONE.with_fraction_bits(8), 256);
        assert!(half.is_unit());
        assert!(!(-half).is_unit());
    }
}
