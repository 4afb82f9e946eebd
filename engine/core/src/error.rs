use core::fmt;

use log::warn;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// No free run of `blocks` blocks (or no free item) left in the named pool.
    PoolExhausted { pool: &'static str, blocks: u16 },
    SpritesExhausted,
    AffineMatsExhausted,
    HblankEffectsExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PoolExhausted { pool, blocks } => {
                write!(f, "{pool} exhausted: no room for {blocks} blocks")
            }
            Error::SpritesExhausted => write!(f, "no more sprite items available"),
            Error::AffineMatsExhausted => write!(f, "no more affine mat items available"),
            Error::HblankEffectsExhausted => write!(f, "no more H-Blank effect items available"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

/// Splits a creation result into the hard-failing and the optional entry points.
pub(crate) trait Creation<T> {
    /// Panics with the error's message.
    fn or_panic(self) -> T;

    /// Logs the error and returns `None`.
    fn optional(self, target: &str) -> Option<T>;
}

impl<T> Creation<T> for Result<T> {
    #[track_caller]
    fn or_panic(self) -> T {
        match self {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    fn optional(self, target: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(target: target, "{error}");
                None
            }
        }
    }
}
