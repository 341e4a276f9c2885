//! Derivative sizes: the `WIDTHxHEIGHT` value type.
//!
//! A [`Size`] names a bounding box. Its canonical string form doubles as the
//! directory name under which derivatives of that box are stored, so parsing
//! must be strict: anything that is not exactly `^\d+x\d+$` is rejected, and
//! both components must fall within [`MIN_DIMENSION`]..=[`MAX_DIMENSION`].
//!
//! Ordering is numeric on `(width, height)`, never lexicographic on the
//! string form (`50x50` sorts before `200x100`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest accepted width or height.
pub const MIN_DIMENSION: u32 = 1;
/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    #[error("Empty size given")]
    Empty,
    #[error("Size '{0}' contains inappropriate symbols, expected WIDTHxHEIGHT")]
    Format(String),
    #[error("Size '{0}' is out of range, width and height must be {MIN_DIMENSION}-{MAX_DIMENSION}")]
    OutOfRange(String),
}

/// A `width x height` bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Size {
    width: u32,
    height: u32,
}

impl Size {
    /// Build a size, rejecting components outside the accepted range.
    pub fn new(width: u32, height: u32) -> Result<Self, SizeError> {
        let in_range = |v: u32| (MIN_DIMENSION..=MAX_DIMENSION).contains(&v);
        if !in_range(width) || !in_range(height) {
            return Err(SizeError::OutOfRange(format!("{width}x{height}")));
        }
        Ok(Self { width, height })
    }

    pub fn width(self) -> u32 {
        self.width
    }

    pub fn height(self) -> u32 {
        self.height
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = SizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SizeError::Empty);
        }
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| SizeError::Format(s.to_string()))?;
        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(w) || !all_digits(h) {
            return Err(SizeError::Format(s.to_string()));
        }
        // Digits-only strings can still overflow u32; that is a range problem.
        let width = w
            .parse::<u32>()
            .map_err(|_| SizeError::OutOfRange(s.to_string()))?;
        let height = h
            .parse::<u32>()
            .map_err(|_| SizeError::OutOfRange(s.to_string()))?;
        Size::new(width, height).map_err(|_| SizeError::OutOfRange(s.to_string()))
    }
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Size {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse the comma-separated `sizes` upload parameter.
///
/// - `""` → `Ok(None)` (no derivatives requested)
/// - `"700x600,1024x768"` → both sizes, sorted, duplicates collapsed
/// - `"100x200,"` → [`SizeError::Empty`]
///
/// Validation is all-or-nothing: the first bad token fails the whole list.
pub fn parse_size_list(value: &str) -> Result<Option<Vec<Size>>, SizeError> {
    if value.is_empty() {
        return Ok(None);
    }
    let mut sizes = BTreeMap::new();
    for token in value.split(',') {
        let size: Size = token.parse()?;
        sizes.insert(size, ());
    }
    Ok(Some(sizes.into_keys().collect()))
}
