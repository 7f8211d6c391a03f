//! Channel-to-plane lookup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire-plane identity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Plane {
    /// First induction plane.
    U,
    /// Second induction plane.
    V,
    /// Collection plane.
    X,
}

impl Plane {
    /// All planes in id order.
    pub const ALL: [Plane; 3] = [Plane::U, Plane::V, Plane::X];

    /// Numeric plane id (U=0, V=1, X=2).
    #[inline]
    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            Plane::U => 0,
            Plane::V => 1,
            Plane::X => 2,
        }
    }

    /// Plane for a numeric id.
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    /// Returns true for the collection plane.
    #[inline]
    #[must_use]
    pub fn is_collection(self) -> bool {
        self == Plane::X
    }

    /// Single-letter name.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Plane::U => 'U',
            Plane::V => 'V',
            Plane::X => 'X',
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Plane {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "U" | "0" => Ok(Plane::U),
            "V" | "1" => Ok(Plane::V),
            "X" | "Z" | "2" | "COLLECTION" => Ok(Plane::X),
            _ => Err(Error::UnknownPlane(s.to_string())),
        }
    }
}

/// Static lookup `channel % total_channels -> plane`.
///
/// Built once per geometry and shared read-only; it is `Send + Sync` and
/// cheap to pass by reference into parallel workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    planes: Vec<Plane>,
}

impl ChannelMap {
    /// Builds a map from consecutive `(plane, n_channels)` blocks.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayout`] if the layout is empty or totals zero
    /// channels.
    pub fn from_layout(layout: &[(Plane, usize)]) -> Result<Self> {
        let total: usize = layout.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return Err(Error::InvalidLayout(
                "plane layout must contain at least one channel".to_string(),
            ));
        }
        let mut planes = Vec::with_capacity(total);
        for &(plane, n) in layout {
            planes.extend(std::iter::repeat(plane).take(n));
        }
        Ok(Self { planes })
    }

    /// Number of channels in one detector unit.
    #[must_use]
    pub fn total_channels(&self) -> usize {
        self.planes.len()
    }

    /// Plane of a raw detector channel. Channels beyond one unit wrap.
    #[inline]
    #[must_use]
    pub fn plane_of(&self, channel: u32) -> Plane {
        let idx = channel as usize % self.planes.len();
        self.planes[idx]
    }

    /// Majority plane of a set of channels; ties go to the lower plane id.
    #[must_use]
    pub fn majority_plane<I: IntoIterator<Item = u32>>(&self, channels: I) -> Option<Plane> {
        let mut counts = [0usize; 3];
        let mut any = false;
        for channel in channels {
            counts[usize::from(self.plane_of(channel).id())] += 1;
            any = true;
        }
        if !any {
            return None;
        }
        let mut best = 0usize;
        for (idx, &count) in counts.iter().enumerate() {
            if count > counts[best] {
                best = idx;
            }
        }
        Plane::ALL.get(best).copied()
    }

    /// Returns true when the channels fall on more than one plane.
    #[must_use]
    pub fn spans_multiple_planes<I: IntoIterator<Item = u32>>(&self, channels: I) -> bool {
        let mut iter = channels.into_iter();
        let Some(first) = iter.next() else {
            return false;
        };
        let plane = self.plane_of(first);
        iter.any(|c| self.plane_of(c) != plane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_map() -> ChannelMap {
        ChannelMap::from_layout(&[(Plane::U, 2), (Plane::V, 2), (Plane::X, 4)]).unwrap()
    }

    #[test]
    fn test_plane_lookup_wraps() {
        let map = small_map();
        assert_eq!(map.total_channels(), 8);
        assert_eq!(map.plane_of(0), Plane::U);
        assert_eq!(map.plane_of(3), Plane::V);
        assert_eq!(map.plane_of(7), Plane::X);
        assert_eq!(map.plane_of(8), Plane::U);
        assert_eq!(map.plane_of(15), Plane::X);
    }

    #[test]
    fn test_majority_plane() {
        let map = small_map();
        assert_eq!(map.majority_plane([4, 5, 0]), Some(Plane::X));
        assert_eq!(map.majority_plane([0, 4]), Some(Plane::U));
        assert_eq!(map.majority_plane(std::iter::empty()), None);
    }

    #[test]
    fn test_spans_multiple_planes() {
        let map = small_map();
        assert!(!map.spans_multiple_planes([4, 5, 6]));
        assert!(map.spans_multiple_planes([1, 4]));
        assert!(!map.spans_multiple_planes(std::iter::empty()));
    }

    #[test]
    fn test_empty_layout_rejected() {
        assert!(ChannelMap::from_layout(&[]).is_err());
        assert!(ChannelMap::from_layout(&[(Plane::X, 0)]).is_err());
    }

    #[test]
    fn test_plane_parsing() {
        assert_eq!("x".parse::<Plane>().unwrap(), Plane::X);
        assert_eq!("1".parse::<Plane>().unwrap(), Plane::V);
        assert!("W".parse::<Plane>().is_err());
        assert_eq!(Plane::from_id(2), Some(Plane::X));
        assert_eq!(Plane::from_id(3), None);
    }
}
