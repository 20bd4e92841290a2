use std::fmt;

use serde::{Deserialize, Serialize};

/// How far below a starting resource a traversal reaches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    /// The resource itself only.
    Zero,
    /// The resource and its immediate children.
    One,
    /// The resource and all of its descendants.
    #[default]
    Infinite,
}

impl Depth {
    /// Returns `true` if a resource `distance` levels below the starting
    /// point is within this depth.
    pub fn includes(&self, distance: usize) -> bool {
        match self {
            Self::Zero => distance == 0,
            Self::One => distance <= 1,
            Self::Infinite => true,
        }
    }

    /// The depth remaining after descending one level, or `None` if
    /// children are out of reach.
    pub fn descend(&self) -> Option<Self> {
        match self {
            Self::Zero => None,
            Self::One => Some(Self::Zero),
            Self::Infinite => Some(Self::Infinite),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "zero"),
            Self::One => write!(f, "one"),
            Self::Infinite => write!(f, "infinite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_by_distance() {
        assert!(Depth::Zero.includes(0));
        assert!(!Depth::Zero.includes(1));
        assert!(Depth::One.includes(1));
        assert!(!Depth::One.includes(2));
        assert!(Depth::Infinite.includes(42));
    }

    #[test]
    fn descend_reduces_depth() {
        assert_eq!(Depth::Zero.descend(), None);
        assert_eq!(Depth::One.descend(), Some(Depth::Zero));
        assert_eq!(Depth::Infinite.descend(), Some(Depth::Infinite));
    }
}
