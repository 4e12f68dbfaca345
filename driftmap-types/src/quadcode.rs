//! Fixed-width addressing of quadtree nodes.
//!
//! A [`Quadcode`] is the root-to-node path through a quadtree, one
//! [`Quadrant`] per level, packed two bits per level into a `u64`.

use crate::region::Region;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One of the four children of a quadtree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Quadrant {
    Nw = 0,
    Ne = 1,
    Sw = 2,
    Se = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [Quadrant::Nw, Quadrant::Ne, Quadrant::Sw, Quadrant::Se];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_bits(bits: u8) -> Quadrant {
        match bits & 0b11 {
            0 => Quadrant::Nw,
            1 => Quadrant::Ne,
            2 => Quadrant::Sw,
            _ => Quadrant::Se,
        }
    }

    pub fn is_east(self) -> bool {
        matches!(self, Quadrant::Ne | Quadrant::Se)
    }

    pub fn is_north(self) -> bool {
        matches!(self, Quadrant::Nw | Quadrant::Ne)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quadrant::Nw => "nw",
            Quadrant::Ne => "ne",
            Quadrant::Sw => "sw",
            Quadrant::Se => "se",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root-to-node path through a quadtree.
///
/// Codes are prefix-structured: the code of any ancestor is a truncation of
/// the code of its descendants, so coarsening a cell address is a
/// [`Quadcode::truncate`] and never requires the tree itself.
///
/// # Examples
///
/// ```
/// use driftmap_types::quadcode::{Quadcode, Quadrant};
///
/// let code = Quadcode::from_quadrants([Quadrant::Nw, Quadrant::Se, Quadrant::Ne]).unwrap();
/// assert_eq!(code.depth(), 3);
/// assert_eq!(code.to_string(), "nw.se.ne");
///
/// let parent = code.truncate(2);
/// assert!(parent.is_prefix_of(&code));
/// assert_eq!(code.parent(), Some(parent));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Quadcode {
    path: u64,
    depth: u8,
}

impl Quadcode {
    /// Deepest level representable in the packed path.
    pub const MAX_DEPTH: u8 = 32;

    pub const ROOT: Quadcode = Quadcode { path: 0, depth: 0 };

    pub fn root() -> Self {
        Self::ROOT
    }

    pub fn from_quadrants<I: IntoIterator<Item = Quadrant>>(quadrants: I) -> Option<Self> {
        quadrants
            .into_iter()
            .try_fold(Self::ROOT, |code, quadrant| code.child(quadrant))
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Code of the child in `quadrant`, or `None` at [`Quadcode::MAX_DEPTH`].
    pub fn child(&self, quadrant: Quadrant) -> Option<Self> {
        if self.depth >= Self::MAX_DEPTH {
            return None;
        }
        Some(Self {
            path: self.path | ((quadrant as u64) << (2 * u32::from(self.depth))),
            depth: self.depth + 1,
        })
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            Some(self.truncate(self.depth - 1))
        }
    }

    /// Quadrant taken at `level` (0 is the root's child).
    pub fn quadrant_at(&self, level: u8) -> Option<Quadrant> {
        if level >= self.depth {
            return None;
        }
        Some(Quadrant::from_bits((self.path >> (2 * u32::from(level))) as u8))
    }

    pub fn last(&self) -> Option<Quadrant> {
        self.depth.checked_sub(1).and_then(|l| self.quadrant_at(l))
    }

    /// Ancestor at `depth`; codes already at or above `depth` are returned unchanged.
    pub fn truncate(&self, depth: u8) -> Self {
        if depth >= self.depth {
            return *self;
        }
        let mask = if depth == 0 {
            0
        } else {
            u64::MAX >> (64 - 2 * u32::from(depth))
        };
        Self {
            path: self.path & mask,
            depth,
        }
    }

    pub fn is_prefix_of(&self, other: &Quadcode) -> bool {
        self.depth <= other.depth && other.truncate(self.depth) == *self
    }

    pub fn quadrants(&self) -> impl Iterator<Item = Quadrant> + '_ {
        (0..self.depth).filter_map(move |level| self.quadrant_at(level))
    }

    /// Boundary of this node inside a tree whose root covers `root`.
    pub fn region_within(&self, root: &Region) -> Region {
        self.quadrants()
            .fold(*root, |region, quadrant| region.split()[quadrant.index()])
    }
}

impl Ord for Quadcode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.quadrants().cmp(other.quadrants())
    }
}

impl PartialOrd for Quadcode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Quadcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("root");
        }
        for (i, quadrant) in self.quadrants().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(quadrant.as_str())?;
        }
        Ok(())
    }
}
