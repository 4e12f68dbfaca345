//! Spatial-temporal index over drifter readings.
//!
//! [`TimeQuadTree`] is built once from the full reading table and then only
//! read. The [`CodeDictionary`] and [`PointCodes`] it produces are what the
//! aggregation layer consumes at query time.

pub mod dictionary;
pub mod quadtree;

pub use dictionary::{CodeDictionary, PointCodes};
pub use quadtree::{NodeId, NodeRef, QuadNode, TimeQuadTree};
