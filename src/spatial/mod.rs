//! Spatial acceleration structures.

mod aabb_tree;

pub use aabb_tree::*;
