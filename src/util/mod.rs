//! Utility types and functions.
//!
//! This module contains fundamental types used throughout the library:
//! - [`Error`] / [`Result`] - Error handling
//! - [`BBox3d`] and math type re-exports from glam
//! - Tabulated function interpolation and bound searches

mod error;
mod interp;
mod math;

pub use error::*;
pub use interp::*;
pub use math::*;
