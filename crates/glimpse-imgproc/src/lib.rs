#![deny(missing_docs)]
//! Image processing operations used to prepare network inputs.

/// Per-channel normalization of image pixel values.
pub mod normalize;

/// Row-parallel iteration helpers.
pub mod parallel;

/// Image resizing.
pub mod resize;
