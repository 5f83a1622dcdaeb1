#![deny(missing_docs)]
//! Image decoding utilities
//!
//! Turns encoded image bytes (JPEG, PNG, WebP, ...) into RGB8 images.

/// Error types for the io module.
pub mod error;

/// Functions to decode images.
pub mod functional;

pub use crate::error::IoError;
