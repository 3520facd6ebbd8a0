//! Core types for Storehouse.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;

pub use cart::{Cart, CartParseError};
pub use id::*;
