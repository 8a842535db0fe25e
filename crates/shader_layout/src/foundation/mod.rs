//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Math aliases and alignment arithmetic
//! - Logging utilities

pub mod logging;
pub mod math;
