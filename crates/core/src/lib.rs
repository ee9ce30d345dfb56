//! Shared types and pure utilities for the Mosaic platform.
//!
//! This crate has no internal dependencies. Everything here is usable from
//! any other workspace crate without pulling in the database or runtime
//! wiring.

pub mod error;
pub mod ffmpeg;
pub mod json_extract;
pub mod paths;
pub mod text;
pub mod types;
pub mod zoo;
