//! retrocam library crate.
//!
//! The imaging core of a retro camera: tone and dither engine, exposure
//! auto-tune, preview double-buffer, capture pipeline and the application
//! controller, plus host-side drivers that let it run on a desktop.

pub mod app;
pub mod cli;
pub mod config;
pub mod display;
pub mod exposure;
pub mod input;
pub mod logger;
pub mod memory;
pub mod pipeline;
pub mod preview;
pub mod sensor;
pub mod storage;
pub mod tone;
