//! Remote photoplethysmography (rPPG) heart-rate estimation pipeline.
//!
//! [`pipeline::Rppg`] is the entry point: load a [`config::Config`], then
//! feed it one decoded BGR frame at a time via
//! [`pipeline::Rppg::process_frame`].

pub mod buffer;
pub mod config;
pub mod dsp;
pub mod error;
pub mod estimator;
pub mod geometry;
pub mod logging;
pub mod pipeline;
pub mod signal;
pub mod vision;

pub use config::Config;
pub use error::{Result, RppgError};
pub use pipeline::{FrameOutput, PipelineState, Rppg};
