//! hifirate - incremental audio quality rater
//!
//! Walks an audio library, decodes each file to mono, finds the highest
//! frequency that carries sustained energy, and combines it with the
//! container's bitrate, sample rate and bit depth into a 0-100 rating.
//! Results are cached by BLAKE3 content hash so unchanged files are never
//! decoded twice, and reported as CSV, JSON or HTML.

pub mod analysis;
pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

mod app;

pub use app::run_app;
