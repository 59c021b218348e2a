//! # Kino Core
//!
//! Core types shared by all Kino decoder crates.
//!
//! This crate provides the fundamental building blocks of the decoder stack:
//! - Error handling types
//! - The bit-granular [`BitBuffer`] over file, memory, ring and append sources
//! - Variable-length-code tables and the flat-table walker
//! - Decoded video [`Frame`] and audio [`Samples`] containers
//! - 90 kHz presentation-timestamp helpers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod error;
pub mod frame;
pub mod samples;
pub mod time;
pub mod vlc;

pub use buffer::{BitBuffer, BufferMode};
pub use error::{BufferError, CodecError, ContainerError, Error, Result};
pub use frame::{Frame, Plane};
pub use samples::{Samples, SAMPLES_PER_FRAME};
pub use time::{clock_to_seconds, INVALID_TS, PTS_CLOCK_RATE};
pub use vlc::{Vlc, VlcUint};
