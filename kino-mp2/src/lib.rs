//! # kino-mp2
//!
//! MPEG-1 Audio Layer II (ISO/IEC 11172-3) decoder.
//!
//! Each 1152-sample frame is decoded in four stages: header sync and
//! validation, bit-allocation and scale-factor parsing, fixed-point
//! dequantization, and a 32-band polyphase synthesis filterbank producing
//! normalized float output.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kino_core::BitBuffer;
//! use kino_mp2::AudioDecoder;
//!
//! let buffer = BitBuffer::open("track.mp2").unwrap();
//! let mut audio = AudioDecoder::new(buffer);
//!
//! while let Some(samples) = audio.decode() {
//!     println!("{} samples @ {:.3}s", samples.left.len(), samples.time);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
mod synthesis;
mod tables;

pub use decoder::AudioDecoder;

/// MPEG version field value for MPEG-1.
pub const MPEG_VERSION_1: u32 = 0x3;

/// Layer field value for Layer II.
pub const LAYER_II: u32 = 0x2;

/// Channel mode: stereo.
pub const MODE_STEREO: u32 = 0;

/// Channel mode: joint stereo (intensity coding above the bound).
pub const MODE_JOINT_STEREO: u32 = 1;

/// Channel mode: two independent channels.
pub const MODE_DUAL_CHANNEL: u32 = 2;

/// Channel mode: mono.
pub const MODE_MONO: u32 = 3;
