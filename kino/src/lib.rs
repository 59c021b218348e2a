//! # Kino
//!
//! A self-contained decoder for MPEG-1 Program Stream files carrying
//! MPEG-1 video and MPEG-1 Audio Layer II.
//!
//! The stack is organized in several crates:
//! - `kino-core`: bit buffer, VLC walker, frame and sample containers
//! - `kino-ps`: program stream demuxer
//! - `kino-mpeg1`: video decoder
//! - `kino-mp2`: audio decoder
//!
//! This crate re-exports the commonly used types and provides [`Player`],
//! which routes demuxed packets into the per-stream decoders and keeps a
//! playback clock.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kino::Player;
//!
//! fn main() -> kino::Result<()> {
//!     let mut player = Player::open("movie.mpg")?;
//!     while let Some(frame) = player.decode_video() {
//!         println!("frame {}x{} @ {:.3}s", frame.width, frame.height, frame.time);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod player;

pub use player::Player;

// Re-export the core types.
pub use kino_core::{
    BitBuffer, BufferMode, BufferError, CodecError, ContainerError, Error, Frame, Plane, Result,
    Samples, INVALID_TS, SAMPLES_PER_FRAME,
};

// Re-export the demuxer and decoders.
pub use kino_mp2::AudioDecoder;
pub use kino_mpeg1::VideoDecoder;
pub use kino_ps::{Demuxer, Packet};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
