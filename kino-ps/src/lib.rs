//! # kino-ps
//!
//! MPEG-1 Program Stream (ISO/IEC 11172-1) demuxer.
//!
//! The demuxer locates pack and system headers, classifies PES packets by
//! stream id, extracts presentation timestamps, and hands out packet views
//! into its source buffer. It also provides stream-duration probing and
//! binary seek-by-time, optionally constrained to packets that carry an
//! intra-coded picture.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kino_core::BitBuffer;
//! use kino_ps::Demuxer;
//!
//! let buffer = BitBuffer::open("movie.mpg").unwrap();
//! let mut demux = Demuxer::new(buffer);
//!
//! while let Some(packet) = demux.decode() {
//!     println!("{:02x} {:8} bytes pts={}", packet.stream_id, packet.len(), packet.pts);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod demuxer;
pub mod packet;

pub use demuxer::Demuxer;
pub use packet::{is_audio_id, is_video_id, Packet};

/// Pack header start code.
pub const PACK_HEADER_CODE: u8 = 0xBA;

/// System header start code.
pub const SYSTEM_HEADER_CODE: u8 = 0xBB;

/// Private stream 1 (opaque passthrough).
pub const STREAM_PRIVATE_1: u8 = 0xBD;

/// First MPEG audio stream id.
pub const STREAM_AUDIO_1: u8 = 0xC0;

/// Last supported MPEG audio stream id (four streams).
pub const STREAM_AUDIO_4: u8 = 0xC3;

/// MPEG video stream id.
pub const STREAM_VIDEO_1: u8 = 0xE0;
