//! PES packet views.

use kino_core::INVALID_TS;

use crate::{STREAM_AUDIO_1, STREAM_AUDIO_4, STREAM_PRIVATE_1, STREAM_VIDEO_1};

/// Check if a PES stream id is the supported video stream.
pub fn is_video_id(id: u8) -> bool {
    id == STREAM_VIDEO_1
}

/// Check if a PES stream id is one of the supported audio streams.
pub fn is_audio_id(id: u8) -> bool {
    (STREAM_AUDIO_1..=STREAM_AUDIO_4).contains(&id)
}

/// A demuxed PES packet.
///
/// The payload is a view into the demuxer's source buffer; the borrow ties
/// its lifetime to the demuxer, so a packet can only be inspected until the
/// next [`Demuxer::decode`](crate::Demuxer::decode) call. Copy the payload
/// out to retain it.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    /// The PES start code this packet was classified under.
    pub stream_id: u8,
    /// Presentation time in seconds, or [`INVALID_TS`].
    pub pts: f64,
    payload: &'a [u8],
}

impl<'a> Packet<'a> {
    pub(crate) fn new(stream_id: u8, pts: f64, payload: &'a [u8]) -> Self {
        Self {
            stream_id,
            pts,
            payload,
        }
    }

    /// The packet payload bytes.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether this packet carried a presentation timestamp.
    pub fn has_pts(&self) -> bool {
        self.pts != INVALID_TS
    }

    /// Whether this is the video stream.
    pub fn is_video(&self) -> bool {
        is_video_id(self.stream_id)
    }

    /// Whether this is an audio stream.
    pub fn is_audio(&self) -> bool {
        is_audio_id(self.stream_id)
    }

    /// Whether this is private stream 1.
    pub fn is_private(&self) -> bool {
        self.stream_id == STREAM_PRIVATE_1
    }

    /// Index of the audio stream (0..=3) for audio packets.
    pub fn audio_stream_index(&self) -> Option<usize> {
        if self.is_audio() {
            Some((self.stream_id - STREAM_AUDIO_1) as usize)
        } else {
            None
        }
    }
}
