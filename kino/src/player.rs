//! Playback orchestration.
//!
//! The player owns one demuxer and one decoder per stream kind. Each
//! decoder reads from a private ring buffer; when a decoder underflows, the
//! player pulls packets from the demuxer and routes their payloads into the
//! decoder buffers by stream id until the starved stream received data.

use std::path::Path;

use tracing::debug;

use kino_core::{BitBuffer, ContainerError, Frame, Result, Samples, INVALID_TS};
use kino_mp2::AudioDecoder;
use kino_mpeg1::VideoDecoder;
use kino_ps::{Demuxer, STREAM_VIDEO_1};

/// Capacity of the per-decoder ring buffers.
const DECODER_BUFFER_CAPACITY: usize = 128 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Video,
    Audio,
}

/// Pulls packets out of a program stream and decodes video frames and
/// audio sample blocks on demand.
pub struct Player {
    demuxer: Demuxer,
    video: Option<VideoDecoder>,
    audio: Option<AudioDecoder>,
    audio_stream: usize,
    decoders_initialized: bool,
    time: f64,
}

impl Player {
    /// Open a program stream file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BitBuffer::open(path)?))
    }

    /// Create a player over an in-memory program stream.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self::new(BitBuffer::from_vec(bytes))
    }

    /// Create a player over an arbitrary source buffer.
    pub fn new(buffer: BitBuffer) -> Self {
        let mut player = Self {
            demuxer: Demuxer::new(buffer),
            video: None,
            audio: None,
            audio_stream: 0,
            decoders_initialized: false,
            time: 0.0,
        };
        player.init_decoders();
        player
    }

    /// Feed more source bytes, e.g. from a network stream.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.demuxer.buffer_mut().write(data)
    }

    /// Signal that no further source bytes will arrive.
    pub fn signal_end(&mut self) {
        self.demuxer.buffer_mut().signal_end();
    }

    /// Current playback time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Duration of the video stream in seconds, or [`INVALID_TS`].
    pub fn duration(&mut self) -> f64 {
        self.demuxer.get_duration(STREAM_VIDEO_1)
    }

    /// Whether the source and all decoders are exhausted.
    pub fn has_ended(&self) -> bool {
        self.demuxer.has_ended()
            && self.video.as_ref().map_or(true, |v| v.has_ended())
            && self.audio.as_ref().map_or(true, |a| a.has_ended())
    }

    /// Number of video streams announced by the system header.
    pub fn num_video_streams(&mut self) -> usize {
        self.demuxer.num_video_streams()
    }

    /// Number of audio streams announced by the system header.
    pub fn num_audio_streams(&mut self) -> usize {
        self.demuxer.num_audio_streams()
    }

    /// Select which of the four possible audio streams to decode.
    pub fn select_audio_stream(&mut self, index: usize) -> Result<()> {
        if index > 3 {
            return Err(ContainerError::StreamNotFound { index }.into());
        }
        self.audio_stream = index;
        Ok(())
    }

    /// Video width in pixels, probing the stream if necessary.
    pub fn width(&mut self) -> usize {
        self.probe_video_header();
        self.video.as_mut().map_or(0, |v| v.width())
    }

    /// Video height in pixels, probing the stream if necessary.
    pub fn height(&mut self) -> usize {
        self.probe_video_header();
        self.video.as_mut().map_or(0, |v| v.height())
    }

    /// Video frame rate, probing the stream if necessary.
    pub fn framerate(&mut self) -> f64 {
        self.probe_video_header();
        self.video.as_mut().map_or(0.0, |v| v.framerate())
    }

    /// Audio sample rate in Hz, probing the stream if necessary.
    pub fn samplerate(&mut self) -> u32 {
        self.probe_audio_header();
        self.audio.as_mut().map_or(0, |a| a.samplerate())
    }

    /// Decode the next video frame, pulling packets from the demuxer as
    /// needed. `None` once the stream is exhausted (or has no video).
    pub fn decode_video(&mut self) -> Option<&Frame> {
        self.init_decoders();
        self.video.as_ref()?;

        let mut starved = false;
        loop {
            let produced = self.video.as_mut()?.decode().is_some();
            if produced {
                if let Some(frame) = self.video.as_ref()?.last_frame() {
                    self.time = self.time.max(frame.time);
                }
                return self.video.as_ref()?.last_frame();
            }
            if starved {
                return None;
            }
            if !self.pump(StreamKind::Video) {
                // The end signal may let the decoder flush a reordered
                // frame; give it one more attempt.
                starved = true;
            }
        }
    }

    /// Decode the next audio sample block, pulling packets from the
    /// demuxer as needed. `None` once the stream is exhausted (or has no
    /// audio).
    pub fn decode_audio(&mut self) -> Option<&Samples> {
        self.init_decoders();
        self.audio.as_ref()?;

        let mut starved = false;
        loop {
            let produced = self.audio.as_mut()?.decode().is_some();
            if produced {
                if let Some(samples) = self.audio.as_ref()?.last_samples() {
                    self.time = self.time.max(samples.time);
                }
                return self.audio.as_ref()?.last_samples();
            }
            if starved {
                return None;
            }
            if !self.pump(StreamKind::Audio) {
                starved = true;
            }
        }
    }

    /// Seek to `time` seconds. Lands on the last intra frame at or before
    /// the target; with `exact`, decodes forward to the requested time.
    pub fn seek(&mut self, time: f64, exact: bool) -> bool {
        self.init_decoders();
        if self.video.is_none() {
            return false;
        }

        let start_time = self.demuxer.get_start_time(STREAM_VIDEO_1);
        let duration = self.demuxer.get_duration(STREAM_VIDEO_1);
        if duration == INVALID_TS {
            return false;
        }
        let time = time.clamp(0.0, duration);

        let (pts, payload) = {
            match self.demuxer.seek(time, STREAM_VIDEO_1, true) {
                None => return false,
                Some(packet) => (packet.pts, packet.payload().to_vec()),
            }
        };

        let Some(video) = self.video.as_mut() else {
            return false;
        };
        video.rewind();
        if pts != INVALID_TS && start_time != INVALID_TS {
            video.set_time(pts - start_time);
        }
        let _ = video.buffer_mut().write(&payload);

        let mut produced = self.decode_video_step();
        if exact {
            while produced && self.landed_frame_time() < time {
                produced = self.decode_video_step();
            }
        }
        if !produced {
            return false;
        }
        self.time = self.landed_frame_time();
        debug!(target = time, landed = self.time, "seek complete");

        self.resync_audio(start_time);
        true
    }

    /// Restart playback from the beginning of the source.
    pub fn rewind(&mut self) {
        self.demuxer.rewind();
        if let Some(video) = &mut self.video {
            video.rewind();
        }
        if let Some(audio) = &mut self.audio {
            audio.rewind();
        }
        self.time = 0.0;
    }

    fn init_decoders(&mut self) {
        if self.decoders_initialized || !self.demuxer.has_headers() {
            return;
        }

        if self.demuxer.num_video_streams() > 0 {
            self.video = Some(VideoDecoder::new(BitBuffer::ring(DECODER_BUFFER_CAPACITY)));
        }
        if self.demuxer.num_audio_streams() > 0 {
            self.audio = Some(AudioDecoder::new(BitBuffer::ring(DECODER_BUFFER_CAPACITY)));
        }
        self.decoders_initialized = true;
    }

    fn probe_video_header(&mut self) {
        self.init_decoders();
        loop {
            match self.video.as_mut() {
                None => return,
                Some(video) => {
                    if video.has_header() {
                        return;
                    }
                }
            }
            if !self.pump(StreamKind::Video) {
                return;
            }
        }
    }

    fn probe_audio_header(&mut self) {
        self.init_decoders();
        loop {
            match self.audio.as_mut() {
                None => return,
                Some(audio) => {
                    if audio.has_header() {
                        return;
                    }
                }
            }
            if !self.pump(StreamKind::Audio) {
                return;
            }
        }
    }

    /// Route packets from the demuxer into the decoder buffers until one
    /// for `wanted` was delivered. Returns `false` if the demuxer ran dry
    /// first; at source end, the decoder buffers get their end signalled so
    /// they can flush.
    fn pump(&mut self, wanted: StreamKind) -> bool {
        loop {
            let routed = {
                match self.demuxer.decode() {
                    None => None,
                    Some(packet) if packet.is_video() => {
                        Some((StreamKind::Video, packet.payload().to_vec()))
                    }
                    Some(packet)
                        if packet.audio_stream_index() == Some(self.audio_stream) =>
                    {
                        Some((StreamKind::Audio, packet.payload().to_vec()))
                    }
                    Some(_) => continue,
                }
            };

            match routed {
                Some((StreamKind::Video, payload)) => {
                    if let Some(video) = &mut self.video {
                        let _ = video.buffer_mut().write(&payload);
                    }
                    if wanted == StreamKind::Video {
                        return true;
                    }
                }
                Some((StreamKind::Audio, payload)) => {
                    if let Some(audio) = &mut self.audio {
                        let _ = audio.buffer_mut().write(&payload);
                    }
                    if wanted == StreamKind::Audio {
                        return true;
                    }
                }
                None => {
                    if self.demuxer.has_ended() {
                        if let Some(video) = &mut self.video {
                            video.buffer_mut().signal_end();
                        }
                        if let Some(audio) = &mut self.audio {
                            audio.buffer_mut().signal_end();
                        }
                    }
                    return false;
                }
            }
        }
    }

    fn landed_frame_time(&self) -> f64 {
        self.video
            .as_ref()
            .and_then(|v| v.last_frame())
            .map_or(f64::MAX, |f| f.time)
    }

    fn decode_video_step(&mut self) -> bool {
        let mut starved = false;
        loop {
            if self.video.as_mut().is_some_and(|v| v.decode().is_some()) {
                return true;
            }
            if starved {
                return false;
            }
            if !self.pump(StreamKind::Video) {
                starved = true;
            }
        }
    }

    /// After a video seek, wind the audio decoder to the first audio packet
    /// past the current playback time.
    fn resync_audio(&mut self, start_time: f64) {
        match self.audio.as_mut() {
            Some(audio) => audio.rewind(),
            None => return,
        }

        loop {
            enum Route {
                Video(Vec<u8>),
                Audio(f64, Vec<u8>),
                Dry,
            }
            let action = {
                match self.demuxer.decode() {
                    None => Route::Dry,
                    Some(packet) if packet.is_video() => Route::Video(packet.payload().to_vec()),
                    Some(packet)
                        if packet.audio_stream_index() == Some(self.audio_stream)
                            && packet.pts != INVALID_TS
                            && packet.pts - start_time > self.time =>
                    {
                        Route::Audio(packet.pts, packet.payload().to_vec())
                    }
                    Some(_) => continue,
                }
            };

            match action {
                Route::Dry => return,
                Route::Video(payload) => {
                    if let Some(video) = &mut self.video {
                        let _ = video.buffer_mut().write(&payload);
                    }
                }
                Route::Audio(pts, payload) => {
                    if let Some(audio) = self.audio.as_mut() {
                        audio.set_time(pts - start_time);
                        let _ = audio.buffer_mut().write(&payload);
                    }
                    return;
                }
            }
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("time", &self.time)
            .field("has_video", &self.video.is_some())
            .field("has_audio", &self.audio.is_some())
            .field("audio_stream", &self.audio_stream)
            .finish_non_exhaustive()
    }
}
