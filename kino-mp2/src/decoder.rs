//! MPEG-1 Audio Layer II decoder.
//!
//! Frames are decoded whole: header sync and validation, bit allocation,
//! scale factors, sample dequantization, then twelve synthesis passes of
//! three sub-blocks each. Decoding is non-throwing; a bad or inconsistent
//! header drops the frame and the decoder resyncs on the next sync word.

use tracing::{debug, warn};

use kino_core::{BitBuffer, Samples, INVALID_TS, SAMPLES_PER_FRAME};

use crate::synthesis::{build_matrix, build_window, matrix_samples, window_output};
use crate::tables::{self, QuantizerSpec};
use crate::{LAYER_II, MODE_JOINT_STEREO, MODE_MONO, MPEG_VERSION_1};

/// The 11-bit frame sync word (all ones).
const FRAME_SYNC: u32 = 0x7FF;

/// MPEG-1 Audio Layer II decoder over a bit buffer.
///
/// The [`Samples`] returned by [`AudioDecoder::decode`] are owned by the
/// decoder and overwritten by a later call; clone them to retain them.
pub struct AudioDecoder {
    buffer: BitBuffer,

    time: f64,
    samples_decoded: usize,
    samplerate_index: usize,
    bitrate_index: usize,
    version: u32,
    layer: u32,
    mode: u32,
    bound: usize,
    v_pos: usize,
    next_frame_data_size: usize,
    has_header: bool,

    allocation: [[Option<&'static QuantizerSpec>; 32]; 2],
    scale_factor_info: [[u8; 32]; 2],
    scale_factor: [[[i32; 3]; 32]; 2],
    sample: [[[i32; 3]; 32]; 2],

    samples: Samples,
    n: [[f32; 32]; 64],
    d: [f32; 1024],
    v: [[f32; 1024]; 2],
}

impl AudioDecoder {
    /// Create a decoder over a buffer carrying an MP2 elementary stream.
    pub fn new(buffer: BitBuffer) -> Self {
        Self {
            buffer,
            time: 0.0,
            samples_decoded: 0,
            samplerate_index: 0,
            bitrate_index: 0,
            version: 0,
            layer: 0,
            mode: 0,
            bound: 0,
            v_pos: 0,
            next_frame_data_size: 0,
            has_header: false,
            allocation: [[None; 32]; 2],
            scale_factor_info: [[0; 32]; 2],
            scale_factor: [[[0; 3]; 32]; 2],
            sample: [[[0; 3]; 32]; 2],
            samples: Samples::new(),
            n: build_matrix(),
            d: build_window(),
            v: [[0.0; 1024]; 2],
        }
    }

    /// Access the source buffer.
    pub fn buffer(&self) -> &BitBuffer {
        &self.buffer
    }

    /// Mutable access to the source buffer, e.g. to feed it more bytes.
    pub fn buffer_mut(&mut self) -> &mut BitBuffer {
        &mut self.buffer
    }

    /// Whether a valid frame header has been seen; tries to sync on one
    /// from the bytes available now.
    pub fn has_header(&mut self) -> bool {
        if self.has_header {
            return true;
        }
        if self.next_frame_data_size == 0 && self.buffer.has(48) {
            self.next_frame_data_size = self.decode_header();
        }
        self.has_header
    }

    /// Sample rate in Hz (0 before the first header).
    pub fn samplerate(&mut self) -> u32 {
        if self.has_header() {
            tables::SAMPLE_RATE[self.samplerate_index]
        } else {
            0
        }
    }

    /// Presentation time of the next sample block, in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Re-anchor the clock, e.g. after a demuxer seek.
    pub fn set_time(&mut self, time: f64) {
        self.samples_decoded =
            (time * tables::SAMPLE_RATE[self.samplerate_index] as f64) as usize;
        self.time = time;
    }

    /// Whether the source ended and no further frame is recoverable.
    pub fn has_ended(&self) -> bool {
        self.buffer.has_ended()
    }

    /// Restart decoding from the beginning of the source.
    pub fn rewind(&mut self) {
        self.buffer.rewind();
        self.time = 0.0;
        self.samples_decoded = 0;
        self.next_frame_data_size = 0;
        self.samples.time = INVALID_TS;
    }

    /// The most recently decoded sample block, valid until the next
    /// [`AudioDecoder::decode`] call.
    pub fn last_samples(&self) -> Option<&Samples> {
        (self.samples.time != INVALID_TS).then_some(&self.samples)
    }

    /// Decode and return the next 1152-sample block, or `None` if more
    /// bytes are needed (or the header was invalid).
    pub fn decode(&mut self) -> Option<&Samples> {
        // Lock onto the next frame header first, so the full frame length
        // is known.
        if self.next_frame_data_size == 0 {
            if !self.buffer.has(48) {
                return None;
            }
            self.next_frame_data_size = self.decode_header();
            if self.next_frame_data_size == 0 {
                return None;
            }
        }

        if !self.buffer.has(self.next_frame_data_size << 3) {
            return None;
        }

        self.decode_frame();
        self.next_frame_data_size = 0;

        self.samples.time = self.time;
        self.samples_decoded += SAMPLES_PER_FRAME;
        self.time =
            self.samples_decoded as f64 / tables::SAMPLE_RATE[self.samplerate_index] as f64;

        Some(&self.samples)
    }

    /// Scan for the `FF Fx` sync byte pattern, leaving the cursor 3 bits
    /// into the second byte on a hit (just past the 11 sync bits).
    fn find_frame_sync(&mut self) -> bool {
        let len = self.buffer.data().len();
        let mut i = self.buffer.bit_position() >> 3;
        while i + 1 < len {
            if self.buffer.data()[i] == 0xFF && self.buffer.data()[i + 1] & 0xFE == 0xFC {
                self.buffer.set_bit_position(((i + 1) << 3) + 3);
                return true;
            }
            i += 1;
        }
        self.buffer.set_bit_position(((i + 1) << 3).min(len << 3));
        false
    }

    /// Parse and validate a frame header. Returns the number of payload
    /// bytes following it, or 0 if no valid frame starts here.
    fn decode_header(&mut self) -> usize {
        if !self.buffer.has(48) {
            return 0;
        }

        self.buffer.skip_bytes(0x00);
        let sync = self.buffer.read(11);

        // Resync if needed. The sync word is not guaranteed to be unique,
        // so after a resync the header fields are checked against the
        // previous frame's before the frame is accepted.
        if sync != FRAME_SYNC && !self.find_frame_sync() {
            return 0;
        }

        self.version = self.buffer.read(2);
        self.layer = self.buffer.read(2);
        let has_crc = self.buffer.read(1) == 0;

        if self.version != MPEG_VERSION_1 || self.layer != LAYER_II {
            warn!(
                version = self.version,
                layer = self.layer,
                "unsupported version/layer"
            );
            return 0;
        }

        let bitrate_index = self.buffer.read(4) as i32 - 1;
        if !(0..=13).contains(&bitrate_index) {
            return 0;
        }
        let bitrate_index = bitrate_index as usize;

        let samplerate_index = self.buffer.read(2) as usize;
        if samplerate_index == 3 {
            return 0;
        }

        let padding = self.buffer.read(1) as usize;
        self.buffer.skip(1); // private bit
        let mode = self.buffer.read(2);

        // A parameter change mid-stream means the sync word was a rogue
        // one; drop this frame.
        if self.has_header
            && (self.bitrate_index != bitrate_index
                || self.samplerate_index != samplerate_index
                || self.mode != mode)
        {
            return 0;
        }

        self.bitrate_index = bitrate_index;
        self.samplerate_index = samplerate_index;
        self.mode = mode;
        self.has_header = true;

        // Mode extension: joint-stereo bound between coupled and
        // independent subbands.
        if mode == MODE_JOINT_STEREO {
            self.bound = ((self.buffer.read(2) + 1) << 2) as usize;
        } else {
            self.buffer.skip(2);
            self.bound = if mode == MODE_MONO { 0 } else { 32 };
        }

        // Copyright, original, emphasis; CRC if present.
        self.buffer.skip(4);
        if has_crc {
            self.buffer.skip(16);
        }

        let bitrate = tables::BIT_RATE[self.bitrate_index] as usize;
        let samplerate = tables::SAMPLE_RATE[self.samplerate_index] as usize;
        let frame_size = 144_000 * bitrate / samplerate + padding;
        debug!(bitrate, samplerate, frame_size, "frame header");
        frame_size - if has_crc { 6 } else { 4 }
    }

    fn decode_frame(&mut self) {
        // Quantizer table lookups: bitrate class, then allocation table
        // and subband limit.
        let tab1 = if self.mode == MODE_MONO { 0 } else { 1 };
        let tab2 = tables::QUANT_LUT_STEP_1[tab1][self.bitrate_index];
        let tab3 = tables::QUANT_LUT_STEP_2[tab2 as usize][self.samplerate_index];
        let sblimit = (tab3 & 63) as usize;
        let tab3 = (tab3 >> 6) as usize;

        if self.bound > sblimit {
            self.bound = sblimit;
        }

        // Allocations: independent below the bound, shared above it.
        for sb in 0..self.bound {
            self.allocation[0][sb] = self.read_allocation(sb, tab3);
            self.allocation[1][sb] = self.read_allocation(sb, tab3);
        }
        for sb in self.bound..sblimit {
            let alloc = self.read_allocation(sb, tab3);
            self.allocation[0][sb] = alloc;
            self.allocation[1][sb] = alloc;
        }

        // Scale factor selector information.
        let channels = if self.mode == MODE_MONO { 1 } else { 2 };
        for sb in 0..sblimit {
            for ch in 0..channels {
                if self.allocation[ch][sb].is_some() {
                    self.scale_factor_info[ch][sb] = self.buffer.read(2) as u8;
                }
            }
            if self.mode == MODE_MONO {
                self.scale_factor_info[1][sb] = self.scale_factor_info[0][sb];
            }
        }

        // Scale factors, per the selected pattern.
        for sb in 0..sblimit {
            for ch in 0..channels {
                if self.allocation[ch][sb].is_some() {
                    match self.scale_factor_info[ch][sb] {
                        0 => {
                            self.scale_factor[ch][sb][0] = self.buffer.read(6) as i32;
                            self.scale_factor[ch][sb][1] = self.buffer.read(6) as i32;
                            self.scale_factor[ch][sb][2] = self.buffer.read(6) as i32;
                        }
                        1 => {
                            let a = self.buffer.read(6) as i32;
                            self.scale_factor[ch][sb][0] = a;
                            self.scale_factor[ch][sb][1] = a;
                            self.scale_factor[ch][sb][2] = self.buffer.read(6) as i32;
                        }
                        2 => {
                            let a = self.buffer.read(6) as i32;
                            self.scale_factor[ch][sb] = [a, a, a];
                        }
                        _ => {
                            self.scale_factor[ch][sb][0] = self.buffer.read(6) as i32;
                            let a = self.buffer.read(6) as i32;
                            self.scale_factor[ch][sb][1] = a;
                            self.scale_factor[ch][sb][2] = a;
                        }
                    }
                }
            }
            if self.mode == MODE_MONO {
                self.scale_factor[1][sb] = self.scale_factor[0][sb];
            }
        }

        // Coefficient input, reconstruction and synthesis.
        let mut out_pos = 0;
        for part in 0..3 {
            for _granule in 0..4 {
                for sb in 0..self.bound {
                    self.read_samples(0, sb, part);
                    self.read_samples(1, sb, part);
                }
                for sb in self.bound..sblimit {
                    self.read_samples(0, sb, part);
                    self.sample[1][sb] = self.sample[0][sb];
                }
                for sb in sblimit..32 {
                    self.sample[0][sb] = [0; 3];
                    self.sample[1][sb] = [0; 3];
                }

                for sub_block in 0..3 {
                    self.v_pos = (self.v_pos + 1024 - 64) & 1023;

                    for ch in 0..2 {
                        matrix_samples(
                            &self.n,
                            &self.sample[ch],
                            sub_block,
                            &mut self.v[ch],
                            self.v_pos,
                        );
                        let out = if ch == 0 {
                            &mut self.samples.left[out_pos..out_pos + 32]
                        } else {
                            &mut self.samples.right[out_pos..out_pos + 32]
                        };
                        window_output(&self.d, &self.v[ch], self.v_pos, out);
                    }
                    out_pos += 32;
                }
            }
        }

        self.buffer.align();
    }

    fn read_allocation(&mut self, sb: usize, tab3: usize) -> Option<&'static QuantizerSpec> {
        let tab4 = tables::QUANT_LUT_STEP_3[tab3][sb];
        let code = self.buffer.read((tab4 >> 4) as u32) as usize;
        let qtab = tables::QUANT_LUT_STEP_4[(tab4 & 15) as usize][code];
        if qtab != 0 {
            Some(&tables::QUANT_TAB[qtab as usize - 1])
        } else {
            None
        }
    }

    fn read_samples(&mut self, ch: usize, sb: usize, part: usize) {
        let q = match self.allocation[ch][sb] {
            Some(q) => q,
            None => {
                // No bits allocated for this subband.
                self.sample[ch][sb] = [0; 3];
                return;
            }
        };

        // Resolve the scale factor from its 24-bit fixed-point base.
        let mut sf = self.scale_factor[ch][sb][part];
        sf = if sf == 63 {
            0
        } else {
            let shift = sf / 3;
            (tables::SCALEFACTOR_BASE[(sf % 3) as usize] + ((1 << shift) >> 1)) >> shift
        };

        let adj = q.levels as i32;
        if q.group {
            // Three samples share one base-`levels` code word.
            let mut val = self.buffer.read(q.bits as u32) as i32;
            self.sample[ch][sb][0] = val % adj;
            val /= adj;
            self.sample[ch][sb][1] = val % adj;
            self.sample[ch][sb][2] = val / adj;
        } else {
            for i in 0..3 {
                self.sample[ch][sb][i] = self.buffer.read(q.bits as u32) as i32;
            }
        }

        // Postmultiply: renormalize, then apply the scale factor in two
        // 12-bit halves to stay within 32-bit arithmetic.
        let scale = 65536 / (adj + 1);
        let bias = ((adj + 1) >> 1) - 1;
        for i in 0..3 {
            let val = (bias - self.sample[ch][sb][i]) * scale;
            self.sample[ch][sb][i] =
                (val * (sf >> 12) + ((val * (sf & 4095) + 2048) >> 12)) >> 12;
        }
    }
}

impl std::fmt::Debug for AudioDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDecoder")
            .field("has_header", &self.has_header)
            .field("samplerate_index", &self.samplerate_index)
            .field("bitrate_index", &self.bitrate_index)
            .field("mode", &self.mode)
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kino_core::buffer::BitWriter;

    /// Frame header: MPEG-1 Layer II, no CRC, 48 kbit/s, 44.1 kHz, mono.
    fn write_header(w: &mut BitWriter) {
        w.write_bits(FRAME_SYNC, 11);
        w.write_bits(MPEG_VERSION_1, 2);
        w.write_bits(LAYER_II, 2);
        w.write_bits(1, 1); // no CRC
        w.write_bits(2, 4); // bitrate index field: 48 kbit/s
        w.write_bits(0, 2); // 44.1 kHz
        w.write_bits(0, 1); // no padding
        w.write_bits(0, 1); // private
        w.write_bits(MODE_MONO, 2);
        w.write_bits(0, 2); // mode extension
        w.write_bits(0, 4); // copyright, original, emphasis
    }

    /// Payload bytes per frame at 48 kbit/s, 44.1 kHz, no CRC.
    const FRAME_DATA_SIZE: usize = 144_000 * 48 / 44_100 - 4;

    fn silent_frame() -> Vec<u8> {
        let mut w = BitWriter::new();
        write_header(&mut w);
        let mut data = w.into_data();
        data.resize(4 + FRAME_DATA_SIZE, 0);
        data
    }

    /// A frame with quantizer class 0 (3 levels, grouped) on subband 0 and
    /// full-scale negative samples in every granule.
    fn single_subband_frame() -> Vec<u8> {
        let mut w = BitWriter::new();
        write_header(&mut w);
        // Allocations: 4 bits for subbands 0-1, 3 bits for 2-7.
        w.write_bits(1, 4); // subband 0: quantizer class 1
        w.write_bits(0, 4);
        for _ in 2..8 {
            w.write_bits(0, 3);
        }
        // Scale factor info: pattern 2 (one factor for all parts).
        w.write_bits(2, 2);
        // Scale factor code 0 (largest base).
        w.write_bits(0, 6);
        // 12 granules of one grouped code word: 26 = (2, 2, 2) base 3.
        for _ in 0..12 {
            w.write_bits(26, 5);
        }
        let mut data = w.into_data();
        data.resize(4 + FRAME_DATA_SIZE, 0);
        data
    }

    #[test]
    fn test_header_probe() {
        let mut audio = AudioDecoder::new(BitBuffer::from_vec(silent_frame()));
        assert!(audio.has_header());
        assert_eq!(audio.samplerate(), 44_100);
    }

    #[test]
    fn test_silent_frame_decodes_to_silence() {
        let mut audio = AudioDecoder::new(BitBuffer::from_vec(silent_frame()));
        let samples = audio.decode().expect("one frame");
        assert_eq!(samples.time, 0.0);
        assert!(samples.left.iter().all(|&s| s == 0.0));
        assert!(samples.right.iter().all(|&s| s == 0.0));

        let expected = SAMPLES_PER_FRAME as f64 / 44_100.0;
        assert!((audio.time() - expected).abs() < 1e-9);
        assert!(audio.decode().is_none());
    }

    #[test]
    fn test_frame_size_gates_decoding() {
        let data = silent_frame();
        let mut audio = AudioDecoder::new(BitBuffer::appending());

        audio.buffer_mut().write(&data[..40]).unwrap();
        assert!(audio.decode().is_none());

        // One byte short of a full frame.
        audio.buffer_mut().write(&data[40..data.len() - 1]).unwrap();
        assert!(audio.decode().is_none());

        audio.buffer_mut().write(&data[data.len() - 1..]).unwrap();
        assert!(audio.decode().is_some());
    }

    #[test]
    fn test_wrong_layer_is_rejected() {
        let mut w = BitWriter::new();
        w.write_bits(FRAME_SYNC, 11);
        w.write_bits(MPEG_VERSION_1, 2);
        w.write_bits(0x1, 2); // Layer III
        w.write_bits(1, 1);
        w.write_bits(2, 4);
        w.write_bits(0, 2);
        w.write_bits(0, 8);
        let mut data = w.into_data();
        data.resize(256, 0);

        let mut audio = AudioDecoder::new(BitBuffer::from_vec(data));
        assert!(audio.decode().is_none());
        assert!(!audio.has_header());
    }

    #[test]
    fn test_mid_stream_parameter_change_is_rejected() {
        let mut data = silent_frame();
        // Second frame claims a different bitrate (index field 3).
        let mut w = BitWriter::new();
        w.write_bits(FRAME_SYNC, 11);
        w.write_bits(MPEG_VERSION_1, 2);
        w.write_bits(LAYER_II, 2);
        w.write_bits(1, 1);
        w.write_bits(3, 4);
        w.write_bits(0, 2);
        w.write_bits(0, 1);
        w.write_bits(0, 1);
        w.write_bits(MODE_MONO, 2);
        w.write_bits(0, 6);
        let mut second = w.into_data();
        second.resize(4 + FRAME_DATA_SIZE, 0);
        data.extend_from_slice(&second);

        let mut audio = AudioDecoder::new(BitBuffer::from_vec(data));
        assert!(audio.decode().is_some());
        assert!(audio.decode().is_none());
    }

    #[test]
    fn test_resync_skips_garbage_before_sync_word() {
        let mut data = vec![0x12, 0x34, 0x56];
        data.extend_from_slice(&silent_frame());
        let mut audio = AudioDecoder::new(BitBuffer::from_vec(data));
        let samples = audio.decode().expect("frame after resync");
        assert!(samples.left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mono_duplicates_channels() {
        let mut audio = AudioDecoder::new(BitBuffer::from_vec(single_subband_frame()));
        let samples = audio.decode().expect("one frame");
        assert_eq!(samples.left, samples.right);
        assert!(samples.left.iter().any(|&s| s != 0.0));
        assert!(samples.left.iter().all(|&s| s.abs() <= 1.0));
    }

    /// First 32 outputs of a single-subband frame against a direct
    /// evaluation of the synthesis equations.
    #[test]
    fn test_single_subband_synthesis() {
        use std::f64::consts::PI;

        let mut audio = AudioDecoder::new(BitBuffer::from_vec(single_subband_frame()));
        let decoded: Vec<f32> = audio.decode().expect("one frame").left[..32].to_vec();

        // Dequantized subband-0 samples: bias 1, scale 16384, value 2,
        // scale factor base 0x02000000 => -32768.
        let s = -32768.0f64;
        let v_pos = 960usize;
        let mut v = [0.0f64; 1024];
        for i in 0..64 {
            v[v_pos + i] = ((16 + i) as f64 * PI / 64.0).cos() * s;
        }
        for (j, &got) in decoded.iter().enumerate() {
            let mut sum = 0.0f64;
            for i in 0..8 {
                sum += crate::tables::SYNTHESIS_WINDOW[(i << 6) + j] as f64
                    * v[(v_pos + (i << 7) + j) & 1023];
                sum += crate::tables::SYNTHESIS_WINDOW[(i << 6) + 32 + j] as f64
                    * v[(v_pos + (i << 7) + 96 + j) & 1023];
            }
            let expected = -sum / 2_147_418_112.0;
            assert!(
                (got as f64 - expected).abs() < 1e-3,
                "sample {j}: got {got}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_rewind_replays_identically() {
        let mut audio = AudioDecoder::new(BitBuffer::from_vec(single_subband_frame()));
        let first = audio.decode().expect("frame").left;
        audio.rewind();
        assert_eq!(audio.time(), 0.0);
        let replay = audio.decode().expect("frame").left;
        assert_eq!(first, replay);
    }
}
